//! Transaction building
//!
//! Modules, leaf first:
//! - **errors**: the pipeline error taxonomy
//! - **instructions**: transfer instruction planning and ordering checks
//! - **signing**: unsigned/signed transaction types, signer and serializer
//! - **assembler**: instruction list + fee payer + blockhash → unsigned transaction
//! - **output**: the prepared transaction handed to submission
//!
//! ## Invariants
//!
//! - Nothing is serialized without a blockhash and a signature from every
//!   required signer (fee payer plus every `is_signer` account).
//! - Replacing the blockhash drops signatures made over the old message.
//! - The blockhash era (`Legacy`/`V0`) always matches the compiled message.

pub mod assembler;
pub mod errors;
pub mod instructions;
pub mod output;
pub mod signing;

pub use assembler::{AssemblyRequest, TransactionAssembler};
pub use errors::PipelineError;
pub use instructions::{
    associated_token_account, plan_native_transfer, plan_token_transfer, validate_plan,
    InstructionPlan, TokenTransfer,
};
pub use output::PreparedTransaction;
pub use signing::{serialize_transaction, sign_transaction, SignedTransaction, UnsignedTransaction};

pub type Result<T> = std::result::Result<T, PipelineError>;
