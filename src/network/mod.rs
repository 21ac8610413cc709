//! Network Module
//!
//! The capability surface the pipeline consumes from the outside world:
//! chain RPC (blockhash, fees, rent, submission, status) and the swap venue
//! (quotes and swap instructions). Everything goes through the
//! [`NetworkClient`] trait so the live client and test doubles are
//! interchangeable.

use async_trait::async_trait;
use solana_sdk::{
    commitment_config::CommitmentLevel, hash::Hash, instruction::Instruction,
    message::VersionedMessage, pubkey::Pubkey, signature::Signature,
};

use crate::types::{ApiVersion, Quote, QuoteRequest, TransactionStatus};

// Submodules
pub mod errors;
pub mod rpc;

// Re-exports for convenience
pub use errors::NetworkError;
pub use rpc::RpcNetworkClient;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Trait for everything the pipeline asks of the network
#[async_trait]
pub trait NetworkClient: Send + Sync + std::fmt::Debug {
    /// Fetch a recent blockhash using the call that matches `api_version`
    async fn get_recent_block_reference(&self, api_version: ApiVersion) -> NetworkResult<Hash>;

    /// Flat network fee for a compiled message
    async fn get_fee_for_message(&self, message: &VersionedMessage) -> NetworkResult<u64>;

    /// Minimum balance for an account of `span` bytes to be rent exempt
    async fn get_rent_exemption_floor(
        &self,
        span: usize,
        commitment: CommitmentLevel,
    ) -> NetworkResult<u64>;

    /// Broadcast a serialized, fully signed transaction
    async fn submit(&self, signed_bytes: &[u8]) -> NetworkResult<Signature>;

    async fn get_transaction_status(&self, signature: &Signature)
        -> NetworkResult<TransactionStatus>;

    /// Price a swap. Venue-level refusals come back as a quote with
    /// `error_message` set, not as an error.
    async fn get_quote(&self, request: &QuoteRequest) -> NetworkResult<Quote>;

    async fn account_exists(&self, account: &Pubkey) -> NetworkResult<bool>;

    /// Instructions that execute `quote` on behalf of `trader`
    async fn get_swap_instructions(
        &self,
        quote: &Quote,
        trader: &Pubkey,
    ) -> NetworkResult<Vec<Instruction>>;
}
