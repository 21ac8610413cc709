//! txpipe - Solana transaction pipeline
//!
//! Turns "send X" and "swap A for B" intents into fee-accounted, correctly
//! ordered, signed transactions, submits them with blockhash-expiry retry
//! and tracks them to a terminal outcome.

pub mod compat;
pub mod config;
pub mod fees;
pub mod metrics;
pub mod network;
pub mod observability;
pub mod pipeline;
pub mod quote;
pub mod structured_logging;
pub mod submit;
pub mod test_utils;
pub mod tx_builder;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod tests;

pub use config::PipelineConfig;
pub use network::{NetworkClient, NetworkError, RpcNetworkClient};
pub use pipeline::TransactionPipeline;
pub use quote::{QuoteEngine, QuoteSnapshot, QuoteState};
pub use tx_builder::{PipelineError, PreparedTransaction, SignedTransaction, UnsignedTransaction};
pub use types::{
    ApiVersion, FeeAmount, Quote, QuoteRequest, SwapIntent, TransactionOutcome, TransferAsset,
    TransferIntent, UserVerdict,
};
pub use wallet::{KeyHolder, LocalKeyHolder};

// Re-export commonly used types
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
