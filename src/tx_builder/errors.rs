//! Error taxonomy for the transaction pipeline
//!
//! Every failure a caller can see from preparing, signing, submitting or
//! quoting is a [`PipelineError`]. Validation variants are raised before any
//! network call is made. A transaction that was submitted but never observed
//! as confirmed is not an error at all; it is reported as
//! [`TransactionOutcome::TimedOut`](crate::types::TransactionOutcome::TimedOut).

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::network::NetworkError;
use crate::wallet::KeyHolderError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The network could not be reached or did not answer in time
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The transaction's recent blockhash expired before inclusion
    #[error("Blockhash expired: {0}")]
    BlockhashExpired(String),

    /// Blockhash expiry kept recurring until attempts or time ran out
    #[error("Retry budget exhausted after {attempts} attempts ({elapsed_ms}ms)")]
    RetryBudgetExhausted { attempts: u32, elapsed_ms: u64 },

    /// A required signer has no key or no attached signature
    #[error("Missing signature for required signer {account}")]
    MissingSigner { account: Pubkey },

    #[error("Transaction has no recent blockhash")]
    MissingBlockhash,

    /// Sending funds to the account they come from
    #[error("Source and destination are the same account")]
    SelfTransfer,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid destination account: {0}")]
    InvalidDestinationAccount(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// No executable quote exists for the request
    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    /// The cluster refused the transaction for a reason other than expiry
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Check if retrying the same operation later might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkUnavailable(_) => true,
            Self::BlockhashExpired(_) => true,
            Self::QuoteUnavailable(_) => true,

            Self::RetryBudgetExhausted { .. } => false,
            Self::MissingSigner { .. } => false,
            Self::MissingBlockhash => false,
            Self::SelfTransfer => false,
            Self::InsufficientFunds { .. } => false,
            Self::InvalidDestinationAccount(_) => false,
            Self::InvalidAmount(_) => false,
            Self::SubmissionRejected(_) => false,
            Self::InstructionBuild { .. } => false,
            Self::Signing(_) => false,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Whether the caller's input was rejected before touching the network
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SelfTransfer
                | Self::InsufficientFunds { .. }
                | Self::InvalidDestinationAccount(_)
                | Self::InvalidAmount(_)
        )
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable(_) => "network",
            Self::BlockhashExpired(_) => "blockhash",
            Self::RetryBudgetExhausted { .. } => "retry_budget",
            Self::MissingSigner { .. } => "signer",
            Self::MissingBlockhash => "blockhash",
            Self::SelfTransfer
            | Self::InsufficientFunds { .. }
            | Self::InvalidDestinationAccount(_)
            | Self::InvalidAmount(_) => "validation",
            Self::QuoteUnavailable(_) => "quote",
            Self::SubmissionRejected(_) => "submission",
            Self::InstructionBuild { .. } => "instruction",
            Self::Signing(_) => "signing",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl PipelineError {
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn insufficient_funds(required: u64, available: u64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn invalid_destination(reason: impl Into<String>) -> Self {
        Self::InvalidDestinationAccount(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

impl From<NetworkError> for PipelineError {
    fn from(err: NetworkError) -> Self {
        if err.is_blockhash_expired() {
            Self::BlockhashExpired(err.to_string())
        } else if err.is_unavailable() {
            Self::NetworkUnavailable(err.to_string())
        } else {
            match err {
                NetworkError::InsufficientFunds { .. } => {
                    Self::SubmissionRejected(err.to_string())
                }
                NetworkError::RpcResponse { code: Some(c), .. } if (500..600).contains(&c) => {
                    Self::NetworkUnavailable(err.to_string())
                }
                _ => Self::SubmissionRejected(err.to_string()),
            }
        }
    }
}

impl From<KeyHolderError> for PipelineError {
    fn from(err: KeyHolderError) -> Self {
        match err {
            KeyHolderError::UnknownAccount(account) => Self::MissingSigner { account },
            other => Self::Signing(other.to_string()),
        }
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blockhash_network_errors_become_expiry() {
        let err: PipelineError = NetworkError::BlockhashNotFound {
            endpoint: "rpc".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::BlockhashExpired(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_transport_errors_become_unavailable() {
        let err: PipelineError = NetworkError::Timeout {
            endpoint: "rpc".to_string(),
            timeout_ms: 30_000,
        }
        .into();
        assert!(matches!(err, PipelineError::NetworkUnavailable(_)));
        assert_eq!(err.category(), "network");
    }

    #[test]
    fn test_program_errors_become_rejections() {
        let err: PipelineError = NetworkError::RpcResponse {
            endpoint: "rpc".to_string(),
            message: "Transaction simulation failed: custom program error: 0x1771".to_string(),
            code: Some(-32002),
        }
        .into();
        assert!(matches!(err, PipelineError::SubmissionRejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_preflight_rejection_is_not_network_unavailable() {
        let err: PipelineError = NetworkError::TransactionRejected {
            endpoint: "rpc".to_string(),
            reason: "Error processing Instruction 1: custom program error: 0x1429".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::SubmissionRejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_account_is_missing_signer() {
        let account = Pubkey::new_unique();
        let err: PipelineError = KeyHolderError::UnknownAccount(account).into();
        assert_eq!(err, PipelineError::MissingSigner { account });
    }

    #[test]
    fn test_validation_category() {
        for err in [
            PipelineError::SelfTransfer,
            PipelineError::insufficient_funds(10, 5),
            PipelineError::invalid_destination("system program"),
            PipelineError::InvalidAmount("zero".to_string()),
        ] {
            assert!(err.is_validation());
            assert_eq!(err.category(), "validation");
            assert!(!err.is_retryable());
        }
    }
}
