use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// JSON-RPC "method not found"
pub const JSON_RPC_METHOD_NOT_FOUND: i64 = -32601;

/// Failures reported by a [`NetworkClient`](super::NetworkClient)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Errors returned by the RPC server itself
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    /// The referenced blockhash is unknown to the cluster
    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    /// The blockhash aged out before the transaction was included
    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// Preflight or the runtime refused the transaction itself
    #[error("Transaction rejected: {reason} (endpoint: {endpoint})")]
    TransactionRejected { endpoint: String, reason: String },

    /// The response could not be decoded
    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

impl NetworkError {
    /// Check if this error is retryable by a caller at a higher level
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Transport { .. } => true,
            NetworkError::Timeout { .. } => true,
            NetworkError::RateLimitExceeded { .. } => true,
            NetworkError::BlockhashNotFound { .. } => true,
            NetworkError::TransactionExpired { .. } => true,

            NetworkError::InsufficientFunds { .. } => false,
            NetworkError::TransactionRejected { .. } => false,
            NetworkError::InvalidResponse { .. } => false,

            // Retry on server errors (5xx)
            NetworkError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// The recent blockhash expired before inclusion.
    ///
    /// This is the only condition the submission retrier re-prepares for.
    pub fn is_blockhash_expired(&self) -> bool {
        matches!(
            self,
            NetworkError::BlockhashNotFound { .. } | NetworkError::TransactionExpired { .. }
        )
    }

    /// The network could not be reached or did not answer in time
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            NetworkError::Transport { .. }
                | NetworkError::Timeout { .. }
                | NetworkError::RateLimitExceeded { .. }
        )
    }

    /// Get the endpoint associated with this error
    pub fn endpoint(&self) -> &str {
        match self {
            NetworkError::Transport { endpoint, .. }
            | NetworkError::Timeout { endpoint, .. }
            | NetworkError::RpcResponse { endpoint, .. }
            | NetworkError::RateLimitExceeded { endpoint }
            | NetworkError::BlockhashNotFound { endpoint }
            | NetworkError::TransactionExpired { endpoint }
            | NetworkError::InsufficientFunds { endpoint }
            | NetworkError::TransactionRejected { endpoint, .. }
            | NetworkError::InvalidResponse { endpoint, .. } => endpoint,
        }
    }

    /// The server does not implement the requested method
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, NetworkError::RpcResponse { code: Some(JSON_RPC_METHOD_NOT_FOUND), .. })
    }

    /// Create from ClientError with context.
    ///
    /// The structured kind decides: a transaction error carried by a
    /// preflight failure is a rejection (or expiry), HTTP status and reqwest
    /// flags decide rate limiting and timeouts. Only kinds that carry nothing
    /// but text fall back to [`classify`](Self::classify).
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        if let Some(tx_err) = err.get_transaction_error() {
            return Self::from_transaction_error(&tx_err, endpoint);
        }

        let message = err.to_string();
        match err.kind() {
            ClientErrorKind::Reqwest(http) => {
                if http.is_timeout() {
                    NetworkError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout_ms: 0,
                    }
                } else if let Some(status) = http.status() {
                    match status.as_u16() {
                        429 => NetworkError::RateLimitExceeded {
                            endpoint: endpoint.to_string(),
                        },
                        code => NetworkError::RpcResponse {
                            endpoint: endpoint.to_string(),
                            message,
                            code: Some(i64::from(code)),
                        },
                    }
                } else {
                    NetworkError::Transport {
                        endpoint: endpoint.to_string(),
                        message,
                    }
                }
            }
            ClientErrorKind::Io(_) => NetworkError::Transport {
                endpoint: endpoint.to_string(),
                message,
            },
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, data, .. }) => {
                match data {
                    RpcResponseErrorData::NodeUnhealthy { .. } => NetworkError::Transport {
                        endpoint: endpoint.to_string(),
                        message,
                    },
                    // A preflight failure without a transaction error still
                    // refused the transaction
                    RpcResponseErrorData::SendTransactionPreflightFailure(_) => {
                        NetworkError::TransactionRejected {
                            endpoint: endpoint.to_string(),
                            reason: message,
                        }
                    }
                    RpcResponseErrorData::Empty => NetworkError::RpcResponse {
                        endpoint: endpoint.to_string(),
                        message,
                        code: Some(*code),
                    },
                }
            }
            ClientErrorKind::SerdeJson(_) | ClientErrorKind::RpcError(RpcError::ParseError(_)) => {
                NetworkError::InvalidResponse {
                    endpoint: endpoint.to_string(),
                    message,
                }
            }
            _ => Self::classify(&message, endpoint),
        }
    }

    /// Map a transaction error reported by preflight or the runtime
    pub fn from_transaction_error(err: &TransactionError, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();
        match err {
            TransactionError::BlockhashNotFound => NetworkError::BlockhashNotFound { endpoint },
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => {
                NetworkError::InsufficientFunds { endpoint }
            }
            other => NetworkError::TransactionRejected {
                endpoint,
                reason: other.to_string(),
            },
        }
    }

    /// Classify an unstructured transport message.
    ///
    /// Rejection markers are checked before the rate-limit and timeout
    /// wording, so program output that happens to contain those words stays
    /// a rejection.
    pub fn classify(message: &str, endpoint: &str) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            NetworkError::BlockhashNotFound { endpoint }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            NetworkError::TransactionExpired { endpoint }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            NetworkError::InsufficientFunds { endpoint }
        } else if err_str.contains("transaction simulation failed")
            || err_str.contains("error processing instruction")
            || err_str.contains("custom program error")
        {
            NetworkError::TransactionRejected {
                endpoint,
                reason: message.to_string(),
            }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("status 429")
        {
            NetworkError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timed out")
            || err_str.contains("operation timeout")
            || err_str.contains("deadline has elapsed")
        {
            NetworkError::Timeout {
                endpoint,
                timeout_ms: 0,
            }
        } else if err_str.contains("error sending request")
            || err_str.contains("connection refused")
            || err_str.contains("dns error")
        {
            NetworkError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            NetworkError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }

    /// Map a reqwest failure from the quote API
    pub fn from_http_error(err: reqwest::Error, endpoint: &str) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if err.is_decode() {
            NetworkError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            NetworkError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}
