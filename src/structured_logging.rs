//! Subscriber setup and structured lifecycle logging

use solana_sdk::signature::Signature;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::observability::CorrelationId;
use crate::types::{FeeAmount, TransactionOutcome};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}

/// Logger for the lifecycle of one transaction
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    correlation_id: CorrelationId,
}

impl PipelineLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_prepared(&self, kind: &str, instructions: usize, fee: &FeeAmount) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            kind = %kind,
            instructions = instructions,
            network_fee = fee.network_fee,
            rent_exemption_delta = fee.rent_exemption_delta,
            total_fee = fee.total(),
            "Transaction prepared"
        );
    }

    pub fn log_attempt(&self, attempt: u32, signature: &Signature) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            attempt = attempt,
            signature = %signature,
            "Submission attempt"
        );
    }

    pub fn log_blockhash_expired(&self, attempt: u32, elapsed_ms: u64) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            attempt = attempt,
            elapsed_ms = elapsed_ms,
            "Blockhash expired, re-preparing"
        );
    }

    pub fn log_outcome(&self, outcome: &TransactionOutcome, latency_ms: u64) {
        match outcome {
            TransactionOutcome::Confirmed(sig) => tracing::info!(
                correlation_id = %self.correlation_id,
                signature = %sig,
                latency_ms = latency_ms,
                "Transaction confirmed"
            ),
            TransactionOutcome::Failed { signature, reason } => tracing::warn!(
                correlation_id = %self.correlation_id,
                signature = %signature,
                reason = %reason,
                latency_ms = latency_ms,
                "Transaction failed on chain"
            ),
            TransactionOutcome::TimedOut(sig) => tracing::warn!(
                correlation_id = %self.correlation_id,
                signature = %sig,
                latency_ms = latency_ms,
                "Transaction submitted but unconfirmed"
            ),
            TransactionOutcome::Submitted(sig) => tracing::info!(
                correlation_id = %self.correlation_id,
                signature = %sig,
                latency_ms = latency_ms,
                "Stopped tracking submitted transaction"
            ),
        }
    }

    pub fn error(&self, stage: &str, error: &crate::tx_builder::PipelineError) {
        tracing::error!(
            correlation_id = %self.correlation_id,
            stage = %stage,
            category = error.category(),
            error = %error,
            "Pipeline error"
        );
    }
}
