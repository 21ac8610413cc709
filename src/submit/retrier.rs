//! Submission with blockhash-expiry retry
//!
//! Each attempt walks `Prepared → Serialized → Submitted`. When the cluster
//! reports that the blockhash expired, the attempt ends in
//! `BlockhashExpired` and the loop goes back to `Prepared` with a fresh
//! blockhash, re-signs and re-submits. Nothing else is retried: any other
//! error is terminal on the spot, since resubmitting after an unknown
//! failure could land the same intent twice.
//!
//! Attempts are strictly sequential and bounded by both an attempt ceiling
//! and a wall-clock budget.

use rand::Rng;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SubmissionConfig;
use crate::metrics::metrics;
use crate::network::NetworkClient;
use crate::structured_logging::PipelineLogger;
use crate::tx_builder::{
    sign_transaction, PipelineError, PreparedTransaction, TransactionAssembler,
};
use crate::wallet::KeyHolder;

/// Where an attempt is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Prepared,
    Serialized,
    Submitted,
    Failed,
    BlockhashExpired,
}

/// One pass through the submission state machine
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub attempt_number: u32,
    pub started_at: Instant,
    pub signature: Option<Signature>,
    pub state: SubmissionState,
}

impl SubmissionAttempt {
    fn new(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            started_at: Instant::now(),
            signature: None,
            state: SubmissionState::Prepared,
        }
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!(
            attempt = self.attempt_number,
            from = ?self.state,
            to = ?next,
            signature = ?self.signature,
            "Submission state change"
        );
        self.state = next;
    }
}

/// Bounds on the retry loop
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub budget: Duration,
    pub min_pause: Duration,
    pub max_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            budget: Duration::from_secs(60),
            min_pause: Duration::from_millis(50),
            max_pause: Duration::from_millis(200),
        }
    }
}

impl From<&SubmissionConfig> for RetryPolicy {
    fn from(config: &SubmissionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            budget: config.budget(),
            min_pause: Duration::from_millis(config.base_backoff_ms),
            max_pause: Duration::from_millis(config.max_backoff_ms.max(config.base_backoff_ms)),
        }
    }
}

impl RetryPolicy {
    /// Jittered pause between attempts. An inverted range collapses to `min_pause`.
    fn pause(&self) -> Duration {
        let min = self.min_pause.as_millis() as u64;
        let max = (self.max_pause.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionRetrier {
    network: Arc<dyn NetworkClient>,
    assembler: TransactionAssembler,
    key_holder: Arc<dyn KeyHolder>,
    policy: RetryPolicy,
}

impl SubmissionRetrier {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        key_holder: Arc<dyn KeyHolder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            assembler: TransactionAssembler::new(network.clone()),
            network,
            key_holder,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sign, serialize and broadcast `prepared`, retrying only on blockhash
    /// expiry. Returns the signature of the attempt the cluster accepted.
    pub async fn submit(&self, prepared: &PreparedTransaction) -> Result<Signature, PipelineError> {
        let logger = PipelineLogger::new(prepared.correlation_id.clone());
        let started = Instant::now();
        let deadline = started + self.policy.budget;
        let mut tx = prepared.transaction.clone();

        metrics().submissions_total.inc();

        for attempt_number in 1..=self.policy.max_attempts {
            let mut attempt = SubmissionAttempt::new(attempt_number);

            if attempt_number > 1 {
                attempt.transition(SubmissionState::Prepared);
                let refreshed =
                    tokio::time::timeout_at(deadline, self.assembler.refresh_blockhash(&mut tx))
                        .await;
                match refreshed {
                    Ok(result) => {
                        result?;
                    }
                    Err(_) => return Err(self.exhausted(attempt_number - 1, started)),
                }
            }

            let signed = sign_transaction(&tx, self.key_holder.as_ref()).await?;
            let bytes = signed.to_bytes()?;
            attempt.signature = Some(signed.signature());
            attempt.transition(SubmissionState::Serialized);

            metrics().submission_attempts_total.inc();
            logger.log_attempt(attempt_number, &signed.signature());

            let sent = match tokio::time::timeout_at(deadline, self.network.submit(&bytes)).await {
                Ok(sent) => sent,
                Err(_) => {
                    attempt.transition(SubmissionState::Failed);
                    return Err(self.exhausted(attempt_number, started));
                }
            };

            match sent {
                Ok(signature) => {
                    attempt.signature = Some(signature);
                    attempt.transition(SubmissionState::Submitted);
                    return Ok(signature);
                }
                Err(err) if err.is_blockhash_expired() => {
                    attempt.transition(SubmissionState::BlockhashExpired);
                    metrics().blockhash_retries_total.inc();
                    logger.log_blockhash_expired(attempt_number, elapsed_ms(started));

                    if attempt_number < self.policy.max_attempts {
                        let pause = self.policy.pause();
                        if Instant::now() + pause >= deadline {
                            return Err(self.exhausted(attempt_number, started));
                        }
                        tokio::time::sleep(pause).await;
                    }
                }
                Err(err) => {
                    attempt.transition(SubmissionState::Failed);
                    return Err(err.into());
                }
            }
        }

        Err(self.exhausted(self.policy.max_attempts, started))
    }

    fn exhausted(&self, attempts: u32, started: Instant) -> PipelineError {
        let elapsed_ms = elapsed_ms(started);
        warn!(attempts, elapsed_ms, "Submission retry budget exhausted");
        metrics().retry_budget_exhausted_total.inc();
        PipelineError::RetryBudgetExhausted {
            attempts,
            elapsed_ms,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
