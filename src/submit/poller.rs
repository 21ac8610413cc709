//! Confirmation polling
//!
//! After broadcast the poller asks for the transaction's status on a fixed
//! interval until it sees a terminal status or runs out of polls. A failed
//! lookup says nothing about the transaction itself, so it counts as
//! pending. Running out of polls yields `TimedOut` ("submitted but
//! unconfirmed"), never `Failed`.

use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::config::ConfirmationConfig;
use crate::metrics::metrics;
use crate::network::NetworkClient;
use crate::types::{TransactionOutcome, TransactionStatus};

/// Shortest gap between two status lookups
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ConfirmationPoller {
    network: Arc<dyn NetworkClient>,
    interval: Duration,
    max_polls: u32,
}

impl ConfirmationPoller {
    /// `interval` is floored at 10ms
    pub fn new(network: Arc<dyn NetworkClient>, interval: Duration, max_polls: u32) -> Self {
        Self {
            network,
            interval: interval.max(MIN_POLL_INTERVAL),
            max_polls,
        }
    }

    pub fn from_config(network: Arc<dyn NetworkClient>, config: &ConfirmationConfig) -> Self {
        Self::new(network, config.poll_interval(), config.max_polls)
    }

    /// Poll until the transaction reaches a terminal outcome
    pub async fn poll_until_terminal(&self, signature: Signature) -> TransactionOutcome {
        self.poll(signature, None).await
    }

    /// Like [`poll_until_terminal`](Self::poll_until_terminal), but stops as
    /// soon as `cancel` turns true (or its sender is dropped). A cancelled
    /// poll reports `Submitted`: the transaction's fate is still unknown.
    pub async fn poll_until_terminal_or_cancelled(
        &self,
        signature: Signature,
        cancel: watch::Receiver<bool>,
    ) -> TransactionOutcome {
        self.poll(signature, Some(cancel)).await
    }

    async fn poll(
        &self,
        signature: Signature,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> TransactionOutcome {
        let mut outcome = TransactionOutcome::Submitted(signature);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first poll waits one full interval after broadcast
        ticker.reset();

        for poll in 1..=self.max_polls {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancelled(&mut cancel) => {
                    debug!(signature = %signature, poll, "Confirmation polling cancelled");
                    return outcome;
                }
            }

            match self.network.get_transaction_status(&signature).await {
                Ok(TransactionStatus::Confirmed) => {
                    outcome = outcome.advance(TransactionOutcome::Confirmed(signature));
                    break;
                }
                Ok(TransactionStatus::Failed(reason)) => {
                    outcome = outcome.advance(TransactionOutcome::Failed { signature, reason });
                    break;
                }
                Ok(TransactionStatus::Pending) => {
                    trace!(signature = %signature, poll, "Still pending");
                }
                Err(err) => {
                    debug!(signature = %signature, poll, error = %err, "Status lookup failed, treating as pending");
                }
            }
        }

        if !outcome.is_terminal() {
            outcome = outcome.advance(TransactionOutcome::TimedOut(signature));
        }
        metrics().record_outcome(&outcome);
        outcome
    }
}

/// Resolves once cancellation is requested; never resolves without a receiver
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    match cancel {
        // An Err means the sender is gone, which also ends the wait
        Some(rx) => {
            let _ = rx.wait_for(|stop| *stop).await;
        }
        None => std::future::pending().await,
    }
}
