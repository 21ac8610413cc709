//! Time-bounded cache of rent-exemption floors
//!
//! Floors change rarely but are looked up on every fee estimate, so each
//! `(span, commitment)` pair is fetched at most once per TTL window.
//! Concurrent misses on the same key may both fetch; the later write wins.
//! A failed fetch caches nothing.

use dashmap::DashMap;
use solana_sdk::commitment_config::CommitmentLevel;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::metrics::metrics;
use crate::network::{NetworkClient, NetworkResult};

pub const DEFAULT_RENT_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentExemptionCacheEntry {
    pub value: u64,
    pub fetched_at: Instant,
}

impl RentExemptionCacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Debug)]
pub struct FeeCache {
    network: Arc<dyn NetworkClient>,
    entries: DashMap<(usize, CommitmentLevel), RentExemptionCacheEntry>,
    ttl: Duration,
}

impl FeeCache {
    pub fn new(network: Arc<dyn NetworkClient>) -> Self {
        Self::with_ttl(network, DEFAULT_RENT_CACHE_TTL)
    }

    pub fn with_ttl(network: Arc<dyn NetworkClient>, ttl: Duration) -> Self {
        Self {
            network,
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Rent-exemption floor for an account of `span` bytes
    pub async fn get(&self, span: usize, commitment: CommitmentLevel) -> NetworkResult<u64> {
        let key = (span, commitment);

        // Copy out before awaiting; a shard guard must not live across the fetch
        let cached = self.entries.get(&key).map(|entry| *entry);
        if let Some(entry) = cached {
            if entry.is_fresh(Instant::now(), self.ttl) {
                metrics().fee_cache_hits.inc();
                trace!(span, ?commitment, value = entry.value, "Rent floor cache hit");
                return Ok(entry.value);
            }
        }

        metrics().fee_cache_misses.inc();
        let value = self.network.get_rent_exemption_floor(span, commitment).await?;
        self.entries.insert(
            key,
            RentExemptionCacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
        trace!(span, ?commitment, value, "Rent floor fetched");
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop stale entries, returning how many were removed
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - self.entries.len()
    }
}
