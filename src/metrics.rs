//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

use crate::types::TransactionOutcome;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Submission
    pub submissions_total: IntCounter,
    pub submission_attempts_total: IntCounter,
    pub blockhash_retries_total: IntCounter,
    pub retry_budget_exhausted_total: IntCounter,
    pub outcomes_total: IntCounterVec,

    // Quotes
    pub quote_fetches_total: IntCounter,
    pub quote_errors_total: IntCounter,
    pub quote_fetches_cancelled_total: IntCounter,

    // Fee cache
    pub fee_cache_hits: IntCounter,
    pub fee_cache_misses: IntCounter,

    // Histograms
    pub rpc_latency: Histogram,
    pub prepare_latency: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let submissions_total = IntCounter::with_opts(Opts::new(
            "txpipe_submissions_total",
            "Transactions handed to the submission retrier",
        ))?;

        let submission_attempts_total = IntCounter::with_opts(Opts::new(
            "txpipe_submission_attempts_total",
            "Individual broadcast attempts, including blockhash retries",
        ))?;

        let blockhash_retries_total = IntCounter::with_opts(Opts::new(
            "txpipe_blockhash_retries_total",
            "Attempts restarted because the blockhash expired",
        ))?;

        let retry_budget_exhausted_total = IntCounter::with_opts(Opts::new(
            "txpipe_retry_budget_exhausted_total",
            "Submissions abandoned after the retry budget ran out",
        ))?;

        let outcomes_total = IntCounterVec::new(
            Opts::new("txpipe_outcomes_total", "Final transaction outcomes by kind"),
            &["outcome"],
        )?;

        let quote_fetches_total = IntCounter::with_opts(Opts::new(
            "txpipe_quote_fetches_total",
            "Quote requests sent to the venue",
        ))?;

        let quote_errors_total = IntCounter::with_opts(Opts::new(
            "txpipe_quote_errors_total",
            "Quote requests that failed or returned no route",
        ))?;

        let quote_fetches_cancelled_total = IntCounter::with_opts(Opts::new(
            "txpipe_quote_fetches_cancelled_total",
            "In-flight quote fetches superseded by a newer input",
        ))?;

        let fee_cache_hits = IntCounter::with_opts(Opts::new(
            "txpipe_fee_cache_hits_total",
            "Rent-exemption lookups served from cache",
        ))?;

        let fee_cache_misses = IntCounter::with_opts(Opts::new(
            "txpipe_fee_cache_misses_total",
            "Rent-exemption lookups that went to the network",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("txpipe_rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;

        let prepare_latency = Histogram::with_opts(
            HistogramOpts::new(
                "txpipe_prepare_latency_seconds",
                "Intent to prepared transaction latency",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;

        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(submission_attempts_total.clone()))?;
        registry.register(Box::new(blockhash_retries_total.clone()))?;
        registry.register(Box::new(retry_budget_exhausted_total.clone()))?;
        registry.register(Box::new(outcomes_total.clone()))?;
        registry.register(Box::new(quote_fetches_total.clone()))?;
        registry.register(Box::new(quote_errors_total.clone()))?;
        registry.register(Box::new(quote_fetches_cancelled_total.clone()))?;
        registry.register(Box::new(fee_cache_hits.clone()))?;
        registry.register(Box::new(fee_cache_misses.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(prepare_latency.clone()))?;

        Ok(Self {
            registry,
            submissions_total,
            submission_attempts_total,
            blockhash_retries_total,
            retry_budget_exhausted_total,
            outcomes_total,
            quote_fetches_total,
            quote_errors_total,
            quote_fetches_cancelled_total,
            fee_cache_hits,
            fee_cache_misses,
            rpc_latency,
            prepare_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_outcome(&self, outcome: &TransactionOutcome) {
        let label = match outcome {
            TransactionOutcome::Submitted(_) => "submitted",
            TransactionOutcome::Confirmed(_) => "confirmed",
            TransactionOutcome::Failed { .. } => "failed",
            TransactionOutcome::TimedOut(_) => "timed_out",
        };
        self.outcomes_total.with_label_values(&[label]).inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn export_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Measures a duration into a histogram when finished
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
