//! Debounced, self-refreshing quote engine
//!
//! One background task owns all engine state and reacts to four events:
//! caller commands, debounce expiry, fetch completion and the refresh tick.
//!
//! ```text
//! Idle ──amount>0──▶ Debouncing ──500ms──▶ Fetching ──▶ Ready | Error
//!   ▲                    ▲                     │
//!   └──── amount=0 ──────┴──── any input ──────┘ (fetch aborted)
//! ```
//!
//! Every input change bumps the generation, aborts the in-flight fetch and
//! restarts the debounce, so at most one quote is ever live and it always
//! belongs to the latest input. While an amount is pending a refresh tick
//! re-fetches every 5 s, skipped when a fetch is running or a debounce is
//! pending.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::QuoteConfig;
use crate::metrics::metrics;
use crate::network::{NetworkClient, NetworkResult};
use crate::types::{Quote, QuoteRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteState {
    /// No amount to price
    Idle,
    /// Waiting for input to settle
    Debouncing,
    Fetching,
    Ready(Quote),
    /// The fetch failed or the venue could not price the request
    Error(String),
}

/// What observers see after every state change
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub state: QuoteState,
    pub amount: u64,
    /// Bumped on every input change; a snapshot from an older generation is stale
    pub generation: u64,
}

impl QuoteSnapshot {
    /// The quote, only when it is ready to execute
    pub fn quote(&self) -> Option<&Quote> {
        match &self.state {
            QuoteState::Ready(quote) => Some(quote),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            QuoteState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Shortest refresh period the engine will run with
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct QuoteEngineSettings {
    pub debounce: Duration,
    pub refresh_interval: Duration,
}

impl Default for QuoteEngineSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            refresh_interval: Duration::from_secs(5),
        }
    }
}

impl QuoteEngineSettings {
    /// `refresh_interval` with a floor, so a zero never reaches the ticker
    fn refresh_period(&self) -> Duration {
        self.refresh_interval.max(MIN_REFRESH_INTERVAL)
    }
}

impl From<&QuoteConfig> for QuoteEngineSettings {
    fn from(config: &QuoteConfig) -> Self {
        Self {
            debounce: config.debounce(),
            refresh_interval: config.refresh_interval(),
        }
    }
}

#[derive(Debug)]
enum Command {
    SetAmount(u64),
    SetPair { input_mint: Pubkey, output_mint: Pubkey },
    Shutdown,
}

/// Handle to a running quote engine. Dropping it stops the engine.
#[derive(Debug)]
pub struct QuoteEngine {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<QuoteSnapshot>,
    task: JoinHandle<()>,
}

impl QuoteEngine {
    /// Start an engine for `request`. A non-zero amount starts debouncing
    /// immediately. Must be called inside a Tokio runtime.
    pub fn spawn(
        network: Arc<dyn NetworkClient>,
        request: QuoteRequest,
        settings: QuoteEngineSettings,
    ) -> Self {
        let initial = QuoteSnapshot {
            state: QuoteState::Idle,
            amount: request.amount,
            generation: 0,
        };
        let (publisher, snapshots) = watch::channel(initial);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let initial_amount = request.amount;
        let mut actor = EngineTask {
            network,
            request,
            settings,
            publisher,
            generation: 0,
            debounce_deadline: None,
            fetch: None,
        };
        if initial_amount > 0 {
            actor.on_input_changed();
        }

        let task = tokio::spawn(actor.run(command_rx));

        Self {
            commands,
            snapshots,
            task,
        }
    }

    /// Subscribe to snapshots
    pub fn observe(&self) -> watch::Receiver<QuoteSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> QuoteSnapshot {
        self.snapshots.borrow().clone()
    }

    /// The live quote, only while the engine is `Ready`
    pub fn current_quote(&self) -> Option<Quote> {
        self.snapshots.borrow().quote().cloned()
    }

    pub fn set_amount(&self, amount: u64) {
        self.send(Command::SetAmount(amount));
    }

    /// Switch the asset pair; behaves like an amount change
    pub fn set_pair(&self, input_mint: Pubkey, output_mint: Pubkey) {
        self.send(Command::SetPair {
            input_mint,
            output_mint,
        });
    }

    /// Stop timers and any in-flight fetch, leaving the engine `Idle`
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!(command = ?e.0, "Quote engine already stopped");
        }
    }
}

impl Drop for QuoteEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type FetchHandle = JoinHandle<NetworkResult<Quote>>;

struct EngineTask {
    network: Arc<dyn NetworkClient>,
    request: QuoteRequest,
    settings: QuoteEngineSettings,
    publisher: watch::Sender<QuoteSnapshot>,
    generation: u64,
    debounce_deadline: Option<Instant>,
    fetch: Option<FetchHandle>,
}

impl EngineTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self.settings.refresh_period();
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SetAmount(amount)) => {
                        self.request.amount = amount;
                        self.on_input_changed();
                    }
                    Some(Command::SetPair { input_mint, output_mint }) => {
                        self.request.input_mint = input_mint;
                        self.request.output_mint = output_mint;
                        self.on_input_changed();
                    }
                    Some(Command::Shutdown) | None => {
                        self.stop();
                        break;
                    }
                },
                _ = debounce_expired(self.debounce_deadline) => {
                    self.debounce_deadline = None;
                    if self.start_fetch() {
                        refresh.reset();
                    }
                }
                result = fetch_finished(&mut self.fetch) => {
                    self.fetch = None;
                    self.on_fetch_finished(result);
                }
                _ = refresh.tick() => {
                    if self.refresh_due() && self.start_fetch() {
                        debug!(amount = self.request.amount, "Periodic quote refresh");
                    }
                }
            }
        }
    }

    fn publish(&self, state: QuoteState) {
        self.publisher.send_replace(QuoteSnapshot {
            state,
            amount: self.request.amount,
            generation: self.generation,
        });
    }

    fn cancel_fetch(&mut self) {
        if let Some(handle) = self.fetch.take() {
            handle.abort();
            metrics().quote_fetches_cancelled_total.inc();
            debug!(generation = self.generation, "Superseded quote fetch aborted");
        }
    }

    /// New amount or pair: drop everything in flight and restart the debounce
    fn on_input_changed(&mut self) {
        self.generation += 1;
        self.cancel_fetch();

        if self.request.amount == 0 {
            self.debounce_deadline = None;
            self.publish(QuoteState::Idle);
        } else {
            self.debounce_deadline = Some(Instant::now() + self.settings.debounce);
            self.publish(QuoteState::Debouncing);
        }
    }

    fn refresh_due(&self) -> bool {
        self.request.amount > 0 && self.fetch.is_none() && self.debounce_deadline.is_none()
    }

    /// Returns whether a fetch was started
    fn start_fetch(&mut self) -> bool {
        if self.request.amount == 0 {
            self.publish(QuoteState::Idle);
            return false;
        }

        let network = self.network.clone();
        let request = self.request.clone();
        self.fetch = Some(tokio::spawn(async move { network.get_quote(&request).await }));

        metrics().quote_fetches_total.inc();
        self.publish(QuoteState::Fetching);
        true
    }

    fn on_fetch_finished(&mut self, result: Result<NetworkResult<Quote>, JoinError>) {
        let state = match result {
            Ok(Ok(quote)) => match quote.error_message.clone() {
                None => {
                    debug!(
                        generation = self.generation,
                        out_amount = quote.out_amount,
                        venue = %quote.venue_label(),
                        "Quote ready"
                    );
                    QuoteState::Ready(quote)
                }
                Some(message) => {
                    metrics().quote_errors_total.inc();
                    debug!(generation = self.generation, message = %message, "Venue returned no quote");
                    QuoteState::Error(message)
                }
            },
            Ok(Err(err)) => {
                metrics().quote_errors_total.inc();
                warn!(generation = self.generation, error = %err, "Quote fetch failed");
                QuoteState::Error(err.to_string())
            }
            Err(join_err) => {
                metrics().quote_errors_total.inc();
                warn!(error = %join_err, "Quote fetch task ended abnormally");
                QuoteState::Error("quote fetch aborted".to_string())
            }
        };
        self.publish(state);
    }

    fn stop(&mut self) {
        self.cancel_fetch();
        self.debounce_deadline = None;
        self.publish(QuoteState::Idle);
    }
}

impl Drop for EngineTask {
    fn drop(&mut self) {
        // A dropped JoinHandle detaches; abort so no fetch outlives the engine
        if let Some(handle) = self.fetch.take() {
            handle.abort();
        }
    }
}

async fn debounce_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn fetch_finished(fetch: &mut Option<FetchHandle>) -> Result<NetworkResult<Quote>, JoinError> {
    match fetch {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkError;
    use crate::test_utils::MockNetworkClient;

    fn request(amount: u64) -> QuoteRequest {
        QuoteRequest {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            amount,
            trader: None,
            slippage_bps: 50,
        }
    }

    fn spawn(mock: &Arc<MockNetworkClient>, amount: u64) -> QuoteEngine {
        QuoteEngine::spawn(mock.clone(), request(amount), QuoteEngineSettings::default())
    }

    async fn wait_settled(rx: &mut watch::Receiver<QuoteSnapshot>) -> QuoteSnapshot {
        rx.wait_for(|s| matches!(s.state, QuoteState::Ready(_) | QuoteState::Error(_)))
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_amount_changes_fetch_once_for_last_amount() {
        let mock = Arc::new(MockNetworkClient::new());
        mock.set_quote_delay(Duration::from_millis(300));
        let engine = spawn(&mock, 0);
        let mut rx = engine.observe();

        engine.set_amount(1_000);
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.set_amount(2_000);
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.set_amount(3_000);

        let snapshot = wait_settled(&mut rx).await;

        assert_eq!(snapshot.quote().unwrap().in_amount, 3_000);
        assert_eq!(snapshot.amount, 3_000);
        let requests = mock.quote_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, 3_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_amount_aborts_in_flight_fetch() {
        let mock = Arc::new(MockNetworkClient::new());
        mock.set_quote_delay(Duration::from_millis(300));
        let engine = spawn(&mock, 1_000);
        let mut rx = engine.observe();

        // Past the debounce, the first fetch is in flight
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(engine.snapshot().state, QuoteState::Fetching);
        engine.set_amount(2_000);

        let snapshot = wait_settled(&mut rx).await;

        assert_eq!(snapshot.quote().unwrap().in_amount, 2_000);
        assert_eq!(mock.quote_requests().len(), 2);
        assert_eq!(mock.quote_completions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_liquidity_is_error_state() {
        let mock = Arc::new(MockNetworkClient::new());
        mock.set_quote_handler(|req| Ok(Quote::unavailable(req, "Insufficient liquidity")));
        let engine = spawn(&mock, 5_000_000);
        let mut rx = engine.observe();

        let snapshot = wait_settled(&mut rx).await;

        assert_eq!(snapshot.error(), Some("Insufficient liquidity"));
        assert!(engine.current_quote().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_is_error_state() {
        let mock = Arc::new(MockNetworkClient::new());
        mock.set_quote_handler(|_| {
            Err(NetworkError::RateLimitExceeded {
                endpoint: "mock".to_string(),
            })
        });
        let engine = spawn(&mock, 10);
        let mut rx = engine.observe();

        let snapshot = wait_settled(&mut rx).await;
        assert!(snapshot.error().unwrap().contains("Rate limit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_while_amount_pending() {
        let mock = Arc::new(MockNetworkClient::new());
        let engine = spawn(&mock, 42);
        let mut rx = engine.observe();
        wait_settled(&mut rx).await;
        assert_eq!(mock.quote_requests().len(), 1);

        tokio::time::sleep(Duration::from_millis(5_600)).await;
        assert_eq!(mock.quote_requests().len(), 2);
        assert!(engine.current_quote().is_some());

        // Zero amount stops refreshing
        engine.set_amount(0);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(mock.quote_requests().len(), 2);
        assert_eq!(engine.snapshot().state, QuoteState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_change_refetches() {
        let mock = Arc::new(MockNetworkClient::new());
        let engine = spawn(&mock, 42);
        let mut rx = engine.observe();
        wait_settled(&mut rx).await;

        let (input, output) = (Pubkey::new_unique(), Pubkey::new_unique());
        engine.set_pair(input, output);
        rx.wait_for(|s| s.quote().is_some_and(|q| q.input_mint == input))
            .await
            .unwrap();

        let last = mock.quote_requests().pop().unwrap();
        assert_eq!((last.input_mint, last.output_mint), (input, output));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_in_flight_fetch() {
        let mock = Arc::new(MockNetworkClient::new());
        mock.set_quote_delay(Duration::from_millis(300));
        let engine = spawn(&mock, 1_000);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(mock.quote_requests().len(), 1);
        drop(engine);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(mock.quote_completions(), 0);
        assert_eq!(mock.quote_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_goes_idle() {
        let mock = Arc::new(MockNetworkClient::new());
        let engine = spawn(&mock, 1_000);
        let mut rx = engine.observe();

        engine.shutdown();
        rx.wait_for(|s| s.state == QuoteState::Idle).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(mock.quote_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_refresh_interval_still_quotes() {
        let mock = Arc::new(MockNetworkClient::new());
        let settings = QuoteEngineSettings {
            debounce: Duration::from_millis(500),
            refresh_interval: Duration::ZERO,
        };
        let engine = QuoteEngine::spawn(mock.clone(), request(77), settings);
        let mut rx = engine.observe();

        let snapshot = wait_settled(&mut rx).await;

        assert_eq!(snapshot.quote().unwrap().in_amount, 77);
        assert!(!engine.task.is_finished());
    }
}
