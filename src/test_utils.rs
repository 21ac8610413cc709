//! Test Utilities Module
//!
//! Scriptable [`NetworkClient`] for deterministic tests of the fee, assembly,
//! submission, confirmation and quote paths without a cluster.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use solana_sdk::{
    commitment_config::CommitmentLevel,
    hash::Hash,
    instruction::Instruction,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::compat;
use crate::network::{NetworkClient, NetworkError, NetworkResult};
use crate::types::{ApiVersion, Quote, QuoteRequest, TransactionStatus};

pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Mainnet rent formula: (128-byte overhead + span) * 3480 lamports/byte-year * 2 years
pub fn rent_floor_for(span: usize) -> u64 {
    (128 + span as u64) * 3_480 * 2
}

type QuoteHandler = Box<dyn Fn(&QuoteRequest) -> NetworkResult<Quote> + Send + Sync>;

/// Build a ready quote paying `out_amount` for the request
pub fn ready_quote(request: &QuoteRequest, out_amount: u64) -> Quote {
    let mut quote = Quote::unavailable(request, "");
    quote.error_message = None;
    quote.out_amount = out_amount;
    quote.min_out_amount = out_amount - out_amount * u64::from(request.slippage_bps) / 10_000;
    quote.route = vec!["Raydium".to_string()];
    quote.raw = serde_json::json!({ "inAmount": request.amount.to_string() });
    quote
}

#[derive(Default)]
struct MockState {
    blockhash_calls: Vec<ApiVersion>,
    fee_calls: usize,
    rent_calls: usize,
    status_calls: usize,
    quote_requests: Vec<QuoteRequest>,
    quote_completions: usize,
    swap_calls: usize,
    submitted: Vec<Vec<u8>>,

    blockhash_failures: VecDeque<NetworkError>,
    rent_failures: VecDeque<NetworkError>,
    submit_script: VecDeque<NetworkResult<()>>,
    status_script: VecDeque<NetworkResult<TransactionStatus>>,
    default_status: Option<TransactionStatus>,
    existing_accounts: HashSet<Pubkey>,
    quote_handler: Option<QuoteHandler>,
    quote_delay: Duration,
    swap_instructions: Vec<Instruction>,
}

/// In-memory network double with call counters and scripted responses
pub struct MockNetworkClient {
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockNetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNetworkClient").finish_non_exhaustive()
    }
}

impl Default for MockNetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetworkClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    // --- scripting ---

    pub fn fail_next_blockhash(&self, err: NetworkError) {
        self.with_state(|s| s.blockhash_failures.push_back(err));
    }

    pub fn fail_next_rent(&self, err: NetworkError) {
        self.with_state(|s| s.rent_failures.push_back(err));
    }

    /// Queue the result of the next `submit` call; unscripted calls succeed
    pub fn script_submit(&self, result: NetworkResult<()>) {
        self.with_state(|s| s.submit_script.push_back(result));
    }

    /// Queue the result of the next status lookup
    pub fn script_status(&self, result: NetworkResult<TransactionStatus>) {
        self.with_state(|s| s.status_script.push_back(result));
    }

    /// Status returned once the script runs out (Pending when unset)
    pub fn set_default_status(&self, status: TransactionStatus) {
        self.with_state(|s| s.default_status = Some(status));
    }

    pub fn add_existing_account(&self, account: Pubkey) {
        self.with_state(|s| {
            s.existing_accounts.insert(account);
        });
    }

    pub fn set_quote_handler(
        &self,
        handler: impl Fn(&QuoteRequest) -> NetworkResult<Quote> + Send + Sync + 'static,
    ) {
        self.with_state(|s| s.quote_handler = Some(Box::new(handler)));
    }

    /// Make every quote fetch take `delay` (virtual time under a paused clock)
    pub fn set_quote_delay(&self, delay: Duration) {
        self.with_state(|s| s.quote_delay = delay);
    }

    pub fn set_swap_instructions(&self, instructions: Vec<Instruction>) {
        self.with_state(|s| s.swap_instructions = instructions);
    }

    // --- observation ---

    pub fn blockhash_calls(&self) -> Vec<ApiVersion> {
        self.with_state(|s| s.blockhash_calls.clone())
    }

    pub fn fee_calls(&self) -> usize {
        self.with_state(|s| s.fee_calls)
    }

    pub fn rent_calls(&self) -> usize {
        self.with_state(|s| s.rent_calls)
    }

    pub fn submit_calls(&self) -> usize {
        self.with_state(|s| s.submitted.len())
    }

    pub fn status_calls(&self) -> usize {
        self.with_state(|s| s.status_calls)
    }

    /// Every quote request that reached the network, including aborted ones
    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.with_state(|s| s.quote_requests.clone())
    }

    /// Quote fetches that ran to completion
    pub fn quote_completions(&self) -> usize {
        self.with_state(|s| s.quote_completions)
    }

    pub fn swap_calls(&self) -> usize {
        self.with_state(|s| s.swap_calls)
    }

    /// Decoded transactions in submission order
    pub fn submitted_transactions(&self) -> Vec<VersionedTransaction> {
        self.with_state(|s| {
            s.submitted
                .iter()
                .filter_map(|bytes| bincode::deserialize(bytes).ok())
                .collect()
        })
    }

    /// Total number of network calls of any kind
    pub fn total_calls(&self) -> usize {
        self.with_state(|s| {
            s.blockhash_calls.len()
                + s.fee_calls
                + s.rent_calls
                + s.status_calls
                + s.quote_requests.len()
                + s.swap_calls
                + s.submitted.len()
        })
    }
}

fn mock_error(message: &str) -> NetworkError {
    NetworkError::InvalidResponse {
        endpoint: "mock".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl NetworkClient for MockNetworkClient {
    async fn get_recent_block_reference(&self, api_version: ApiVersion) -> NetworkResult<Hash> {
        self.with_state(|s| {
            s.blockhash_calls.push(api_version);
            match s.blockhash_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(Hash::new_unique()),
            }
        })
    }

    async fn get_fee_for_message(&self, message: &VersionedMessage) -> NetworkResult<u64> {
        self.with_state(|s| s.fee_calls += 1);
        let signers = compat::message_header(message).num_required_signatures;
        Ok(LAMPORTS_PER_SIGNATURE * u64::from(signers))
    }

    async fn get_rent_exemption_floor(
        &self,
        span: usize,
        _commitment: CommitmentLevel,
    ) -> NetworkResult<u64> {
        self.with_state(|s| {
            s.rent_calls += 1;
            match s.rent_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(rent_floor_for(span)),
            }
        })
    }

    async fn submit(&self, signed_bytes: &[u8]) -> NetworkResult<Signature> {
        let scripted = self.with_state(|s| {
            s.submitted.push(signed_bytes.to_vec());
            s.submit_script.pop_front()
        });
        scripted.unwrap_or(Ok(()))?;

        let tx: VersionedTransaction =
            bincode::deserialize(signed_bytes).map_err(|e| mock_error(&e.to_string()))?;
        tx.signatures
            .first()
            .copied()
            .ok_or_else(|| mock_error("transaction has no signatures"))
    }

    async fn get_transaction_status(
        &self,
        _signature: &Signature,
    ) -> NetworkResult<TransactionStatus> {
        self.with_state(|s| {
            s.status_calls += 1;
            match s.status_script.pop_front() {
                Some(result) => result,
                None => Ok(s.default_status.clone().unwrap_or(TransactionStatus::Pending)),
            }
        })
    }

    async fn get_quote(&self, request: &QuoteRequest) -> NetworkResult<Quote> {
        let delay = self.with_state(|s| {
            s.quote_requests.push(request.clone());
            s.quote_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            s.quote_completions += 1;
            match &s.quote_handler {
                Some(handler) => handler(request),
                None => Ok(ready_quote(request, request.amount.saturating_mul(2))),
            }
        })
    }

    async fn account_exists(&self, account: &Pubkey) -> NetworkResult<bool> {
        Ok(self.with_state(|s| s.existing_accounts.contains(account)))
    }

    async fn get_swap_instructions(
        &self,
        _quote: &Quote,
        _trader: &Pubkey,
    ) -> NetworkResult<Vec<Instruction>> {
        Ok(self.with_state(|s| {
            s.swap_calls += 1;
            s.swap_instructions.clone()
        }))
    }
}

/// Error the cluster reports for an expired blockhash
pub fn blockhash_expired() -> NetworkError {
    NetworkError::BlockhashNotFound {
        endpoint: "mock".to_string(),
    }
}

/// Fresh keypair plus its holder, for signing in tests
pub fn test_signer() -> (Pubkey, crate::wallet::LocalKeyHolder) {
    use solana_sdk::signature::Signer;
    let keypair = Keypair::new();
    let pubkey = keypair.pubkey();
    (pubkey, crate::wallet::LocalKeyHolder::from_keypair(keypair))
}
