//! Transaction pipeline facade
//!
//! Wires the components together for the two user intents:
//!
//! ```text
//! transfer: validate → plan instructions ─┐
//!                                         ├→ assemble → estimate fee → PreparedTransaction
//! swap:     Ready quote → venue instrs ───┘
//!
//! PreparedTransaction → submit (sign, serialize, retry on expiry) → poll → outcome
//! ```
//!
//! Validation failures are reported before anything touches the network.

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::fees::{FeeCache, FeeEstimator};
use crate::metrics::{metrics, Timer};
use crate::network::{NetworkClient, RpcNetworkClient};
use crate::quote::{QuoteEngine, QuoteEngineSettings};
use crate::structured_logging::PipelineLogger;
use crate::submit::{ConfirmationPoller, RetryPolicy, SubmissionRetrier};
use crate::tx_builder::{
    plan_native_transfer, plan_token_transfer, AssemblyRequest, InstructionPlan, PipelineError,
    PreparedTransaction, Result, TokenTransfer, TransactionAssembler,
};
use crate::types::{
    FeeAmount, Quote, QuoteRequest, SwapIntent, TransactionOutcome, TransferAsset, TransferIntent,
};
use crate::wallet::KeyHolder;

#[derive(Debug, Clone)]
pub struct TransactionPipeline {
    network: Arc<dyn NetworkClient>,
    key_holder: Arc<dyn KeyHolder>,
    config: PipelineConfig,
    assembler: TransactionAssembler,
    estimator: FeeEstimator,
    retrier: SubmissionRetrier,
    poller: ConfirmationPoller,
}

impl TransactionPipeline {
    /// Wire the components over `network`. The config is validated first;
    /// zero periods or an empty attempt ceiling are rejected here.
    pub fn new(
        network: Arc<dyn NetworkClient>,
        key_holder: Arc<dyn KeyHolder>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let cache = Arc::new(FeeCache::with_ttl(
            network.clone(),
            config.fees.rent_cache_ttl(),
        ));
        let estimator = FeeEstimator::new(network.clone(), cache, config.fees.rent_commitment);
        let retrier = SubmissionRetrier::new(
            network.clone(),
            key_holder.clone(),
            RetryPolicy::from(&config.submission),
        );
        let poller = ConfirmationPoller::from_config(network.clone(), &config.confirmation);

        Ok(Self {
            assembler: TransactionAssembler::new(network.clone()),
            network,
            key_holder,
            config,
            estimator,
            retrier,
            poller,
        })
    }

    /// Build a pipeline against the live RPC and quote endpoints in `config`
    pub fn connect(config: PipelineConfig, key_holder: Arc<dyn KeyHolder>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let network = RpcNetworkClient::new(&config.rpc, &config.quote)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        Self::new(Arc::new(network), key_holder, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn fee_cache(&self) -> &Arc<FeeCache> {
        self.estimator.cache()
    }

    /// Turn a transfer intent into a fee-accounted transaction
    #[instrument(skip_all, fields(owner = %intent.owner, destination = %intent.destination, amount = intent.amount))]
    pub async fn prepare_transfer(&self, intent: TransferIntent) -> Result<PreparedTransaction> {
        let timer = Timer::new();
        validate_transfer(&intent)?;

        let plan = match intent.asset {
            TransferAsset::Native => {
                plan_native_transfer(&intent.owner, &intent.destination, intent.amount)
            }
            TransferAsset::Token {
                mint,
                decimals,
                token_program,
            } => {
                let destination_account = crate::tx_builder::associated_token_account(
                    &intent.destination,
                    &mint,
                    &token_program,
                );
                let exists = self.network.account_exists(&destination_account).await?;
                plan_token_transfer(
                    TokenTransfer {
                        owner: &intent.owner,
                        destination_wallet: &intent.destination,
                        mint: &mint,
                        token_program: &token_program,
                        amount: intent.amount,
                        decimals,
                    },
                    exists,
                )?
            }
        };

        let InstructionPlan {
            instructions,
            creates_destination_account,
        } = plan;
        let request = AssemblyRequest::new(instructions, intent.owner, intent.api_version);
        let (transaction, fee) = self.assemble_and_estimate(request).await?;

        let native_spend = match intent.asset {
            TransferAsset::Native => intent.amount,
            TransferAsset::Token { .. } => 0,
        };
        ensure_affordable(native_spend, &fee, intent.native_balance)?;

        let prepared = PreparedTransaction::new(transaction, fee);
        PipelineLogger::new(prepared.correlation_id.clone()).log_prepared(
            "transfer",
            prepared.transaction.instructions().len(),
            &fee,
        );
        debug!(creates_destination_account, "Transfer prepared");
        timer.observe_duration(&metrics().prepare_latency);
        Ok(prepared)
    }

    /// Turn a Ready quote into a fee-accounted swap transaction
    #[instrument(skip_all, fields(trader = %intent.trader, in_amount = intent.quote.in_amount))]
    pub async fn prepare_swap(&self, intent: SwapIntent) -> Result<PreparedTransaction> {
        let timer = Timer::new();
        let SwapIntent {
            quote,
            trader,
            native_balance,
            api_version,
        } = intent;

        if let Some(message) = &quote.error_message {
            return Err(PipelineError::QuoteUnavailable(message.clone()));
        }
        if quote.in_amount == 0 {
            return Err(PipelineError::InvalidAmount("swap amount is zero".to_string()));
        }

        let instructions = self.network.get_swap_instructions(&quote, &trader).await?;
        if instructions.is_empty() {
            return Err(PipelineError::QuoteUnavailable(
                "venue returned no swap instructions".to_string(),
            ));
        }

        let request = AssemblyRequest::new(instructions, trader, api_version);
        let (transaction, fee) = self.assemble_and_estimate(request).await?;

        let native_spend = if quote.input_mint == spl_token::native_mint::id() {
            quote.in_amount
        } else {
            0
        };
        ensure_affordable(native_spend, &fee, native_balance)?;

        let prepared = PreparedTransaction::new(transaction, fee).with_quote(quote);
        PipelineLogger::new(prepared.correlation_id.clone()).log_prepared(
            "swap",
            prepared.transaction.instructions().len(),
            &fee,
        );
        timer.observe_duration(&metrics().prepare_latency);
        Ok(prepared)
    }

    async fn assemble_and_estimate(
        &self,
        request: AssemblyRequest,
    ) -> Result<(crate::tx_builder::UnsignedTransaction, FeeAmount)> {
        let transaction = self.assembler.prepare(request, None).await?;
        let fee = self.estimator.estimate(&transaction).await?;
        Ok((transaction, fee))
    }

    /// Sign, serialize and broadcast. Returns once the cluster accepted it.
    pub async fn submit(&self, prepared: &PreparedTransaction) -> Result<Signature> {
        match self.retrier.submit(prepared).await {
            Ok(signature) => Ok(signature),
            Err(err) => {
                PipelineLogger::new(prepared.correlation_id.clone()).error("submit", &err);
                Err(err)
            }
        }
    }

    pub async fn poll_until_terminal(&self, signature: Signature) -> TransactionOutcome {
        self.poller.poll_until_terminal(signature).await
    }

    /// Submit and then track to a terminal outcome
    pub async fn send_and_confirm(
        &self,
        prepared: &PreparedTransaction,
    ) -> Result<TransactionOutcome> {
        let timer = Timer::new();
        let signature = self.submit(prepared).await?;
        let outcome = self.poller.poll_until_terminal(signature).await;
        PipelineLogger::new(prepared.correlation_id.clone())
            .log_outcome(&outcome, timer.elapsed_ms());
        Ok(outcome)
    }

    /// One-shot quote lookup. A venue refusal is `QuoteUnavailable`.
    #[instrument(skip_all, fields(input = %request.input_mint, output = %request.output_mint, amount = request.amount))]
    pub async fn get_quote(&self, request: QuoteRequest) -> Result<Quote> {
        let request = self.normalize_quote_request(request)?;
        if request.amount == 0 {
            return Err(PipelineError::InvalidAmount("quote amount is zero".to_string()));
        }

        metrics().quote_fetches_total.inc();
        let quote = match self.network.get_quote(&request).await {
            Ok(quote) => quote,
            Err(err) => {
                metrics().quote_errors_total.inc();
                return Err(err.into());
            }
        };

        match &quote.error_message {
            Some(message) => {
                metrics().quote_errors_total.inc();
                Err(PipelineError::QuoteUnavailable(message.clone()))
            }
            None => {
                info!(out_amount = quote.out_amount, venue = %quote.venue_label(), "Quote received");
                Ok(quote)
            }
        }
    }

    /// Start a live quote engine for `request`; update it as the input changes
    pub fn observe_quote(&self, request: QuoteRequest) -> Result<QuoteEngine> {
        let request = self.normalize_quote_request(request)?;
        Ok(QuoteEngine::spawn(
            self.network.clone(),
            request,
            QuoteEngineSettings::from(&self.config.quote),
        ))
    }

    fn normalize_quote_request(&self, mut request: QuoteRequest) -> Result<QuoteRequest> {
        if request.input_mint == request.output_mint {
            return Err(PipelineError::InvalidAmount(
                "input and output asset are the same".to_string(),
            ));
        }
        if request.slippage_bps == 0 {
            request.slippage_bps = self.config.quote.default_slippage_bps;
        }
        if request.slippage_bps > self.config.quote.max_slippage_bps {
            return Err(PipelineError::InvalidAmount(format!(
                "slippage {} bps exceeds maximum {} bps",
                request.slippage_bps, self.config.quote.max_slippage_bps
            )));
        }
        Ok(request)
    }

    pub fn key_holder(&self) -> &Arc<dyn KeyHolder> {
        &self.key_holder
    }
}

/// Checks that need no network access
fn validate_transfer(intent: &TransferIntent) -> Result<()> {
    if intent.amount == 0 {
        return Err(PipelineError::InvalidAmount("transfer amount is zero".to_string()));
    }
    if intent.destination == intent.owner {
        return Err(PipelineError::SelfTransfer);
    }
    if intent.destination == Pubkey::default() {
        return Err(PipelineError::invalid_destination(
            "destination is the system program",
        ));
    }

    match intent.asset {
        TransferAsset::Native => {
            if intent.amount > intent.native_balance {
                return Err(PipelineError::insufficient_funds(
                    intent.amount,
                    intent.native_balance,
                ));
            }
        }
        TransferAsset::Token { mint, .. } => {
            if intent.destination == mint {
                return Err(PipelineError::invalid_destination(
                    "destination is the token mint",
                ));
            }
            // Associated accounts can only be derived for wallet addresses
            if !intent.destination.is_on_curve() {
                return Err(PipelineError::invalid_destination(format!(
                    "{} is not a wallet address",
                    intent.destination
                )));
            }
            if let Some(balance) = intent.token_balance {
                if intent.amount > balance {
                    return Err(PipelineError::insufficient_funds(intent.amount, balance));
                }
            }
        }
    }
    Ok(())
}

/// The native balance must cover what is sent plus what the transaction consumes
fn ensure_affordable(native_spend: u64, fee: &FeeAmount, native_balance: u64) -> Result<()> {
    let required = native_spend.saturating_add(fee.spent());
    if required > native_balance {
        return Err(PipelineError::insufficient_funds(required, native_balance));
    }
    Ok(())
}
