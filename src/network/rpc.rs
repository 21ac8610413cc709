//! Live [`NetworkClient`] backed by Solana JSON-RPC and a Jupiter-compatible
//! swap aggregator.
//!
//! Chain calls go through the nonblocking `RpcClient`. Quote and
//! swap-instruction calls go through `reqwest`, throttled by a `governor`
//! rate limiter so a fast-typing user cannot flood the aggregator.

use async_trait::async_trait;
use base64::Engine;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::request::RpcRequest;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::Signature,
};
use solana_transaction_status::TransactionStatus as RpcTransactionStatus;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::{NetworkClient, NetworkError, NetworkResult};
use crate::config::{QuoteConfig, RpcConfig};
use crate::metrics::metrics;
use crate::types::{ApiVersion, Quote, QuoteRequest, TransactionStatus};

/// Network client talking to a real cluster and swap aggregator
pub struct RpcNetworkClient {
    rpc: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
    http: reqwest::Client,
    quote_api: String,
    quote_api_key: Option<String>,
    quote_limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for RpcNetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcNetworkClient")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment)
            .field("quote_api", &self.quote_api)
            .finish_non_exhaustive()
    }
}

impl RpcNetworkClient {
    /// Create a client from the RPC and quote sections of the configuration
    pub fn new(rpc: &RpcConfig, quote: &QuoteConfig) -> NetworkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(quote.timeout_secs))
            .build()
            .map_err(|e| NetworkError::from_http_error(e, &quote.api_url))?;

        let rps = NonZeroU32::new(quote.rate_limit_rps).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            rpc: Arc::new(RpcClient::new_with_timeout_and_commitment(
                rpc.url.clone(),
                rpc.timeout(),
                rpc.commitment_config(),
            )),
            endpoint: rpc.url.clone(),
            commitment: rpc.commitment_config(),
            http,
            quote_api: quote.api_url.trim_end_matches('/').to_string(),
            quote_api_key: quote.api_key.clone(),
            quote_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    fn rpc_error(&self, err: solana_client::client_error::ClientError) -> NetworkError {
        NetworkError::from_client_error(err, &self.endpoint)
    }

    fn observe_rpc_latency(started: Instant) {
        metrics().rpc_latency.observe(started.elapsed().as_secs_f64());
    }

    async fn latest_blockhash(&self) -> NetworkResult<Hash> {
        self.rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map(|(hash, _last_valid_block_height)| hash)
            .map_err(|e| self.rpc_error(e))
    }

    /// `getRecentBlockhash` was removed from Agave 2.x nodes; callers fall
    /// back to `getLatestBlockhash` when the method is not found.
    async fn legacy_recent_blockhash(&self) -> NetworkResult<Hash> {
        let response: Value = self
            .rpc
            .send(
                RpcRequest::Custom {
                    method: "getRecentBlockhash",
                },
                json!([{ "commitment": self.commitment.commitment }]),
            )
            .await
            .map_err(|e| self.rpc_error(e))?;

        let blockhash = response
            .pointer("/value/blockhash")
            .and_then(Value::as_str)
            .ok_or_else(|| NetworkError::InvalidResponse {
                endpoint: self.endpoint.clone(),
                message: "getRecentBlockhash response has no blockhash".to_string(),
            })?;

        Hash::from_str(blockhash).map_err(|e| NetworkError::InvalidResponse {
            endpoint: self.endpoint.clone(),
            message: format!("invalid blockhash {}: {}", blockhash, e),
        })
    }

    fn with_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.quote_api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn read_json(&self, response: reqwest::Response, url: &str) -> NetworkResult<(u16, Value)> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| NetworkError::from_http_error(e, url))?;
        // Error pages are not always JSON; the status still classifies them
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok((status, body))
    }
}

#[async_trait]
impl NetworkClient for RpcNetworkClient {
    #[instrument(skip(self))]
    async fn get_recent_block_reference(&self, api_version: ApiVersion) -> NetworkResult<Hash> {
        let started = Instant::now();
        let result = match api_version {
            ApiVersion::V0 => self.latest_blockhash().await,
            ApiVersion::Legacy => match self.legacy_recent_blockhash().await {
                Err(err) if err.is_method_not_found() => {
                    warn!(endpoint = %self.endpoint, "getRecentBlockhash not served, falling back to getLatestBlockhash");
                    self.latest_blockhash().await
                }
                other => other,
            },
        };
        Self::observe_rpc_latency(started);

        if let Ok(hash) = &result {
            debug!(blockhash = %hash, ?api_version, "Fetched recent blockhash");
        }
        result
    }

    async fn get_fee_for_message(&self, message: &VersionedMessage) -> NetworkResult<u64> {
        let started = Instant::now();
        let result = match message {
            VersionedMessage::Legacy(message) => self.rpc.get_fee_for_message(message).await,
            VersionedMessage::V0(message) => self.rpc.get_fee_for_message(message).await,
        };
        Self::observe_rpc_latency(started);
        result.map_err(|e| self.rpc_error(e))
    }

    #[instrument(skip(self))]
    async fn get_rent_exemption_floor(
        &self,
        span: usize,
        commitment: CommitmentLevel,
    ) -> NetworkResult<u64> {
        let started = Instant::now();
        let result = self
            .rpc
            .send::<u64>(
                RpcRequest::GetMinimumBalanceForRentExemption,
                json!([span, { "commitment": commitment }]),
            )
            .await;
        Self::observe_rpc_latency(started);
        result.map_err(|e| self.rpc_error(e))
    }

    async fn submit(&self, signed_bytes: &[u8]) -> NetworkResult<Signature> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(signed_bytes);
        let started = Instant::now();
        let result = self
            .rpc
            .send::<String>(
                RpcRequest::SendTransaction,
                json!([encoded, {
                    "encoding": "base64",
                    "preflightCommitment": self.commitment.commitment,
                }]),
            )
            .await;
        Self::observe_rpc_latency(started);

        let signature = result.map_err(|e| self.rpc_error(e))?;
        Signature::from_str(&signature).map_err(|e| NetworkError::InvalidResponse {
            endpoint: self.endpoint.clone(),
            message: format!("invalid signature {}: {}", signature, e),
        })
    }

    async fn get_transaction_status(
        &self,
        signature: &Signature,
    ) -> NetworkResult<TransactionStatus> {
        let started = Instant::now();
        let response = self.rpc.get_signature_statuses(&[*signature]).await;
        Self::observe_rpc_latency(started);

        let status: Option<RpcTransactionStatus> = response
            .map_err(|e| self.rpc_error(e))?
            .value
            .into_iter()
            .next()
            .flatten();

        Ok(match status {
            None => TransactionStatus::Pending,
            Some(status) => {
                if let Some(err) = &status.err {
                    TransactionStatus::Failed(err.to_string())
                } else if status.satisfies_commitment(self.commitment) {
                    TransactionStatus::Confirmed
                } else {
                    TransactionStatus::Pending
                }
            }
        })
    }

    #[instrument(skip(self, request), fields(amount = request.amount, trader = ?request.trader))]
    async fn get_quote(&self, request: &QuoteRequest) -> NetworkResult<Quote> {
        let url = format!("{}/quote", self.quote_api);
        self.quote_limiter.until_ready().await;

        let query = [
            ("inputMint", request.input_mint.to_string()),
            ("outputMint", request.output_mint.to_string()),
            ("amount", request.amount.to_string()),
            ("slippageBps", request.slippage_bps.to_string()),
            ("restrictIntermediateTokens", "true".to_string()),
        ];

        let response = self
            .with_api_key(self.http.get(&url).query(&query))
            .send()
            .await
            .map_err(|e| NetworkError::from_http_error(e, &url))?;
        let (status, body) = self.read_json(response, &url).await?;

        match status {
            200..=299 => parse_quote(request, body, &url),
            429 => Err(NetworkError::RateLimitExceeded { endpoint: url }),
            400..=499 => {
                // The aggregator refuses to price this pair/amount
                let message = venue_error_message(&body).unwrap_or("No route found");
                warn!(status, message, "Quote refused by venue");
                Ok(Quote::unavailable(request, message))
            }
            _ => Err(NetworkError::RpcResponse {
                message: venue_error_message(&body)
                    .unwrap_or("quote request failed")
                    .to_string(),
                endpoint: url,
                code: Some(i64::from(status)),
            }),
        }
    }

    async fn account_exists(&self, account: &Pubkey) -> NetworkResult<bool> {
        let started = Instant::now();
        let response = self
            .rpc
            .get_account_with_commitment(account, self.commitment)
            .await;
        Self::observe_rpc_latency(started);
        Ok(response.map_err(|e| self.rpc_error(e))?.value.is_some())
    }

    #[instrument(skip(self, quote))]
    async fn get_swap_instructions(
        &self,
        quote: &Quote,
        trader: &Pubkey,
    ) -> NetworkResult<Vec<Instruction>> {
        let url = format!("{}/swap-instructions", self.quote_api);
        self.quote_limiter.until_ready().await;

        let payload = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": trader.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });

        let response = self
            .with_api_key(self.http.post(&url).json(&payload))
            .send()
            .await
            .map_err(|e| NetworkError::from_http_error(e, &url))?;
        let (status, body) = self.read_json(response, &url).await?;

        if !(200..300).contains(&status) {
            return Err(NetworkError::RpcResponse {
                message: venue_error_message(&body)
                    .unwrap_or("swap-instructions request failed")
                    .to_string(),
                endpoint: url,
                code: Some(i64::from(status)),
            });
        }
        parse_swap_instructions(body, &url)
    }
}

fn venue_error_message(body: &Value) -> Option<&str> {
    body.get("error")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueQuote {
    input_mint: String,
    in_amount: String,
    output_mint: String,
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
    slippage_bps: u16,
    #[serde(default)]
    route_plan: Vec<VenueRouteStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueRouteStep {
    swap_info: VenueSwapInfo,
}

#[derive(Debug, Deserialize)]
struct VenueSwapInfo {
    #[serde(default)]
    label: Option<String>,
}

fn invalid(endpoint: &str, message: impl Into<String>) -> NetworkError {
    NetworkError::InvalidResponse {
        endpoint: endpoint.to_string(),
        message: message.into(),
    }
}

fn parse_amount(value: &str, field: &str, endpoint: &str) -> NetworkResult<u64> {
    value
        .parse::<u64>()
        .map_err(|e| invalid(endpoint, format!("{} '{}': {}", field, value, e)))
}

fn parse_pubkey(value: &str, field: &str, endpoint: &str) -> NetworkResult<Pubkey> {
    Pubkey::from_str(value).map_err(|e| invalid(endpoint, format!("{} '{}': {}", field, value, e)))
}

/// Turn an aggregator quote body into a [`Quote`]
pub(crate) fn parse_quote(request: &QuoteRequest, body: Value, endpoint: &str) -> NetworkResult<Quote> {
    if let Some(message) = venue_error_message(&body) {
        return Ok(Quote::unavailable(request, message));
    }

    let venue: VenueQuote =
        serde_json::from_value(body.clone()).map_err(|e| invalid(endpoint, e.to_string()))?;

    let price_impact_pct = match venue.price_impact_pct.as_deref() {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|e| invalid(endpoint, format!("priceImpactPct '{}': {}", raw, e)))?,
        None => 0.0,
    };

    Ok(Quote {
        input_mint: parse_pubkey(&venue.input_mint, "inputMint", endpoint)?,
        output_mint: parse_pubkey(&venue.output_mint, "outputMint", endpoint)?,
        in_amount: parse_amount(&venue.in_amount, "inAmount", endpoint)?,
        out_amount: parse_amount(&venue.out_amount, "outAmount", endpoint)?,
        min_out_amount: parse_amount(&venue.other_amount_threshold, "otherAmountThreshold", endpoint)?,
        route: venue
            .route_plan
            .into_iter()
            .filter_map(|step| step.swap_info.label)
            .collect(),
        price_impact_pct,
        slippage_bps: venue.slippage_bps,
        error_message: None,
        fetched_at: chrono::Utc::now(),
        raw: body,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueInstruction {
    program_id: String,
    accounts: Vec<VenueAccountMeta>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueAccountMeta {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueSwapInstructions {
    #[serde(default)]
    compute_budget_instructions: Vec<VenueInstruction>,
    #[serde(default)]
    setup_instructions: Vec<VenueInstruction>,
    swap_instruction: VenueInstruction,
    #[serde(default)]
    cleanup_instruction: Option<VenueInstruction>,
}

impl VenueInstruction {
    fn into_instruction(self, endpoint: &str) -> NetworkResult<Instruction> {
        let accounts = self
            .accounts
            .into_iter()
            .map(|meta| {
                Ok(AccountMeta {
                    pubkey: parse_pubkey(&meta.pubkey, "pubkey", endpoint)?,
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
            })
            .collect::<NetworkResult<Vec<_>>>()?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| invalid(endpoint, format!("instruction data: {}", e)))?;

        Ok(Instruction {
            program_id: parse_pubkey(&self.program_id, "programId", endpoint)?,
            accounts,
            data,
        })
    }
}

/// Flatten a swap-instructions body into execution order:
/// compute budget, setup, swap, cleanup
pub(crate) fn parse_swap_instructions(body: Value, endpoint: &str) -> NetworkResult<Vec<Instruction>> {
    if let Some(message) = venue_error_message(&body) {
        return Err(invalid(endpoint, message));
    }

    let venue: VenueSwapInstructions =
        serde_json::from_value(body).map_err(|e| invalid(endpoint, e.to_string()))?;

    venue
        .compute_budget_instructions
        .into_iter()
        .chain(venue.setup_instructions)
        .chain(std::iter::once(venue.swap_instruction))
        .chain(venue.cleanup_instruction)
        .map(|ix| ix.into_instruction(endpoint))
        .collect()
}
