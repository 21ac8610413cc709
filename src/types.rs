//! Common types used throughout the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

/// Wire-protocol era used when assembling a transaction.
///
/// The era decides both the RPC call that supplies the recent blockhash
/// and the message format that gets compiled:
/// - `Legacy`: `getRecentBlockhash` + legacy message
/// - `V0`: `getLatestBlockhash` + v0 message
///
/// Agave 2.x nodes no longer serve `getRecentBlockhash`. Against those the
/// `Legacy` era answers "method not found" and the live client falls back to
/// `getLatestBlockhash`; the message format stays legacy either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    Legacy,
    #[default]
    V0,
}

/// Total cost of a transaction, in lamports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeAmount {
    /// Flat per-signature network fee for the compiled message
    pub network_fee: u64,
    /// Rent-exemption funding required by accounts the transaction creates
    pub rent_exemption_delta: u64,
    /// Rent-exemption floor of a zero-size account (spendable-balance buffer)
    pub account_rent_floor: u64,
}

impl FeeAmount {
    /// Sum of all fee components
    #[must_use]
    pub fn total(&self) -> u64 {
        self.network_fee
            .saturating_add(self.rent_exemption_delta)
            .saturating_add(self.account_rent_floor)
    }

    /// Lamports the transaction itself consumes (network fee plus new-account funding)
    #[must_use]
    pub fn spent(&self) -> u64 {
        self.network_fee.saturating_add(self.rent_exemption_delta)
    }
}

/// Parameters for a quote lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Input amount in minor units of `input_mint`
    pub amount: u64,
    /// Wallet that will execute the swap, when known
    pub trader: Option<Pubkey>,
    pub slippage_bps: u16,
}

impl QuoteRequest {
    /// Same request for a different amount
    #[must_use]
    pub fn with_amount(&self, amount: u64) -> Self {
        Self {
            amount,
            ..self.clone()
        }
    }
}

/// Priced execution plan for exchanging one asset for another.
///
/// Quotes are immutable snapshots. A quote that carries an `error_message`
/// is logically absent and must never be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub min_out_amount: u64,
    /// Venue labels along the route, in hop order
    pub route: Vec<String>,
    pub price_impact_pct: f64,
    pub slippage_bps: u16,
    pub error_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Venue payload, handed back verbatim when requesting swap instructions
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Quote {
    /// Build the placeholder quote a venue returns when it cannot price the request
    pub fn unavailable(request: &QuoteRequest, message: impl Into<String>) -> Self {
        Self {
            input_mint: request.input_mint,
            output_mint: request.output_mint,
            in_amount: request.amount,
            out_amount: 0,
            min_out_amount: 0,
            route: Vec::new(),
            price_impact_pct: 0.0,
            slippage_bps: request.slippage_bps,
            error_message: Some(message.into()),
            fetched_at: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    /// Whether this quote can be turned into a transaction
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.error_message.is_none()
    }

    /// Human-readable route label for confirmation prompts
    pub fn venue_label(&self) -> String {
        if self.route.is_empty() {
            "Direct".to_string()
        } else {
            self.route.join(" → ")
        }
    }
}

/// On-chain status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not yet visible at the requested commitment
    Pending,
    Confirmed,
    /// Landed but the program execution failed
    Failed(String),
}

/// Lifecycle of a submitted transaction as reported to callers.
///
/// `Confirmed`, `Failed` and `TimedOut` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Submitted(Signature),
    Confirmed(Signature),
    Failed { signature: Signature, reason: String },
    /// Submitted but never observed as confirmed; may still land later
    TimedOut(Signature),
}

impl TransactionOutcome {
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Submitted(sig) | Self::Confirmed(sig) | Self::TimedOut(sig) => sig,
            Self::Failed { signature, .. } => signature,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted(_))
    }

    /// Move to `next` unless this outcome is already terminal
    #[must_use]
    pub fn advance(self, next: TransactionOutcome) -> TransactionOutcome {
        if self.is_terminal() {
            tracing::warn!(
                current = ?self,
                rejected = ?next,
                "Ignoring transition out of terminal outcome"
            );
            return self;
        }
        next
    }

    /// Collapse into the three states a caller may show a user
    pub fn verdict(&self) -> UserVerdict {
        match self {
            Self::Confirmed(_) => UserVerdict::Success,
            Self::Failed { reason, .. } => UserVerdict::Failure(reason.clone()),
            Self::Submitted(_) | Self::TimedOut(_) => UserVerdict::Unconfirmed,
        }
    }
}

/// What a user is told about a transaction. Never conflates failed with unconfirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserVerdict {
    Success,
    Failure(String),
    Unconfirmed,
}

/// Asset moved by a transfer intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAsset {
    /// Native SOL
    Native,
    /// SPL token held in associated token accounts
    Token {
        mint: Pubkey,
        decimals: u8,
        token_program: Pubkey,
    },
}

/// "Send X to Y"
#[derive(Debug, Clone)]
pub struct TransferIntent {
    /// Owner of the funds; also the fee payer
    pub owner: Pubkey,
    /// Recipient wallet (not a token account)
    pub destination: Pubkey,
    /// Amount in minor units of the asset
    pub amount: u64,
    pub asset: TransferAsset,
    /// Spendable native balance of `owner`
    pub native_balance: u64,
    /// Spendable token balance of `owner` for token transfers
    pub token_balance: Option<u64>,
    pub api_version: ApiVersion,
}

/// "Swap A for B" using a quote the caller last observed as ready
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub quote: Quote,
    pub trader: Pubkey,
    /// Spendable native balance of `trader`
    pub native_balance: u64,
    pub api_version: ApiVersion,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> QuoteRequest {
        QuoteRequest {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            amount: 1_000_000,
            trader: None,
            slippage_bps: 50,
        }
    }

    #[test]
    fn test_fee_amount_total() {
        let fee = FeeAmount {
            network_fee: 5_000,
            rent_exemption_delta: 2_039_280,
            account_rent_floor: 890_880,
        };
        assert_eq!(fee.total(), 2_935_160);
        assert_eq!(fee.spent(), 2_044_280);
    }

    #[test]
    fn test_fee_amount_saturates() {
        let fee = FeeAmount {
            network_fee: u64::MAX,
            rent_exemption_delta: 1,
            account_rent_floor: 1,
        };
        assert_eq!(fee.total(), u64::MAX);
    }

    #[test]
    fn test_unavailable_quote_is_not_executable() {
        let quote = Quote::unavailable(&sample_request(), "Insufficient liquidity");
        assert!(!quote.is_executable());
        assert_eq!(quote.error_message.as_deref(), Some("Insufficient liquidity"));
        assert_eq!(quote.venue_label(), "Direct");
    }

    #[test]
    fn test_venue_label_joins_hops() {
        let mut quote = Quote::unavailable(&sample_request(), "x");
        quote.route = vec!["Raydium".to_string(), "Orca".to_string()];
        assert_eq!(quote.venue_label(), "Raydium → Orca");
    }

    #[test]
    fn test_terminal_outcome_does_not_advance() {
        let sig = Signature::new_unique();
        let outcome = TransactionOutcome::Submitted(sig).advance(TransactionOutcome::TimedOut(sig));
        assert_eq!(outcome, TransactionOutcome::TimedOut(sig));

        let outcome = outcome.advance(TransactionOutcome::Confirmed(sig));
        assert_eq!(outcome, TransactionOutcome::TimedOut(sig));
    }

    #[test]
    fn test_verdicts_keep_unconfirmed_apart_from_failed() {
        let sig = Signature::new_unique();
        assert_eq!(TransactionOutcome::Confirmed(sig).verdict(), UserVerdict::Success);
        assert_eq!(TransactionOutcome::TimedOut(sig).verdict(), UserVerdict::Unconfirmed);
        assert_eq!(TransactionOutcome::Submitted(sig).verdict(), UserVerdict::Unconfirmed);
        assert_eq!(
            TransactionOutcome::Failed {
                signature: sig,
                reason: "custom program error: 0x1".to_string()
            }
            .verdict(),
            UserVerdict::Failure("custom program error: 0x1".to_string())
        );
    }

    #[test]
    fn test_quote_request_with_amount() {
        let request = sample_request();
        let next = request.with_amount(42);
        assert_eq!(next.amount, 42);
        assert_eq!(next.input_mint, request.input_mint);
    }
}
