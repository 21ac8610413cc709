//! Output of the prepare step
//!
//! A [`PreparedTransaction`] is what the pipeline hands back from
//! `prepare_transfer`/`prepare_swap`: the unsigned transaction with its
//! blockhash filled in, the fee the user will pay and, for swaps, the quote
//! it executes. It is the unit that `submit` and `send_and_confirm` consume.

use solana_sdk::pubkey::Pubkey;

use crate::observability::CorrelationId;
use crate::tx_builder::signing::UnsignedTransaction;
use crate::types::{FeeAmount, Quote};

#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    /// Transaction with blockhash; signatures are attached at submission
    pub transaction: UnsignedTransaction,

    pub fee: FeeAmount,

    /// Quote being executed (swaps only)
    pub quote: Option<Quote>,

    /// Ties together every log line of this transaction's lifecycle
    pub correlation_id: CorrelationId,
}

impl PreparedTransaction {
    pub fn new(transaction: UnsignedTransaction, fee: FeeAmount) -> Self {
        Self {
            transaction,
            fee,
            quote: None,
            correlation_id: CorrelationId::new(),
        }
    }

    #[must_use]
    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn fee_payer(&self) -> &Pubkey {
        self.transaction.fee_payer()
    }

    pub fn required_signers(&self) -> Vec<Pubkey> {
        self.transaction.required_signers()
    }
}
