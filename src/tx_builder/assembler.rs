//! Transaction assembly
//!
//! Turns an ordered instruction list into an [`UnsignedTransaction`] with a
//! recent blockhash. The blockhash is fetched as late as possible, right
//! before the transaction is returned, so it has the longest possible
//! validity window when it reaches the retrier.

use solana_sdk::{hash::Hash, instruction::Instruction, pubkey::Pubkey};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::network::NetworkClient;
use crate::tx_builder::errors::PipelineError;
use crate::tx_builder::instructions::validate_plan;
use crate::tx_builder::signing::UnsignedTransaction;
use crate::types::ApiVersion;
use crate::wallet::KeyHolder;

/// What to assemble
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub instructions: Vec<Instruction>,
    pub fee_payer: Pubkey,
    /// Use this blockhash instead of fetching one
    pub recent_blockhash: Option<Hash>,
    pub api_version: ApiVersion,
}

impl AssemblyRequest {
    pub fn new(instructions: Vec<Instruction>, fee_payer: Pubkey, api_version: ApiVersion) -> Self {
        Self {
            instructions,
            fee_payer,
            recent_blockhash: None,
            api_version,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionAssembler {
    network: Arc<dyn NetworkClient>,
}

impl TransactionAssembler {
    pub fn new(network: Arc<dyn NetworkClient>) -> Self {
        Self { network }
    }

    /// Assemble `request`, signing for whatever required signers
    /// `key_holder` holds. Without a key holder the result stays unsigned,
    /// which is enough for fee estimation and simulation.
    #[instrument(skip_all, fields(fee_payer = %request.fee_payer, api_version = ?request.api_version))]
    pub async fn prepare(
        &self,
        request: AssemblyRequest,
        key_holder: Option<&dyn KeyHolder>,
    ) -> Result<UnsignedTransaction, PipelineError> {
        validate_plan(&request.instructions)?;
        let mut tx =
            UnsignedTransaction::new(request.instructions, request.fee_payer, request.api_version)?;

        let blockhash = match request.recent_blockhash {
            Some(hash) => hash,
            None => self.network.get_recent_block_reference(request.api_version).await?,
        };
        tx.set_blockhash(blockhash);

        if let Some(holder) = key_holder {
            let signed = tx.sign_partial(holder).await?;
            debug!(
                signed,
                missing = tx.missing_signers().len(),
                "Partially signed during assembly"
            );
        }

        Ok(tx)
    }

    /// Replace the blockhash with a fresh one for the transaction's era.
    /// Existing signatures are dropped because they covered the old message.
    pub async fn refresh_blockhash(
        &self,
        tx: &mut UnsignedTransaction,
    ) -> Result<Hash, PipelineError> {
        let blockhash = self
            .network
            .get_recent_block_reference(tx.api_version())
            .await?;
        tx.set_blockhash(blockhash);
        debug!(blockhash = %blockhash, "Blockhash refreshed");
        Ok(blockhash)
    }
}
