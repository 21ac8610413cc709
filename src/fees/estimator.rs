//! Fee estimation for prepared transactions
//!
//! The fee a user sees is:
//! - the network fee the cluster quotes for the compiled message,
//! - plus rent-exemption funding for accounts the transaction creates,
//! - plus the zero-byte rent floor as a spendable-balance buffer.
//!
//! Only two account-creating instructions are recognised: system
//! `CreateAccount` and the associated-token-account program's
//! `Create`/`CreateIdempotent`. Accounts created by any other program
//! (swap venues opening temporary accounts, for instance) are not counted,
//! so the estimate can under-shoot for those.

use solana_sdk::{
    commitment_config::CommitmentLevel, instruction::Instruction, system_program,
};
#[allow(deprecated)]
use solana_sdk::system_instruction::SystemInstruction;
use std::sync::Arc;
use tracing::debug;

use crate::fees::cache::FeeCache;
use crate::network::NetworkClient;
use crate::tx_builder::{PipelineError, UnsignedTransaction};
use crate::types::FeeAmount;

/// Size of an SPL token account
pub const TOKEN_ACCOUNT_SPAN: usize = 165;

// Associated-token-account instruction tags
const ATA_CREATE: u8 = 0;
const ATA_CREATE_IDEMPOTENT: u8 = 1;

#[derive(Debug, Clone)]
pub struct FeeEstimator {
    network: Arc<dyn NetworkClient>,
    cache: Arc<FeeCache>,
    commitment: CommitmentLevel,
}

impl FeeEstimator {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        cache: Arc<FeeCache>,
        commitment: CommitmentLevel,
    ) -> Self {
        Self {
            network,
            cache,
            commitment,
        }
    }

    pub fn cache(&self) -> &Arc<FeeCache> {
        &self.cache
    }

    /// Estimate the total cost of `tx`. The transaction needs a blockhash.
    pub async fn estimate(&self, tx: &UnsignedTransaction) -> Result<FeeAmount, PipelineError> {
        if tx.recent_blockhash().is_none() {
            return Err(PipelineError::MissingBlockhash);
        }

        let message = tx.compile_message()?;
        let (network_fee, account_rent_floor) = futures::try_join!(
            self.network.get_fee_for_message(&message),
            self.cache.get(0, self.commitment),
        )?;

        let mut rent_exemption_delta: u64 = 0;
        for (index, ix) in tx.instructions().iter().enumerate() {
            match account_creation_span(ix) {
                Some(span) => {
                    let floor = self.cache.get(span, self.commitment).await?;
                    rent_exemption_delta = rent_exemption_delta.saturating_add(floor);
                }
                None => debug!(
                    index,
                    program = %ix.program_id,
                    "Instruction contributes no rent to the estimate"
                ),
            }
        }

        Ok(FeeAmount {
            network_fee,
            rent_exemption_delta,
            account_rent_floor,
        })
    }
}

/// Span of the account `ix` creates, for the instruction kinds the estimate
/// knows how to fund
pub fn account_creation_span(ix: &Instruction) -> Option<usize> {
    // Both rules need the created account at index 1
    ix.accounts.get(1)?;

    if ix.program_id == system_program::id() {
        #[allow(deprecated)]
        return match bincode::deserialize::<SystemInstruction>(&ix.data) {
            Ok(SystemInstruction::CreateAccount { space, .. }) => usize::try_from(space).ok(),
            _ => None,
        };
    }

    if ix.program_id == spl_associated_token_account::id() {
        return match ix.data.first() {
            None | Some(&ATA_CREATE) | Some(&ATA_CREATE_IDEMPOTENT) => Some(TOKEN_ACCOUNT_SPAN),
            _ => None,
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{rent_floor_for, MockNetworkClient};
    use crate::types::ApiVersion;
    use proptest::prelude::*;
    use solana_sdk::{
        hash::Hash,
        instruction::AccountMeta,
        pubkey::Pubkey,
    };
    #[allow(deprecated)]
    use solana_sdk::system_instruction;
    use spl_associated_token_account::instruction::{
        create_associated_token_account, create_associated_token_account_idempotent,
    };

    fn estimator(mock: &Arc<MockNetworkClient>) -> FeeEstimator {
        let network: Arc<dyn NetworkClient> = mock.clone();
        let cache = Arc::new(FeeCache::new(network.clone()));
        FeeEstimator::new(network, cache, CommitmentLevel::Confirmed)
    }

    fn unsigned(payer: Pubkey, instructions: Vec<Instruction>) -> UnsignedTransaction {
        let mut tx = UnsignedTransaction::new(instructions, payer, ApiVersion::V0).unwrap();
        tx.set_blockhash(Hash::new_unique());
        tx
    }

    #[test]
    fn test_create_account_span() {
        let payer = Pubkey::new_unique();
        let ix = system_instruction::create_account(
            &payer,
            &Pubkey::new_unique(),
            1_000_000,
            82,
            &spl_token::ID,
        );
        assert_eq!(account_creation_span(&ix), Some(82));
    }

    #[test]
    fn test_ata_create_spans() {
        let payer = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let create = create_associated_token_account(&payer, &wallet, &mint, &spl_token::ID);
        let idempotent =
            create_associated_token_account_idempotent(&payer, &wallet, &mint, &spl_token::ID);

        assert_eq!(account_creation_span(&create), Some(TOKEN_ACCOUNT_SPAN));
        assert_eq!(account_creation_span(&idempotent), Some(TOKEN_ACCOUNT_SPAN));
    }

    #[test]
    fn test_other_instructions_contribute_nothing() {
        let payer = Pubkey::new_unique();
        let transfer = system_instruction::transfer(&payer, &Pubkey::new_unique(), 5);
        assert_eq!(account_creation_span(&transfer), None);

        // A venue program that opens an account is not recognised
        let venue = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[0],
            vec![AccountMeta::new(payer, true), AccountMeta::new(Pubkey::new_unique(), false)],
        );
        assert_eq!(account_creation_span(&venue), None);

        // Missing new-account argument
        let truncated = Instruction::new_with_bytes(
            spl_associated_token_account::id(),
            &[1],
            vec![AccountMeta::new(payer, true)],
        );
        assert_eq!(account_creation_span(&truncated), None);
    }

    #[tokio::test]
    async fn test_simple_transfer_estimate() {
        let mock = Arc::new(MockNetworkClient::new());
        let payer = Pubkey::new_unique();
        let tx = unsigned(
            payer,
            vec![system_instruction::transfer(&payer, &Pubkey::new_unique(), 1_000)],
        );

        let fee = estimator(&mock).estimate(&tx).await.unwrap();
        assert_eq!(fee.network_fee, 5_000);
        assert_eq!(fee.rent_exemption_delta, 0);
        assert_eq!(fee.account_rent_floor, rent_floor_for(0));
    }

    #[tokio::test]
    async fn test_missing_blockhash() {
        let mock = Arc::new(MockNetworkClient::new());
        let payer = Pubkey::new_unique();
        let tx = UnsignedTransaction::new(
            vec![system_instruction::transfer(&payer, &Pubkey::new_unique(), 1)],
            payer,
            ApiVersion::V0,
        )
        .unwrap();

        let err = estimator(&mock).estimate(&tx).await.unwrap_err();
        assert_eq!(err, PipelineError::MissingBlockhash);
        assert_eq!(mock.fee_calls(), 0);
    }

    proptest! {
        #[test]
        fn prop_delta_is_sum_of_created_spans(
            spans in proptest::collection::vec(0u64..10_240, 0..6),
            transfers in 1usize..4,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let payer = Pubkey::new_unique();
            let mut instructions: Vec<Instruction> = (0..transfers)
                .map(|_| system_instruction::transfer(&payer, &Pubkey::new_unique(), 1))
                .collect();
            for space in &spans {
                instructions.push(system_instruction::create_account(
                    &payer,
                    &Pubkey::new_unique(),
                    0,
                    *space,
                    &Pubkey::new_unique(),
                ));
            }

            let mock = Arc::new(MockNetworkClient::new());
            let fee = runtime
                .block_on(estimator(&mock).estimate(&unsigned(payer, instructions)))
                .unwrap();

            let expected: u64 = spans.iter().map(|s| rent_floor_for(*s as usize)).sum();
            prop_assert_eq!(fee.rent_exemption_delta, expected);
            prop_assert_eq!(fee.total(), fee.network_fee + expected + rent_floor_for(0));
        }
    }
}
