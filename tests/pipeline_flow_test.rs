//! Public-API walk through a transfer and a swap using the exported doubles
//!
//! Needs the `test_utils` feature.

#[cfg(test)]
mod pipeline_flow_tests {
    use solana_sdk::instruction::{AccountMeta, Instruction};
    use solana_sdk::signature::{Keypair, Signer};
    use std::sync::Arc;
    use txpipe::test_utils::MockNetworkClient;
    use txpipe::types::TransactionStatus;
    use txpipe::{
        ApiVersion, LocalKeyHolder, Pubkey, PipelineConfig, QuoteRequest, SwapIntent,
        TransactionOutcome, TransactionPipeline, TransferAsset, TransferIntent, UserVerdict,
    };

    fn setup() -> (Arc<MockNetworkClient>, TransactionPipeline, Pubkey) {
        let keypair = Keypair::new();
        let owner = keypair.pubkey();
        let mock = Arc::new(MockNetworkClient::new());
        let pipeline = TransactionPipeline::new(
            mock.clone(),
            Arc::new(LocalKeyHolder::from_keypair(keypair)),
            PipelineConfig::default(),
        )
        .unwrap();
        (mock, pipeline, owner)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_to_confirmation() {
        let (mock, pipeline, owner) = setup();
        mock.set_default_status(TransactionStatus::Confirmed);

        let prepared = pipeline
            .prepare_transfer(TransferIntent {
                owner,
                destination: Keypair::new().pubkey(),
                amount: 250_000,
                asset: TransferAsset::Native,
                native_balance: 1_000_000,
                token_balance: None,
                api_version: ApiVersion::Legacy,
            })
            .await
            .unwrap();
        let outcome = pipeline.send_and_confirm(&prepared).await.unwrap();

        assert!(matches!(outcome, TransactionOutcome::Confirmed(_)));
        assert_eq!(outcome.verdict(), UserVerdict::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_then_swap() {
        let (mock, pipeline, owner) = setup();
        let quote = pipeline
            .get_quote(QuoteRequest {
                input_mint: Pubkey::new_unique(),
                output_mint: Pubkey::new_unique(),
                amount: 10_000,
                trader: Some(owner),
                slippage_bps: 100,
            })
            .await
            .unwrap();
        mock.set_swap_instructions(vec![Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3],
            vec![AccountMeta::new(owner, true)],
        )]);

        let prepared = pipeline
            .prepare_swap(SwapIntent {
                quote,
                trader: owner,
                native_balance: 1_000_000,
                api_version: ApiVersion::V0,
            })
            .await
            .unwrap();
        let signature = pipeline.submit(&prepared).await.unwrap();

        assert_eq!(prepared.fee.network_fee, 5_000);
        assert_eq!(mock.submitted_transactions()[0].signatures[0], signature);
    }
}
