//! Transfer intents end to end: validation, planning, fee accounting

use solana_sdk::pubkey::Pubkey;
#[allow(deprecated)]
use solana_sdk::system_program;

use super::test_helpers::{wallet, Harness, ONE_SOL};
use crate::fees::TOKEN_ACCOUNT_SPAN;
use crate::test_utils::{rent_floor_for, LAMPORTS_PER_SIGNATURE};
use crate::tx_builder::{associated_token_account, PipelineError};
use crate::types::TransferAsset;

#[tokio::test]
async fn test_simple_native_transfer() {
    let h = Harness::new();
    let destination = wallet();

    let prepared = h
        .pipeline
        .prepare_transfer(h.native_transfer(destination, ONE_SOL / 10))
        .await
        .unwrap();

    assert_eq!(prepared.fee.network_fee, LAMPORTS_PER_SIGNATURE);
    assert_eq!(prepared.fee.rent_exemption_delta, 0);
    assert_eq!(prepared.fee.account_rent_floor, rent_floor_for(0));
    assert_eq!(prepared.transaction.instructions().len(), 1);
    assert_eq!(prepared.transaction.instructions()[0].program_id, system_program::id());
    assert_eq!(prepared.fee_payer(), &h.owner);
    assert!(prepared.quote.is_none());

    let signature = h.pipeline.submit(&prepared).await.unwrap();
    assert_eq!(h.mock.submit_calls(), 1);
    assert_eq!(h.mock.submitted_transactions()[0].signatures[0], signature);
}

#[tokio::test]
async fn test_token_transfer_to_unregistered_wallet_funds_account() {
    let h = Harness::new();
    let destination = wallet();
    let mint = Pubkey::new_unique();

    let prepared = h
        .pipeline
        .prepare_transfer(h.token_transfer(destination, mint, 1_000_000))
        .await
        .unwrap();

    assert_eq!(prepared.fee.rent_exemption_delta, rent_floor_for(TOKEN_ACCOUNT_SPAN));
    assert_eq!(prepared.fee.rent_exemption_delta, 2_039_280);
    assert_eq!(prepared.fee.network_fee, LAMPORTS_PER_SIGNATURE);

    let instructions = prepared.transaction.instructions();
    assert_eq!(instructions.len(), 2);
    assert_eq!(instructions[0].program_id, spl_associated_token_account::id());
    assert_eq!(
        instructions[0].accounts[1].pubkey,
        associated_token_account(&destination, &mint, &spl_token::id())
    );
    assert_eq!(instructions[1].program_id, spl_token::id());
}

#[tokio::test]
async fn test_token_transfer_to_registered_wallet_adds_no_rent() {
    let h = Harness::new();
    let destination = wallet();
    let mint = Pubkey::new_unique();
    h.mock
        .add_existing_account(associated_token_account(&destination, &mint, &spl_token::id()));

    let prepared = h
        .pipeline
        .prepare_transfer(h.token_transfer(destination, mint, 1_000_000))
        .await
        .unwrap();

    assert_eq!(prepared.fee.rent_exemption_delta, 0);
    assert_eq!(prepared.transaction.instructions().len(), 1);
}

#[tokio::test]
async fn test_rent_floor_is_cached_across_transfers() {
    let h = Harness::new();
    let mint = Pubkey::new_unique();

    for _ in 0..3 {
        h.pipeline
            .prepare_transfer(h.token_transfer(wallet(), mint, 10))
            .await
            .unwrap();
    }

    // One fetch for the token-account span, one for the zero-span floor
    assert_eq!(h.mock.rent_calls(), 2);
    assert_eq!(h.pipeline.fee_cache().len(), 2);
}

#[tokio::test]
async fn test_token_rent_counts_against_native_balance() {
    let h = Harness::new();
    let mut intent = h.token_transfer(wallet(), Pubkey::new_unique(), 1_000);
    intent.native_balance = 1_000_000;

    let err = h.pipeline.prepare_transfer(intent).await.unwrap_err();

    assert_eq!(
        err,
        PipelineError::InsufficientFunds {
            required: 2_039_280 + LAMPORTS_PER_SIGNATURE,
            available: 1_000_000
        }
    );
}

#[tokio::test]
async fn test_validation_errors_make_no_network_calls() {
    let h = Harness::new();
    let mint = Pubkey::new_unique();

    let zero = h.native_transfer(wallet(), 0);
    let self_transfer = h.native_transfer(h.owner, 1);
    let to_system = h.native_transfer(Pubkey::default(), 1);
    let overdrawn = h.native_transfer(wallet(), 11 * ONE_SOL);
    let off_curve = h.token_transfer(
        associated_token_account(&wallet(), &mint, &spl_token::id()),
        mint,
        1,
    );
    let to_mint = h.token_transfer(mint, mint, 1);
    let mut token_overdrawn = h.token_transfer(wallet(), mint, 1_000);
    token_overdrawn.token_balance = Some(999);

    let cases = [
        (zero, "validation"),
        (self_transfer, "validation"),
        (to_system, "validation"),
        (overdrawn, "validation"),
        (off_curve, "validation"),
        (to_mint, "validation"),
        (token_overdrawn, "validation"),
    ];

    for (intent, category) in cases {
        let err = h.pipeline.prepare_transfer(intent).await.unwrap_err();
        assert_eq!(err.category(), category, "{err}");
    }
    assert_eq!(h.mock.total_calls(), 0);
}

#[tokio::test]
async fn test_self_transfer_error_kind() {
    let h = Harness::new();
    let err = h
        .pipeline
        .prepare_transfer(h.native_transfer(h.owner, 5))
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::SelfTransfer);
}

#[tokio::test]
async fn test_token2022_transfer_targets_its_program() {
    let h = Harness::new();
    let destination = wallet();
    let mint = Pubkey::new_unique();
    let mut intent = h.token_transfer(destination, mint, 500);
    intent.asset = TransferAsset::Token {
        mint,
        decimals: 9,
        token_program: spl_token_2022_id(),
    };

    let prepared = h.pipeline.prepare_transfer(intent).await.unwrap();

    let transfer = prepared.transaction.instructions().last().unwrap();
    assert_eq!(transfer.program_id, spl_token_2022_id());
    assert_eq!(
        transfer.accounts[2].pubkey,
        associated_token_account(&destination, &mint, &spl_token_2022_id())
    );
}

fn spl_token_2022_id() -> Pubkey {
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PEnBqCXEpPxuEb")
}
