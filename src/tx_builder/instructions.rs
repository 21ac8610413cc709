//! Instruction planning for transfer intents
//!
//! Ordering rules:
//! 1. Destination account creation (token transfers to an unregistered wallet)
//! 2. The transfer itself
//!
//! Swap instructions come from the venue already ordered and only go
//! through [`validate_plan`].

use crate::tx_builder::errors::PipelineError;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
// TODO(migrate-system-instruction): move to solana-system-interface once spl-* crates follow
#[allow(deprecated)]
use solana_sdk::system_instruction;
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use tracing::debug;

/// Ordered instructions for one intent
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,

    /// The plan funds a new account owned by the destination
    pub creates_destination_account: bool,
}

impl InstructionPlan {
    pub fn new(instructions: Vec<Instruction>, creates_destination_account: bool) -> Self {
        Self {
            instructions,
            creates_destination_account,
        }
    }
}

/// Native SOL transfer from `owner` to `destination`
pub fn plan_native_transfer(owner: &Pubkey, destination: &Pubkey, amount: u64) -> InstructionPlan {
    InstructionPlan::new(
        vec![system_instruction::transfer(owner, destination, amount)],
        false,
    )
}

/// Parameters of an SPL token transfer between two wallets
#[derive(Debug, Clone, Copy)]
pub struct TokenTransfer<'a> {
    pub owner: &'a Pubkey,
    pub destination_wallet: &'a Pubkey,
    pub mint: &'a Pubkey,
    pub token_program: &'a Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

/// Derive the associated token account of `wallet` for `mint`
pub fn associated_token_account(wallet: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(wallet, mint, token_program)
}

/// SPL token transfer between the owners' associated token accounts.
///
/// When the destination account does not exist yet, an idempotent create
/// instruction funded by `owner` is placed before the transfer.
pub fn plan_token_transfer(
    transfer: TokenTransfer<'_>,
    destination_account_exists: bool,
) -> Result<InstructionPlan, PipelineError> {
    let source = associated_token_account(transfer.owner, transfer.mint, transfer.token_program);
    let destination = associated_token_account(
        transfer.destination_wallet,
        transfer.mint,
        transfer.token_program,
    );

    let mut instructions = Vec::with_capacity(2);

    if !destination_account_exists {
        debug!(
            destination = %destination,
            wallet = %transfer.destination_wallet,
            "Destination token account missing, planning idempotent create"
        );
        instructions.push(create_associated_token_account_idempotent(
            transfer.owner,
            transfer.destination_wallet,
            transfer.mint,
            transfer.token_program,
        ));
    }

    // TransferChecked has the same layout under Token and Token-2022; the
    // builder only accepts the classic program id, so build then retarget.
    let mut transfer_ix = spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &source,
        transfer.mint,
        &destination,
        transfer.owner,
        &[],
        transfer.amount,
        transfer.decimals,
    )
    .map_err(|e| PipelineError::instruction_failed(transfer.token_program.to_string(), e.to_string()))?;
    transfer_ix.program_id = *transfer.token_program;
    instructions.push(transfer_ix);

    Ok(InstructionPlan::new(instructions, !destination_account_exists))
}

/// Structural checks applied to every instruction list before assembly.
///
/// Rejects an empty list, and an associated-account create that comes after
/// an instruction already using the account it creates.
pub fn validate_plan(instructions: &[Instruction]) -> Result<(), PipelineError> {
    if instructions.is_empty() {
        return Err(PipelineError::instruction_failed(
            "none",
            "Instruction list is empty",
        ));
    }

    let ata_program = spl_associated_token_account::id();

    for (position, ix) in instructions.iter().enumerate() {
        if ix.program_id != ata_program {
            continue;
        }
        let Some(created) = ix.accounts.get(1).map(|meta| meta.pubkey) else {
            continue;
        };
        let used_earlier = instructions[..position].iter().any(|earlier| {
            earlier.program_id != ata_program
                && earlier.accounts.iter().any(|meta| meta.pubkey == created)
        });
        if used_earlier {
            return Err(PipelineError::instruction_failed(
                ata_program.to_string(),
                format!("Account {} is created after it is used", created),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer<'a>(owner: &'a Pubkey, dest: &'a Pubkey, mint: &'a Pubkey) -> TokenTransfer<'a> {
        TokenTransfer {
            owner,
            destination_wallet: dest,
            mint,
            token_program: &spl_token::ID,
            amount: 2_500_000,
            decimals: 6,
        }
    }

    #[test]
    fn test_native_transfer_plan() {
        let owner = Pubkey::new_unique();
        let dest = Pubkey::new_unique();
        let plan = plan_native_transfer(&owner, &dest, 1_000);

        assert_eq!(plan.instructions.len(), 1);
        assert!(!plan.creates_destination_account);
        assert_eq!(plan.instructions[0].accounts[0].pubkey, owner);
        assert!(plan.instructions[0].accounts[0].is_signer);
        assert_eq!(plan.instructions[0].accounts[1].pubkey, dest);
    }

    #[test]
    fn test_token_transfer_to_existing_account() {
        let (owner, dest, mint) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let plan = plan_token_transfer(transfer(&owner, &dest, &mint), true).unwrap();

        assert_eq!(plan.instructions.len(), 1);
        assert!(!plan.creates_destination_account);
        assert_eq!(plan.instructions[0].program_id, spl_token::ID);
    }

    #[test]
    fn test_token_transfer_creates_missing_account_first() {
        let (owner, dest, mint) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let plan = plan_token_transfer(transfer(&owner, &dest, &mint), false).unwrap();

        assert_eq!(plan.instructions.len(), 2);
        assert!(plan.creates_destination_account);

        let create = &plan.instructions[0];
        assert_eq!(create.program_id, spl_associated_token_account::id());
        assert_eq!(
            create.accounts[1].pubkey,
            associated_token_account(&dest, &mint, &spl_token::ID)
        );
        assert_eq!(plan.instructions[1].program_id, spl_token::ID);
        validate_plan(&plan.instructions).unwrap();
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(matches!(
            validate_plan(&[]),
            Err(PipelineError::InstructionBuild { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_create_after_use() {
        let (owner, dest, mint) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let mut instructions = plan_token_transfer(transfer(&owner, &dest, &mint), false)
            .unwrap()
            .instructions;
        instructions.reverse();

        assert!(validate_plan(&instructions).is_err());
    }
}
