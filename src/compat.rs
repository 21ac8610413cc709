//! Era-agnostic helpers over `VersionedMessage`
//!
//! Legacy and v0 messages expose the same information through different
//! structs. Everything in the pipeline that needs a header, the signer set
//! or the bytes to sign goes through here so the era only matters at compile
//! time.

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0::Message as MessageV0, Message, MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

use crate::types::ApiVersion;

/// Compile `instructions` into a message of the requested era.
///
/// V0 messages are compiled without address lookup tables.
pub fn compile_message(
    api_version: ApiVersion,
    fee_payer: &Pubkey,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<VersionedMessage, String> {
    match api_version {
        ApiVersion::Legacy => Ok(VersionedMessage::Legacy(Message::new_with_blockhash(
            instructions,
            Some(fee_payer),
            &recent_blockhash,
        ))),
        ApiVersion::V0 => MessageV0::try_compile(fee_payer, instructions, &[], recent_blockhash)
            .map(VersionedMessage::V0)
            .map_err(|e| format!("v0 compile failed: {}", e)),
    }
}

#[inline]
#[must_use]
pub fn message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Account keys embedded in the message (never lookup-table addresses)
#[inline]
#[must_use]
pub fn static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// Accounts that must sign, in signature-slot order
#[inline]
#[must_use]
pub fn required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let num_signers = message_header(message).num_required_signatures as usize;
    let account_keys = static_account_keys(message);
    &account_keys[..num_signers.min(account_keys.len())]
}

#[inline]
#[must_use]
pub fn message_blockhash(message: &VersionedMessage) -> &Hash {
    message.recent_blockhash()
}
