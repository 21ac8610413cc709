//! Unsigned/signed transaction types and the signer/serializer
//!
//! An [`UnsignedTransaction`] collects signatures until every required
//! signer (the fee payer plus every `is_signer` account of every
//! instruction) has signed. Only then can it become a [`SignedTransaction`]
//! or be serialized to the wire format.

use base64::Engine;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::compat;
use crate::tx_builder::errors::PipelineError;
use crate::types::ApiVersion;
use crate::wallet::KeyHolder;

/// A transaction still collecting its blockhash and signatures
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    instructions: Vec<Instruction>,
    fee_payer: Pubkey,
    recent_blockhash: Option<Hash>,
    api_version: ApiVersion,
    signatures: HashMap<Pubkey, Signature>,
}

impl UnsignedTransaction {
    pub fn new(
        instructions: Vec<Instruction>,
        fee_payer: Pubkey,
        api_version: ApiVersion,
    ) -> Result<Self, PipelineError> {
        if instructions.is_empty() {
            return Err(PipelineError::instruction_failed(
                "none",
                "Transaction needs at least one instruction",
            ));
        }
        Ok(Self {
            instructions,
            fee_payer,
            recent_blockhash: None,
            api_version,
            signatures: HashMap::new(),
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    pub fn recent_blockhash(&self) -> Option<&Hash> {
        self.recent_blockhash.as_ref()
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    /// Fill (or replace) the blockhash. Attached signatures covered the old
    /// message and are dropped.
    pub fn set_blockhash(&mut self, blockhash: Hash) {
        if self.recent_blockhash != Some(blockhash) && !self.signatures.is_empty() {
            debug!(
                dropped = self.signatures.len(),
                blockhash = %blockhash,
                "Blockhash replaced, clearing signatures"
            );
            self.signatures.clear();
        }
        self.recent_blockhash = Some(blockhash);
    }

    /// Fee payer first, then every instruction signer in order of appearance
    pub fn required_signers(&self) -> Vec<Pubkey> {
        let mut signers = vec![self.fee_payer];
        for meta in self.instructions.iter().flat_map(|ix| ix.accounts.iter()) {
            if meta.is_signer && !signers.contains(&meta.pubkey) {
                signers.push(meta.pubkey);
            }
        }
        signers
    }

    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.required_signers()
            .into_iter()
            .filter(|signer| !self.signatures.contains_key(signer))
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.recent_blockhash.is_some() && self.missing_signers().is_empty()
    }

    pub fn signature_for(&self, account: &Pubkey) -> Option<&Signature> {
        self.signatures.get(account)
    }

    /// Compile the message for this transaction's era
    pub fn compile_message(&self) -> Result<VersionedMessage, PipelineError> {
        let blockhash = self.recent_blockhash.ok_or(PipelineError::MissingBlockhash)?;
        compat::compile_message(self.api_version, &self.fee_payer, &self.instructions, blockhash)
            .map_err(|reason| PipelineError::instruction_failed("message", reason))
    }

    /// Attach a signature produced elsewhere for one required signer.
    ///
    /// The signature covers the current blockhash only. A blockhash refresh
    /// clears it, so a transaction carrying one cannot be re-signed by the
    /// submission retrier after expiry: the retry fails with `MissingSigner`
    /// unless the key holder also holds that account.
    pub fn attach_signature(
        &mut self,
        account: Pubkey,
        signature: Signature,
    ) -> Result<(), PipelineError> {
        if !self.required_signers().contains(&account) {
            return Err(PipelineError::Signing(format!(
                "{} is not a required signer",
                account
            )));
        }
        self.signatures.insert(account, signature);
        Ok(())
    }

    /// Sign for every required signer `key_holder` holds, leaving the rest unsigned
    pub async fn sign_partial(&mut self, key_holder: &dyn KeyHolder) -> Result<usize, PipelineError> {
        let held = key_holder.accounts();
        let accounts: Vec<Pubkey> = self
            .missing_signers()
            .into_iter()
            .filter(|signer| held.contains(signer))
            .collect();
        self.sign_accounts(key_holder, &accounts).await?;
        Ok(accounts.len())
    }

    async fn sign_accounts(
        &mut self,
        key_holder: &dyn KeyHolder,
        accounts: &[Pubkey],
    ) -> Result<(), PipelineError> {
        if accounts.is_empty() {
            return Ok(());
        }

        let message = self.compile_message()?;
        let signatures = key_holder.sign(&message.serialize(), accounts).await?;
        if signatures.len() != accounts.len() {
            return Err(PipelineError::Signing(format!(
                "key holder returned {} signatures for {} accounts",
                signatures.len(),
                accounts.len()
            )));
        }

        for (account, signature) in accounts.iter().zip(signatures) {
            trace!(account = %account, "Attached signature");
            self.signatures.insert(*account, signature);
        }
        Ok(())
    }

    /// Assemble the wire transaction with signatures in message slot order
    fn to_versioned(&self) -> Result<VersionedTransaction, PipelineError> {
        if self.recent_blockhash.is_none() {
            return Err(PipelineError::MissingBlockhash);
        }
        let message = self.compile_message()?;

        let signatures = compat::required_signers(&message)
            .iter()
            .map(|signer| {
                self.signatures
                    .get(signer)
                    .copied()
                    .ok_or(PipelineError::MissingSigner { account: *signer })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VersionedTransaction { signatures, message })
    }
}

/// A transaction with a blockhash and a complete signature set
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    transaction: VersionedTransaction,
}

impl SignedTransaction {
    /// The fee payer's signature, which is also the transaction id
    pub fn signature(&self) -> Signature {
        self.transaction
            .signatures
            .first()
            .copied()
            .unwrap_or_default()
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(bincode::serialize(&self.transaction)?)
    }

    /// Base64 of the wire bytes, the encoding `sendTransaction` expects
    pub fn to_base64(&self) -> Result<String, PipelineError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_bytes()?))
    }
}

impl TryFrom<&UnsignedTransaction> for SignedTransaction {
    type Error = PipelineError;

    fn try_from(tx: &UnsignedTransaction) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction: tx.to_versioned()?,
        })
    }
}

/// Sign every required signer through `key_holder`.
///
/// Fails with `MissingSigner` naming the first required account the holder
/// cannot sign for; nothing is sent to the holder in that case.
pub async fn sign_transaction(
    tx: &UnsignedTransaction,
    key_holder: &dyn KeyHolder,
) -> Result<SignedTransaction, PipelineError> {
    let held = key_holder.accounts();
    let missing = tx.missing_signers();

    if let Some(account) = missing.iter().find(|signer| !held.contains(signer)) {
        return Err(PipelineError::MissingSigner { account: *account });
    }

    let mut tx = tx.clone();
    tx.sign_accounts(key_holder, &missing).await?;
    SignedTransaction::try_from(&tx)
}

/// Wire bytes of a fully signed transaction
pub fn serialize_transaction(tx: &UnsignedTransaction) -> Result<Vec<u8>, PipelineError> {
    let versioned = tx.to_versioned()?;
    Ok(bincode::serialize(&versioned)?)
}
