//! Key holder abstraction and the local keypair implementation
//!
//! The pipeline never touches private keys directly: it asks a [`KeyHolder`]
//! which accounts it can sign for and hands it serialized message bytes.
//! Hardware wallets and remote signers slot in behind the same trait.

use anyhow::Context;
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::Zeroize;

/// Errors raised by a [`KeyHolder`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyHolderError {
    /// The holder does not control this account
    #[error("No key available for account {0}")]
    UnknownAccount(Pubkey),

    #[error("Signing rejected: {0}")]
    Rejected(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// An entity able to produce signatures for a set of accounts
#[async_trait]
pub trait KeyHolder: Send + Sync + std::fmt::Debug {
    /// Accounts this holder can sign for
    fn accounts(&self) -> Vec<Pubkey>;

    /// Sign `message` once for each account in `for_accounts`, in order
    async fn sign(
        &self,
        message: &[u8],
        for_accounts: &[Pubkey],
    ) -> Result<Vec<Signature>, KeyHolderError>;
}

/// Key holder backed by in-memory keypairs
#[derive(Clone)]
pub struct LocalKeyHolder {
    // Signing is serialized so a single holder never signs two messages at once
    keys: Arc<Mutex<HashMap<Pubkey, Keypair>>>,
    accounts: Vec<Pubkey>,
}

impl std::fmt::Debug for LocalKeyHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyHolder")
            .field("accounts", &self.accounts)
            .finish()
    }
}

impl LocalKeyHolder {
    pub fn from_keypairs(keypairs: impl IntoIterator<Item = Keypair>) -> Self {
        let mut keys = HashMap::new();
        let mut accounts = Vec::new();
        for keypair in keypairs {
            let pubkey = keypair.pubkey();
            if keys.insert(pubkey, keypair).is_none() {
                accounts.push(pubkey);
            }
        }
        Self {
            keys: Arc::new(Mutex::new(keys)),
            accounts,
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self::from_keypairs([keypair])
    }

    /// Load a keypair file, either 64 raw bytes or the JSON byte-array format
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut file_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path.display()))?;

        let result = if file_bytes.len() == 64 {
            keypair_from_bytes(&file_bytes).context("Invalid keypair bytes")
        } else {
            match serde_json::from_slice::<Vec<u8>>(&file_bytes) {
                Ok(mut json) => {
                    let keypair = keypair_from_bytes(&json).context("Invalid keypair from JSON");
                    json.zeroize();
                    keypair
                }
                Err(e) => Err(anyhow::Error::new(e).context("Failed to parse keypair JSON")),
            }
        };
        file_bytes.zeroize();

        let keypair = result?;
        debug!(account = %keypair.pubkey(), "Loaded keypair from file");
        Ok(Self::from_keypair(keypair))
    }

    /// Decode a base58-encoded 64-byte secret key
    pub fn from_base58(encoded: &str) -> Result<Self, KeyHolderError> {
        let mut bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| KeyHolderError::InvalidKey(format!("invalid base58: {}", e)))?;
        let result = keypair_from_bytes(&bytes);
        bytes.zeroize();
        result.map(Self::from_keypair)
    }
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, KeyHolderError> {
    if bytes.len() != 64 {
        return Err(KeyHolderError::InvalidKey(format!(
            "expected 64 bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(KeyHolderError::InvalidKey(
            "all-zero key rejected".to_string(),
        ));
    }
    Keypair::try_from(bytes).map_err(|e| KeyHolderError::InvalidKey(e.to_string()))
}

#[async_trait]
impl KeyHolder for LocalKeyHolder {
    fn accounts(&self) -> Vec<Pubkey> {
        self.accounts.clone()
    }

    async fn sign(
        &self,
        message: &[u8],
        for_accounts: &[Pubkey],
    ) -> Result<Vec<Signature>, KeyHolderError> {
        let keys = self.keys.lock().await;
        for_accounts
            .iter()
            .map(|account| {
                keys.get(account)
                    .map(|keypair| keypair.sign_message(message))
                    .ok_or(KeyHolderError::UnknownAccount(*account))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_sign_for_known_accounts() {
        let a = Keypair::new();
        let b = Keypair::new();
        let (pa, pb) = (a.pubkey(), b.pubkey());
        let holder = LocalKeyHolder::from_keypairs([a, b]);

        assert_eq!(holder.accounts(), vec![pa, pb]);

        let sigs = holder.sign(b"hello", &[pb, pa]).await.unwrap();
        assert_eq!(sigs.len(), 2);
        assert!(sigs[0].verify(pb.as_ref(), b"hello"));
        assert!(sigs[1].verify(pa.as_ref(), b"hello"));
    }

    #[tokio::test]
    async fn test_sign_for_unknown_account_fails() {
        let holder = LocalKeyHolder::from_keypair(Keypair::new());
        let stranger = Pubkey::new_unique();
        let err = holder.sign(b"msg", &[stranger]).await.unwrap_err();
        assert_eq!(err, KeyHolderError::UnknownAccount(stranger));
    }

    #[test]
    fn test_from_file_json_format() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let holder = LocalKeyHolder::from_file(file.path()).unwrap();
        assert_eq!(holder.accounts(), vec![keypair.pubkey()]);
    }

    #[test]
    fn test_from_file_rejects_zero_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();

        let err = LocalKeyHolder::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeyHolderError>(),
            Some(KeyHolderError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_from_base58() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let holder = LocalKeyHolder::from_base58(&encoded).unwrap();
        assert_eq!(holder.accounts(), vec![keypair.pubkey()]);

        assert!(LocalKeyHolder::from_base58("not-base58-0OIl").is_err());
    }
}
