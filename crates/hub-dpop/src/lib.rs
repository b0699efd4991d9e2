//! Proof-of-possession (RFC 9449 "DPoP") primitives for the Hub client.
//!
//! All key material and every plaintext access token stay inside this crate.
//! Callers get public keys, signed proofs and ciphertext; nothing here hands
//! back a private key or a decrypted credential.
//!
//! # Components
//!
//! - [`vault`]: the device's ECDSA P-256 key pair, persisted through a [`KeyStore`]
//! - [`proof`]: `dpop+jwt` proof tokens bound to method, URL and optionally a credential
//! - [`cipher`]: AES-256-GCM credential encryption keyed by a signature over a fixed challenge,
//!   plus the decrypt-and-send path for credential-bearing requests
//! - [`keystore`]: durable storage backends for the signing key

pub mod cipher;
pub mod error;
pub mod jwk;
pub mod keystore;
pub mod proof;
pub mod vault;

use std::sync::Arc;

pub use cipher::{CredentialCipher, CredentialStatus, EncryptedCredential, HeaderScheme};
pub use error::{DpopError, Result};
pub use jwk::PublicJwk;
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use proof::{Proof, ProofClaims, ProofGenerator, ProofHeader};
pub use vault::KeyVault;

/// The vault, proof generator and cipher wired to one key pair.
///
/// Construct exactly one per device session at the composition root and share
/// it by `Arc`.
#[derive(Debug, Clone)]
pub struct DpopClient {
    vault: Arc<KeyVault>,
    proofs: ProofGenerator,
    cipher: CredentialCipher,
}

impl DpopClient {
    /// Create a client whose key pair is persisted in `store`.
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        let vault = Arc::new(KeyVault::new(store));
        let proofs = ProofGenerator::new(vault.clone());
        let cipher = CredentialCipher::new(vault.clone(), proofs.clone());
        Self {
            vault,
            proofs,
            cipher,
        }
    }

    /// Create a client with a throwaway in-memory key store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyStore::new()))
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    pub fn proofs(&self) -> &ProofGenerator {
        &self.proofs
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    /// Whether the vault holds a usable key pair.
    pub fn is_ready(&self) -> bool {
        self.vault.is_initialized()
    }

    /// Drop the key pair, its derived encryption key and the persisted copy.
    ///
    /// Every credential encrypted before this call becomes undecryptable.
    pub async fn clear(&self) -> Result<()> {
        self.vault.clear().await
    }
}
