//! Key vault: owns the device's ECDSA P-256 signing key pair.
//!
//! The private key lives in a [`VaultKey`] that never leaves this crate. The
//! vault hands out the public JWK and nothing else. Signing is crate-private:
//! proofs and the credential cipher are its only callers, so code outside the
//! crate can never sign the encryption-key challenge.

use std::fmt;
use std::sync::{Arc, OnceLock};

use aes_gcm::Aes256Gcm;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::rand_core::OsRng;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{DpopError, Result};
use crate::jwk::PublicJwk;
use crate::keystore::{KeyStore, MemoryKeyStore, StoredKey};

/// Loaded key pair plus everything derived from it.
///
/// Dropping it drops the derived encryption key too, so clearing the vault
/// invalidates the cipher cache without any extra bookkeeping.
pub(crate) struct VaultKey {
    signing: SigningKey,
    jwk: PublicJwk,
    derived: OnceLock<Aes256Gcm>,
}

impl VaultKey {
    fn new(signing: SigningKey) -> Self {
        let jwk = PublicJwk::from_verifying_key(&VerifyingKey::from(&signing));
        Self {
            signing,
            jwk,
            derived: OnceLock::new(),
        }
    }

    pub(crate) fn jwk(&self) -> &PublicJwk {
        &self.jwk
    }

    /// ECDSA P-256 / SHA-256. RFC 6979 nonces make this deterministic.
    pub(crate) fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// The cached encryption key, deriving it with `derive` on first use.
    pub(crate) fn derived_key<F>(&self, derive: F) -> Result<&Aes256Gcm>
    where
        F: FnOnce(&VaultKey) -> Result<Aes256Gcm>,
    {
        if let Some(key) = self.derived.get() {
            return Ok(key);
        }
        let key = derive(self)?;
        Ok(self.derived.get_or_init(|| key))
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKey")
            .field("jwk", &self.jwk)
            .field("derived", &self.derived.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Owner of the single signing key pair for this device.
pub struct KeyVault {
    store: Arc<dyn KeyStore>,
    current: RwLock<Option<Arc<VaultKey>>>,
    // Held across load/generate so concurrent callers share one initialization.
    init_gate: tokio::sync::Mutex<()>,
}

impl KeyVault {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            init_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// A vault backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyStore::new()))
    }

    /// Load the persisted key pair, or generate and persist a new one.
    ///
    /// Idempotent. Concurrent callers wait for the same initialization and
    /// receive the same public key. Only a storage failure while persisting a
    /// freshly generated key is an error.
    pub async fn ensure_initialized(&self) -> Result<PublicJwk> {
        if let Some(key) = self.current() {
            return Ok(key.jwk().clone());
        }

        let _gate = self.init_gate.lock().await;
        if let Some(key) = self.current() {
            return Ok(key.jwk().clone());
        }

        let key = match self.load_persisted().await {
            Some(key) => {
                info!(thumbprint = %key.jwk().thumbprint(), "Loaded persisted DPoP key pair");
                key
            }
            None => self.generate().await?,
        };

        let jwk = key.jwk().clone();
        *self.current.write() = Some(Arc::new(key));
        Ok(jwk)
    }

    pub fn is_initialized(&self) -> bool {
        self.current.read().is_some()
    }

    /// The public half of the key pair, once initialized.
    pub fn public_jwk(&self) -> Option<PublicJwk> {
        self.current().map(|key| key.jwk().clone())
    }

    /// Forget the key pair and delete its persisted copy. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.init_gate.lock().await;
        self.current.write().take();
        self.store.delete().await?;
        info!("DPoP key pair cleared");
        Ok(())
    }

    pub(crate) fn current(&self) -> Option<Arc<VaultKey>> {
        self.current.read().clone()
    }

    async fn load_persisted(&self) -> Option<VaultKey> {
        match self.store.load().await {
            Ok(Some(stored)) => match SigningKey::from_slice(stored.as_bytes()) {
                Ok(signing) => Some(VaultKey::new(signing)),
                Err(e) => {
                    warn!(error = %e, "Persisted key pair is unusable, generating a new one");
                    None
                }
            },
            Ok(None) => {
                debug!("No persisted key pair");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load persisted key pair, generating a new one");
                None
            }
        }
    }

    async fn generate(&self) -> Result<VaultKey> {
        let signing = SigningKey::random(&mut OsRng);
        let stored = StoredKey::new(signing.to_bytes().to_vec());
        self.store
            .save(&stored)
            .await
            .map_err(|e| DpopError::Vault(format!("Failed to persist new key pair: {}", e)))?;

        let key = VaultKey::new(signing);
        info!(thumbprint = %key.jwk().thumbprint(), "Generated new DPoP key pair");
        Ok(key)
    }
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("store", &self.store)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
