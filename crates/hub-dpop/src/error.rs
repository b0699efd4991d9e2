//! Error types for key management, proofs and credential encryption.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, DpopError>;

/// Errors that can occur in the DPoP layer.
#[derive(Debug, thiserror::Error)]
pub enum DpopError {
    /// Key material unavailable or the signing primitive failed.
    #[error("Key vault error: {0}")]
    Vault(String),

    /// Durable key storage failed.
    #[error("Key storage error: {0}")]
    Storage(String),

    /// A proof was requested before the vault was ready.
    #[error("Proof error: {0}")]
    Proof(String),

    /// A credential could not be encrypted or decrypted.
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// A credential-bearing request failed before any response arrived.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DpopError {
    /// The stored credential is unusable and must be discarded, not retried.
    pub fn is_cipher(&self) -> bool {
        matches!(self, DpopError::Cipher(_))
    }

    /// The vault has no key pair loaded.
    pub(crate) fn not_initialized() -> Self {
        DpopError::Vault("key pair not initialized; call ensure_initialized() first".to_string())
    }
}

impl From<serde_json::Error> for DpopError {
    fn from(e: serde_json::Error) -> Self {
        DpopError::Serialization(e.to_string())
    }
}
