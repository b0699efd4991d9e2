//! Credential encryption at rest and the credential-bearing send path.
//!
//! The AES-256-GCM key is the first 32 bytes of an ECDSA signature over a
//! fixed challenge string. P-256 signing here is RFC 6979
//! deterministic, so the same key pair always yields the same encryption key,
//! and a new key pair makes every older ciphertext undecryptable.
//!
//! Decryption is private to this module. Everything that needs the plaintext
//! (expiry inspection, the `ath` claim, the `Authorization` header) runs
//! inside a single call here, and the plaintext is zeroized on drop.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{DpopError, Result};
use crate::proof::ProofGenerator;
use crate::vault::{KeyVault, VaultKey};

// Signed to derive the encryption key. Bump the version to rotate. Must stay
// private along with `VaultKey::sign`, or the derived key becomes computable
// outside this crate.
const TOKEN_ENCRYPTION_CHALLENGE: &str = "hub-token-encryption-key-v1";

/// AES-GCM IV length in bytes.
pub const IV_LEN: usize = 12;

const KEY_LEN: usize = 32;

/// An access token encrypted under the vault-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredential {
    /// base64url ciphertext including the GCM tag.
    pub ciphertext: String,
    /// base64url 12-byte IV.
    pub iv: String,
}

/// Result of inspecting a stored credential's `exp` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// Valid for longer than the buffer.
    Fresh { expires_in_secs: i64 },
    /// Expired, inside the buffer, or without a readable `exp`.
    Expiring,
}

/// Header names and scheme used when attaching a proof and a credential.
#[derive(Debug, Clone)]
pub struct HeaderScheme {
    pub proof_header: HeaderName,
    pub authorization_scheme: String,
}

impl Default for HeaderScheme {
    fn default() -> Self {
        Self {
            proof_header: HeaderName::from_static("dpop"),
            authorization_scheme: "DPoP".to_string(),
        }
    }
}

impl HeaderScheme {
    /// Attach a proof header to `request`.
    pub fn attach_proof(&self, request: &mut reqwest::Request, proof: &str) -> Result<()> {
        let value = HeaderValue::from_str(proof)
            .map_err(|e| DpopError::Proof(format!("Proof is not a valid header value: {}", e)))?;
        request.headers_mut().insert(self.proof_header.clone(), value);
        Ok(())
    }
}

/// Encrypts credentials and spends them on outbound requests.
#[derive(Clone)]
pub struct CredentialCipher {
    vault: Arc<KeyVault>,
    proofs: ProofGenerator,
}

impl CredentialCipher {
    pub fn new(vault: Arc<KeyVault>, proofs: ProofGenerator) -> Self {
        Self { vault, proofs }
    }

    /// Encrypt an access token with a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedCredential> {
        let key = self.vault.current().ok_or_else(DpopError::not_initialized)?;
        let cipher = key.derived_key(derive_key)?;

        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| DpopError::Cipher("Encryption failed".to_string()))?;

        Ok(EncryptedCredential {
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
            iv: URL_SAFE_NO_PAD.encode(iv),
        })
    }

    /// Decide whether the stored credential should be rotated before use.
    ///
    /// Fails with [`DpopError::Cipher`] if the credential cannot be decrypted;
    /// treat that as "credential unusable".
    pub fn credential_status(
        &self,
        encrypted: &EncryptedCredential,
        buffer_secs: i64,
    ) -> Result<CredentialStatus> {
        let token = self.decrypt(encrypted)?;
        let Some(exp) = expiry_claim(&token) else {
            return Ok(CredentialStatus::Expiring);
        };

        let remaining = exp.saturating_sub(chrono::Utc::now().timestamp());
        tracing::debug!(remaining_secs = remaining, buffer_secs, "Checked credential expiry");
        if remaining < buffer_secs {
            Ok(CredentialStatus::Expiring)
        } else {
            Ok(CredentialStatus::Fresh {
                expires_in_secs: remaining,
            })
        }
    }

    /// Send `request` with the decrypted credential and a credential-bound proof.
    ///
    /// The proof's `htm`/`htu` are taken from the request itself, so they match
    /// what goes over the wire.
    pub async fn send_authorized(
        &self,
        http: &reqwest::Client,
        mut request: reqwest::Request,
        encrypted: &EncryptedCredential,
        scheme: &HeaderScheme,
    ) -> Result<reqwest::Response> {
        {
            let token = self.decrypt(encrypted)?;
            let proof = self.proofs.create_proof_with_credential_hash(
                request.method().as_str(),
                request.url().as_str(),
                &token,
            )?;

            let header = Zeroizing::new(format!("{} {}", scheme.authorization_scheme, *token));
            let mut authorization = HeaderValue::from_str(&header)
                .map_err(|_| DpopError::Cipher("Credential is not a valid header value".to_string()))?;
            authorization.set_sensitive(true);

            request.headers_mut().insert(AUTHORIZATION, authorization);
            scheme.attach_proof(&mut request, proof.as_str())?;
        }

        Ok(http.execute(request).await?)
    }

    fn decrypt(&self, encrypted: &EncryptedCredential) -> Result<Zeroizing<String>> {
        let key = self.vault.current().ok_or_else(DpopError::not_initialized)?;
        let cipher = key.derived_key(derive_key)?;

        let iv = URL_SAFE_NO_PAD
            .decode(encrypted.iv.as_bytes())
            .map_err(|_| DpopError::Cipher("IV is not valid base64url".to_string()))?;
        if iv.len() != IV_LEN {
            return Err(DpopError::Cipher(format!(
                "IV must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(encrypted.ciphertext.as_bytes())
            .map_err(|_| DpopError::Cipher("Ciphertext is not valid base64url".to_string()))?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
                .map_err(|_| {
                    DpopError::Cipher("Authentication failed; wrong key or tampered data".to_string())
                })?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| DpopError::Cipher("Decrypted credential is not UTF-8".to_string()))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("vault", &self.vault)
            .finish_non_exhaustive()
    }
}

fn derive_key(key: &VaultKey) -> Result<Aes256Gcm> {
    let signature = key.sign(TOKEN_ENCRYPTION_CHALLENGE.as_bytes());
    let material = Zeroizing::new(signature.to_bytes().to_vec());
    Aes256Gcm::new_from_slice(&material[..KEY_LEN])
        .map_err(|_| DpopError::Cipher("Failed to import derived key".to_string()))
}

/// `exp` of a three-segment JWT, if present and numeric.
fn expiry_claim(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}
