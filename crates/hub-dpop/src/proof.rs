//! DPoP proof generation (RFC 9449 §4).
//!
//! A proof is a compact JWS `header.payload.signature`, each segment
//! base64url without padding. The header embeds the public JWK; the payload
//! binds the proof to one HTTP method and URL, and optionally to the hash of
//! the access token sent alongside it.

use std::fmt;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdsa::Signature;
use p256::ecdsa::signature::Verifier;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DpopError, Result};
use crate::jwk::PublicJwk;
use crate::vault::KeyVault;

/// `typ` header value for DPoP proofs.
pub const PROOF_TYPE: &str = "dpop+jwt";

/// `alg` header value: ECDSA P-256 with SHA-256.
pub const PROOF_ALGORITHM: &str = "ES256";

/// JOSE header of a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofHeader {
    pub typ: String,
    pub alg: String,
    pub jwk: PublicJwk,
}

/// Claims of a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    /// Unique per proof; lets the server reject replays.
    pub jti: String,
    /// HTTP method, upper-case.
    pub htm: String,
    /// Request URL exactly as sent.
    pub htu: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// base64url(SHA-256(access token)) when the proof accompanies a token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

/// A signed, single-use proof token.
#[derive(Clone, PartialEq, Eq)]
pub struct Proof {
    token: String,
}

impl Proof {
    /// Wrap a received proof token for inspection or verification.
    pub fn parse(token: impl Into<String>) -> Result<Self> {
        let proof = Self {
            token: token.into(),
        };
        proof.segments()?;
        Ok(proof)
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }

    /// Decode the header without checking the signature.
    pub fn header(&self) -> Result<ProofHeader> {
        decode_segment(self.segments()?.0)
    }

    /// Decode the claims without checking the signature.
    pub fn claims(&self) -> Result<ProofClaims> {
        decode_segment(self.segments()?.1)
    }

    /// Check the signature against the embedded JWK and return the claims.
    pub fn verify(&self) -> Result<ProofClaims> {
        let (header_segment, claims_segment, signature_segment) = self.segments()?;
        let header: ProofHeader = decode_segment(header_segment)?;
        if header.typ != PROOF_TYPE || header.alg != PROOF_ALGORITHM {
            return Err(DpopError::Proof(format!(
                "Unexpected proof header (typ {}, alg {})",
                header.typ, header.alg
            )));
        }

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_segment.as_bytes())
            .map_err(|e| DpopError::Proof(format!("Invalid signature encoding: {}", e)))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| DpopError::Proof(format!("Invalid signature: {}", e)))?;

        let signing_input = format!("{}.{}", header_segment, claims_segment);
        header
            .jwk
            .to_verifying_key()?
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| DpopError::Proof("Signature does not match embedded key".to_string()))?;

        decode_segment(claims_segment)
    }

    fn segments(&self) -> Result<(&str, &str, &str)> {
        let mut parts = self.token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(claims), Some(signature), None) => Ok((header, claims, signature)),
            _ => Err(DpopError::Proof(
                "Proof must have exactly three segments".to_string(),
            )),
        }
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proof").field(&self.token).finish()
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|e| DpopError::Proof(format!("Invalid segment encoding: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `ath` claim value for an access token.
pub fn access_token_hash(access_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

/// Builds proofs signed by the vault's key pair.
#[derive(Debug, Clone)]
pub struct ProofGenerator {
    vault: Arc<KeyVault>,
}

impl ProofGenerator {
    pub fn new(vault: Arc<KeyVault>) -> Self {
        Self { vault }
    }

    /// Proof for `method` + `url` with no access-token binding.
    pub fn create_proof(&self, method: &str, url: &str) -> Result<Proof> {
        self.build(method, url, None)
    }

    /// Proof for `method` + `url` carrying the `ath` hash of `access_token`.
    pub fn create_proof_with_credential_hash(
        &self,
        method: &str,
        url: &str,
        access_token: &str,
    ) -> Result<Proof> {
        self.build(method, url, Some(access_token_hash(access_token)))
    }

    fn build(&self, method: &str, url: &str, ath: Option<String>) -> Result<Proof> {
        let key = self.vault.current().ok_or_else(|| {
            DpopError::Proof("Key vault not initialized; call ensure_initialized() first".to_string())
        })?;

        let header = ProofHeader {
            typ: PROOF_TYPE.to_string(),
            alg: PROOF_ALGORITHM.to_string(),
            jwk: key.jwk().clone(),
        };
        let claims = ProofClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            htm: method.to_uppercase(),
            htu: url.to_string(),
            iat: chrono::Utc::now().timestamp(),
            ath,
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = key.sign(signing_input.as_bytes());

        tracing::trace!(htm = %claims.htm, htu = %claims.htu, jti = %claims.jti, "Created DPoP proof");
        Ok(Proof {
            token: format!(
                "{}.{}",
                signing_input,
                URL_SAFE_NO_PAD.encode(signature.to_bytes())
            ),
        })
    }
}
