//! Public-key JWK for the proof header (RFC 7517) and its thumbprint (RFC 7638).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DpopError, Result};

const COORDINATE_LEN: usize = 32;

/// EC public key in JWK form. Carries no private component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

impl PublicJwk {
    pub(crate) fn from_verifying_key(key: &VerifyingKey) -> Self {
        // Uncompressed SEC1: 0x04 || x || y
        let point = key.to_encoded_point(false);
        let bytes = point.as_bytes();
        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: URL_SAFE_NO_PAD.encode(&bytes[1..1 + COORDINATE_LEN]),
            y: URL_SAFE_NO_PAD.encode(&bytes[1 + COORDINATE_LEN..]),
        }
    }

    /// Rebuild the verifying key, e.g. to check a proof's signature.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey> {
        if self.kty != "EC" || self.crv != "P-256" {
            return Err(DpopError::Serialization(format!(
                "Unsupported JWK (kty {}, crv {})",
                self.kty, self.crv
            )));
        }

        let x = decode_coordinate(&self.x)?;
        let y = decode_coordinate(&self.y)?;

        let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|e| DpopError::Serialization(format!("Invalid EC point: {}", e)))
    }

    /// JWK SHA-256 thumbprint, base64url without padding.
    ///
    /// Members are serialized in lexicographic order with no whitespace.
    pub fn thumbprint(&self) -> String {
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
            self.crv, self.kty, self.x, self.y
        );
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }
}

fn decode_coordinate(value: &str) -> Result<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.as_bytes())
        .map_err(|e| DpopError::Serialization(format!("Invalid JWK coordinate: {}", e)))?;
    if bytes.len() != COORDINATE_LEN {
        return Err(DpopError::Serialization(format!(
            "JWK coordinate must be {} bytes, got {}",
            COORDINATE_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}
