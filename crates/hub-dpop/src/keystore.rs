//! Durable storage for the vault's signing key.
//!
//! The stored scalar is wrapped in [`StoredKey`], which has no public
//! accessor: only the backends in this module and the vault can read it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{DpopError, Result};

/// Default key file name within the hub data directory.
pub const KEY_FILE: &str = "dpop-key.json";

const KEY_FILE_VERSION: u32 = 1;

/// Persisted private key material.
pub struct StoredKey {
    scalar: Zeroizing<Vec<u8>>,
}

impl StoredKey {
    pub(crate) fn new(scalar: Vec<u8>) -> Self {
        Self {
            scalar: Zeroizing::new(scalar),
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.scalar
    }
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoredKey(<redacted>)")
    }
}

// ============================================================================
// KeyStore Trait
// ============================================================================

/// Storage backend for the vault's key pair.
///
/// Implementations cannot inspect a [`StoredKey`], so the backends shipped in
/// this module are the only useful ones.
#[async_trait]
pub trait KeyStore: Send + Sync + fmt::Debug {
    /// Load the persisted key, or `None` on first run.
    async fn load(&self) -> Result<Option<StoredKey>>;

    /// Persist a newly generated key, replacing any previous one.
    async fn save(&self, key: &StoredKey) -> Result<()>;

    /// Delete the persisted key. Deleting a missing key is not an error.
    async fn delete(&self) -> Result<()>;
}

// ============================================================================
// FileKeyStore
// ============================================================================

#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    crv: String,
    d: String,
}

/// File-based key store for production use.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Store the key as [`KEY_FILE`] inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(KEY_FILE),
        }
    }

    /// Store the key at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load(&self) -> Result<Option<StoredKey>> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| DpopError::Storage(format!("Failed to stat key file: {}", e)))?;
        if !exists {
            return Ok(None);
        }

        let content = Zeroizing::new(
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| DpopError::Storage(format!("Failed to read key file: {}", e)))?,
        );
        let file: KeyFile = serde_json::from_str(&content)
            .map_err(|e| DpopError::Storage(format!("Failed to parse key file: {}", e)))?;
        if file.version != KEY_FILE_VERSION || file.crv != "P-256" {
            return Err(DpopError::Storage(format!(
                "Unsupported key file (version {}, curve {})",
                file.version, file.crv
            )));
        }

        let scalar = URL_SAFE_NO_PAD
            .decode(file.d.as_bytes())
            .map_err(|e| DpopError::Storage(format!("Failed to decode key file: {}", e)))?;
        Ok(Some(StoredKey::new(scalar)))
    }

    async fn save(&self, key: &StoredKey) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DpopError::Storage(format!("Failed to create key directory: {}", e))
            })?;
        }

        let file = KeyFile {
            version: KEY_FILE_VERSION,
            crv: "P-256".to_string(),
            d: URL_SAFE_NO_PAD.encode(key.as_bytes()),
        };
        let json = Zeroizing::new(serde_json::to_string_pretty(&file)?);
        drop(Zeroizing::new(file.d));

        tokio::fs::write(&self.path, json.as_bytes())
            .await
            .map_err(|e| DpopError::Storage(format!("Failed to write key file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    DpopError::Storage(format!("Failed to restrict key file permissions: {}", e))
                })?;
        }

        tracing::debug!(path = %self.path.display(), "Key pair persisted");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DpopError::Storage(format!(
                "Failed to delete key file: {}",
                e
            ))),
        }
    }
}

// ============================================================================
// MemoryKeyStore
// ============================================================================

/// In-memory key store for tests and ephemeral sessions.
///
/// Share one instance between vaults by `Arc` to simulate a restart.
#[derive(Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<Zeroizing<Vec<u8>>>>,
    saves: AtomicU32,
    fail_saves: bool,
}

impl fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("has_key", &!self.is_empty())
            .field("saves", &self.save_count())
            .finish()
    }
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `save` always fails, for exercising storage errors.
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load(&self) -> Result<Option<StoredKey>> {
        Ok(self
            .slot
            .lock()
            .as_ref()
            .map(|scalar| StoredKey::new(scalar.to_vec())))
    }

    async fn save(&self, key: &StoredKey) -> Result<()> {
        if self.fail_saves {
            return Err(DpopError::Storage("storage unavailable".to_string()));
        }
        *self.slot.lock() = Some(Zeroizing::new(key.as_bytes().to_vec()));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}
