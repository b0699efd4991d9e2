//! Process-wide authentication state.
//!
//! Holds the encrypted access token and the signed-in user. Only this crate
//! can write it: the rotation coordinator replaces the token, and the client's
//! login/logout transitions set or clear the whole thing.

use std::path::Path;
use std::sync::Arc;

use hub_dpop::EncryptedCredential;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::types::User;

/// Everything needed to resume a session after a restart.
///
/// Holds ciphertext only; it is useless without the key file that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub credential: Option<EncryptedCredential>,
}

impl AuthSnapshot {
    /// Read a snapshot; a missing file is an empty session.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| ClientError::Storage(format!("Failed to parse session file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ClientError::Storage(format!(
                "Failed to read session file: {}",
                e
            ))),
        }
    }

    /// Write the snapshot, or remove the file when the session is empty.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if self.user.is_none() && self.credential.is_none() {
            return match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(ClientError::Storage(
                    format!("Failed to remove session file: {}", e),
                )),
                _ => Ok(()),
            };
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::Storage(format!("Failed to create session directory: {}", e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ClientError::Storage(format!("Failed to serialize session: {}", e)))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ClientError::Storage(format!("Failed to write session file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    ClientError::Storage(format!("Failed to restrict session permissions: {}", e))
                })?;
        }
        Ok(())
    }
}

/// Shared cell holding the current [`AuthSnapshot`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    inner: Arc<RwLock<AuthSnapshot>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.read().clone()
    }

    pub fn credential(&self) -> Option<EncryptedCredential> {
        self.inner.read().credential.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read().user.clone()
    }

    pub fn has_credential(&self) -> bool {
        self.inner.read().credential.is_some()
    }

    /// The session marker: a user profile means the user should be signed in.
    pub fn is_logged_in(&self) -> bool {
        self.inner.read().user.is_some()
    }

    pub(crate) fn set_credential(&self, credential: EncryptedCredential) {
        self.inner.write().credential = Some(credential);
        debug!("Stored new encrypted credential");
    }

    pub(crate) fn clear_credential(&self) {
        self.inner.write().credential = None;
    }

    pub(crate) fn set_user(&self, user: User) {
        self.inner.write().user = Some(user);
    }

    pub(crate) fn clear_user(&self) {
        self.inner.write().user = None;
    }

    /// Drop the token and the session marker together.
    pub(crate) fn clear(&self) {
        *self.inner.write() = AuthSnapshot::default();
        debug!("Auth state cleared");
    }

    pub(crate) fn restore(&self, snapshot: AuthSnapshot) {
        *self.inner.write() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credential() -> EncryptedCredential {
        EncryptedCredential {
            ciphertext: "Y2lwaGVy".to_string(),
            iv: "aXY".to_string(),
        }
    }

    fn user() -> User {
        User {
            username: "kim".to_string(),
            nickname: Some("K".to_string()),
            email: None,
            social: None,
        }
    }

    #[test]
    fn test_clones_share_state() {
        let state = AuthState::new();
        let other = state.clone();

        state.set_credential(credential());
        state.set_user(user());
        assert!(other.has_credential());
        assert!(other.is_logged_in());

        other.clear();
        assert!(!state.has_credential());
        assert!(!state.is_logged_in());
    }

    #[test]
    fn test_clear_credential_keeps_user() {
        let state = AuthState::new();
        state.set_credential(credential());
        state.set_user(user());

        state.clear_credential();
        assert!(!state.has_credential());
        assert_eq!(state.user(), Some(user()));
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("session.json");

        assert_eq!(AuthSnapshot::load(&path).await.unwrap(), AuthSnapshot::default());

        let snapshot = AuthSnapshot {
            user: Some(user()),
            credential: Some(credential()),
        };
        snapshot.save(&path).await.unwrap();
        assert_eq!(AuthSnapshot::load(&path).await.unwrap(), snapshot);

        AuthSnapshot::default().save(&path).await.unwrap();
        assert!(!path.exists());
        // Removing an absent file is fine.
        AuthSnapshot::default().save(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_session_is_storage_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("session.json");
        std::fs::write(&path, "{").unwrap();

        assert!(matches!(
            AuthSnapshot::load(&path).await,
            Err(ClientError::Storage(_))
        ));
    }
}
