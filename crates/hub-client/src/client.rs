//! Main client implementation.

use std::path::PathBuf;
use std::sync::Arc;

use hub_dpop::{
    DpopClient, EncryptedCredential, FileKeyStore, KeyStore, MemoryKeyStore, Proof, PublicJwk,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{AuthApi, UsersApi};
use crate::config::{ClientConfig, SESSION_FILE};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::notice::NoticeCenter;
use crate::rotation::RotationCoordinator;
use crate::state::{AuthSnapshot, AuthState};
use crate::transport::Transport;
use crate::types::{HubResponse, RequestSpec, User};

/// Hub API client.
///
/// Owns the device key pair, the shared auth state and the request pipeline.
/// Clones share everything; build one per process.
///
/// # Example
///
/// ```no_run
/// use hub_client::{ClientConfig, HubClient};
///
/// # async fn example() -> hub_client::Result<()> {
/// let client = HubClient::builder()
///     .config(ClientConfig::default().with_base_url("https://hub.example.com/api"))
///     .build()?;
///
/// client.auth().login("kim", "hunter2").await?;
/// let me = client.users().current().await?;
/// println!("Signed in as {}", me.username);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: Arc<ClientConfig>,
    dpop: DpopClient,
    auth: AuthState,
    notices: NoticeCenter,
    transport: Arc<Transport>,
    coordinator: RotationCoordinator,
    dispatcher: Dispatcher,
    session_path: Option<PathBuf>,
}

impl HubClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn base_url(&self) -> &Url {
        self.inner.transport.base_url()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the authentication API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the users API.
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys and proofs
    // ─────────────────────────────────────────────────────────────────────────

    /// Load or create the device key pair.
    pub async fn initialize(&self) -> Result<PublicJwk> {
        Ok(self.inner.dpop.vault().ensure_initialized().await?)
    }

    /// Whether the key pair is loaded.
    pub fn is_ready(&self) -> bool {
        self.inner.dpop.is_ready()
    }

    /// A standalone proof for `method` + `url`, not bound to any token.
    pub async fn create_proof(&self, method: &str, url: &str) -> Result<Proof> {
        self.initialize().await?;
        Ok(self.inner.dpop.proofs().create_proof(method, url)?)
    }

    /// RFC 7638 thumbprint of the device key, once loaded.
    pub fn key_thumbprint(&self) -> Option<String> {
        self.inner
            .dpop
            .vault()
            .public_jwk()
            .map(|jwk| jwk.thumbprint())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requests and state
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a request through the authenticated pipeline.
    pub async fn dispatch(&self, spec: &RequestSpec) -> Result<HubResponse> {
        self.inner.dispatcher.dispatch(spec).await
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.inner.auth
    }

    pub fn notices(&self) -> &NoticeCenter {
        &self.inner.notices
    }

    pub fn rotation(&self) -> &RotationCoordinator {
        &self.inner.coordinator
    }

    /// Load the persisted session, if any. Returns whether a user was restored.
    pub async fn restore_session(&self) -> Result<bool> {
        let Some(path) = &self.inner.session_path else {
            return Ok(false);
        };
        let snapshot = AuthSnapshot::load(path).await?;
        let restored = snapshot.user.is_some();
        self.inner.auth.restore(snapshot);
        debug!(path = %path.display(), restored, "Session loaded");
        Ok(restored)
    }

    /// Let background work finish before the process exits.
    ///
    /// Waits up to the request timeout for rotation confirms still in flight.
    /// The client stays usable afterwards.
    pub async fn shutdown(&self) {
        self.inner
            .coordinator
            .wait_for_confirms(self.inner.config.request_timeout())
            .await;
    }

    /// Persist the current session (ciphertext only).
    pub async fn save_session(&self) -> Result<()> {
        match &self.inner.session_path {
            Some(path) => self.inner.auth.snapshot().save(path).await,
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session transitions (used by the API structs)
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt a freshly issued token and make it the current credential.
    pub(crate) fn store_access_token(&self, token: &str) -> Result<EncryptedCredential> {
        let credential = self.inner.dpop.cipher().encrypt(token)?;
        self.inner.auth.set_credential(credential.clone());
        Ok(credential)
    }

    pub(crate) fn set_user(&self, user: User) {
        self.inner.auth.set_user(user);
    }

    pub(crate) fn clear_user(&self) {
        self.inner.auth.clear_user();
    }

    /// Clear auth state, the persisted session and the key pair. Every stored
    /// ciphertext is dead after this.
    pub(crate) async fn end_session(&self) -> Result<()> {
        self.inner.auth.clear();
        // Before the key: a session file left behind would be restored next run.
        if let Err(e) = self.save_session().await {
            warn!(error = %e, "Failed to remove persisted session");
        }
        self.inner.dpop.clear().await?;
        info!("Session ended");
        Ok(())
    }
}

/// Builder for creating a HubClient.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    key_store: Option<Arc<dyn KeyStore>>,
    session_path: Option<PathBuf>,
    notices: Option<NoticeCenter>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` wholesale.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Store the key pair somewhere other than the data directory.
    pub fn key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Persist the session at `path` instead of `<data_dir>/session.json`.
    pub fn session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    /// Share an existing notice centre.
    pub fn notices(mut self, notices: NoticeCenter) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Build the client.
    ///
    /// Without an explicit key store, the key pair lives in `data_dir` when one
    /// is configured and in memory otherwise.
    pub fn build(self) -> Result<HubClient> {
        let config = Arc::new(self.config);

        let key_store = match (self.key_store, &config.data_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileKeyStore::new(dir)) as Arc<dyn KeyStore>,
            (None, None) => {
                debug!("No data directory configured, keeping the key pair in memory");
                Arc::new(MemoryKeyStore::new())
            }
        };
        let session_path = self
            .session_path
            .or_else(|| config.data_dir.as_ref().map(|dir| dir.join(SESSION_FILE)));

        let dpop = DpopClient::new(key_store);
        let auth = AuthState::new();
        let notices = self
            .notices
            .unwrap_or_else(|| NoticeCenter::new(config.locale));

        let transport = Arc::new(Transport::new(&config, dpop.clone(), auth.clone())?);
        let coordinator = RotationCoordinator::new(
            transport.clone(),
            dpop.clone(),
            auth.clone(),
            notices.clone(),
            &config,
        );
        let dispatcher = Dispatcher::new(
            config.clone(),
            transport.clone(),
            coordinator.clone(),
            dpop.clone(),
            auth.clone(),
            notices.clone(),
        );

        Ok(HubClient {
            inner: Arc::new(ClientInner {
                config,
                dpop,
                auth,
                notices,
                transport,
                coordinator,
                dispatcher,
                session_path,
            }),
        })
    }
}
