//! Two-phase access token rotation.
//!
//! Phase 1 posts to the refresh endpoint (proof only, the refresh cookie does
//! the rest), encrypts the new token and swaps it into [`AuthState`]. Phase 2
//! tells the backend the new token is in use so it can retire the old one. It
//! runs in the background and its failure only costs a slower server-side
//! cleanup. [`RotationCoordinator::wait_for_confirms`] lets a short-lived
//! process flush it before exiting.
//!
//! At most one Phase 1 runs at a time. Callers arriving while one is in flight
//! await the same shared future and observe the same outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use hub_dpop::DpopClient;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{ClientError, RotationError, RotationFailure};
use crate::notice::NoticeCenter;
use crate::state::AuthState;
use crate::transport::Transport;
use crate::types::{RequestSpec, TokenResponse};

/// Operation name of the refresh call.
pub const REFRESH_OPERATION: &str = "refreshToken";

/// Operation name of the confirm call.
pub const CONFIRM_OPERATION: &str = "confirmToken";

/// What every caller of [`RotationCoordinator::rotate`] receives.
pub type RotationOutcome = std::result::Result<(), RotationError>;

type InFlight = Shared<BoxFuture<'static, RotationOutcome>>;

/// Serializes token rotation. Clones share the in-flight rotation.
#[derive(Debug, Clone)]
pub struct RotationCoordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    transport: Arc<Transport>,
    dpop: DpopClient,
    auth: AuthState,
    notices: NoticeCenter,
    refresh_path: String,
    confirm_path: String,
    two_phase: bool,
    in_flight: Mutex<Option<InFlightDebug>>,
    // Phase-2 tasks. Dropped (and aborted) with the coordinator.
    confirms: Mutex<JoinSet<()>>,
    refreshes: AtomicU64,
}

// `Shared` has no Debug impl.
struct InFlightDebug(InFlight);

impl std::fmt::Debug for InFlightDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InFlight")
    }
}

/// Empties the in-flight slot when the rotation future finishes or is dropped.
struct SlotGuard(Arc<CoordinatorInner>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.in_flight.lock().take();
    }
}

impl RotationCoordinator {
    pub fn new(
        transport: Arc<Transport>,
        dpop: DpopClient,
        auth: AuthState,
        notices: NoticeCenter,
        config: &crate::config::ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                dpop,
                auth,
                notices,
                refresh_path: config.endpoints.refresh.clone(),
                confirm_path: config.endpoints.confirm.clone(),
                two_phase: config.two_phase_rotation,
                in_flight: Mutex::new(None),
                confirms: Mutex::new(JoinSet::new()),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Rotate the access token, or join the rotation already in progress.
    pub async fn rotate(&self) -> RotationOutcome {
        let rotation = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(InFlightDebug(existing)) => {
                    debug!("Joining in-flight token rotation");
                    existing.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let rotation = async move {
                        let guard = SlotGuard(inner);
                        guard.0.refresh().await
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlightDebug(rotation.clone()));
                    rotation
                }
            }
        };
        rotation.await
    }

    /// Whether a rotation is currently in flight.
    pub fn is_rotating(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Number of Phase-1 refresh calls issued so far.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    /// Wait up to `limit` for Phase-2 confirm calls still in flight.
    ///
    /// Anything unfinished after `limit` is abandoned. Nothing on the request
    /// path calls this; it is for process shutdown.
    pub async fn wait_for_confirms(&self, limit: Duration) {
        let mut confirms = std::mem::take(&mut *self.inner.confirms.lock());
        if confirms.is_empty() {
            return;
        }

        debug!(pending = confirms.len(), "Waiting for rotation confirms");
        let drained = tokio::time::timeout(limit, async {
            while confirms.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                pending = confirms.len(),
                "Rotation confirm still pending, abandoning it"
            );
        }
    }

    /// Drop a stored token that can no longer be decrypted.
    ///
    /// The session marker is kept, so the next authenticated call rotates.
    pub fn discard_unusable_credential(&self) {
        warn!("Stored access token cannot be decrypted, discarding it");
        self.inner.auth.clear_credential();
    }
}

impl CoordinatorInner {
    /// Phase 1, then Phase 2 in the background.
    async fn refresh(&self) -> RotationOutcome {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!("Rotating access token");

        let spec = RequestSpec::post(REFRESH_OPERATION, self.refresh_path.clone());
        let response = match self.transport.send(&spec, false).await {
            Ok(response) => response,
            Err(ClientError::Http { status, code, .. }) => {
                let failure = code
                    .as_deref()
                    .map(RotationFailure::from_code)
                    .unwrap_or(RotationFailure::Unknown);
                warn!(status, code = ?code, %failure, "Refresh rejected, ending session");
                self.notices.notify_rotation_failure(failure);
                self.auth.clear();
                return Err(RotationError::Rejected(failure));
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, ending session");
                self.notices.notify_rotation_failure(RotationFailure::Unknown);
                self.auth.clear();
                return Err(RotationError::Aborted(e.to_string()));
            }
        };

        let token = match response.result::<TokenResponse>() {
            Ok(Some(TokenResponse {
                access_token: Some(token),
                ..
            })) => Zeroizing::new(token),
            Ok(_) | Err(_) => {
                warn!("Refresh response carried no access token");
                return Err(RotationError::MissingCredential);
            }
        };

        let credential = match self.dpop.cipher().encrypt(&token) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Failed to encrypt rotated token, ending session");
                self.notices.notify_rotation_failure(RotationFailure::Unknown);
                self.auth.clear();
                return Err(RotationError::Aborted(e.to_string()));
            }
        };
        drop(token);

        self.auth.set_credential(credential);
        info!("Access token rotated");

        if self.two_phase {
            self.spawn_confirm();
        }
        Ok(())
    }

    /// Phase 2. Not awaited; failures are logged and dropped.
    fn spawn_confirm(&self) {
        let transport = self.transport.clone();
        let spec = RequestSpec::post(CONFIRM_OPERATION, self.confirm_path.clone());
        let mut confirms = self.confirms.lock();
        // Reap finished confirms so the set only holds pending ones.
        while confirms.try_join_next().is_some() {}
        confirms.spawn(async move {
            match transport.send(&spec, false).await {
                Ok(_) => debug!("Rotation confirmed, previous token retired"),
                Err(e) => warn!(
                    error = %e,
                    "Rotation confirm failed; previous token will expire server-side"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::notice::NoticeLevel;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        coordinator: RotationCoordinator,
        auth: AuthState,
        notices: NoticeCenter,
        dpop: DpopClient,
    }

    fn fixture(server: &MockServer, two_phase: bool) -> Fixture {
        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_two_phase_rotation(two_phase);
        let dpop = DpopClient::in_memory();
        let auth = AuthState::new();
        let notices = NoticeCenter::default();
        let transport = Arc::new(Transport::new(&config, dpop.clone(), auth.clone()).unwrap());
        Fixture {
            coordinator: RotationCoordinator::new(
                transport,
                dpop.clone(),
                auth.clone(),
                notices.clone(),
                &config,
            ),
            auth,
            notices,
            dpop,
        }
    }

    fn token_body(token: &str) -> serde_json::Value {
        json!({"status": 200, "result": {"accessToken": token, "dpopBound": true}})
    }

    #[tokio::test]
    async fn test_successful_rotation_stores_new_token_and_confirms() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("new.token.value")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/confirm"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true);
        fx.coordinator.rotate().await.unwrap();

        assert!(fx.auth.has_credential());
        assert!(!fx.coordinator.is_rotating());
        assert_eq!(fx.coordinator.refresh_count(), 1);

        // Phase 2 is detached; give it a moment to land.
        tokio::time::sleep(Duration::from_millis(200)).await;
        server.verify().await;
    }

    #[tokio::test]
    async fn test_single_phase_skips_confirm() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/confirm"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server, false);
        fx.coordinator.rotate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        server.verify().await;
    }

    #[tokio::test]
    async fn test_rejected_rotation_clears_session_and_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"code": "auth.token.already_rotated"})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, true);
        fx.dpop.vault().ensure_initialized().await.unwrap();
        fx.auth.set_credential(fx.dpop.cipher().encrypt("old").unwrap());
        fx.auth.set_user(crate::types::User {
            username: "kim".to_string(),
            nickname: None,
            email: None,
            social: None,
        });

        let outcome = fx.coordinator.rotate().await;
        assert_eq!(
            outcome,
            Err(RotationError::Rejected(RotationFailure::AlreadyRotated))
        );
        assert!(!fx.auth.has_credential());
        assert!(!fx.auth.is_logged_in());

        let history = fx.notices.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_missing_token_leaves_state_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(&server)
            .await;

        let fx = fixture(&server, true);
        fx.dpop.vault().ensure_initialized().await.unwrap();
        let old = fx.dpop.cipher().encrypt("old").unwrap();
        fx.auth.set_credential(old.clone());

        assert_eq!(
            fx.coordinator.rotate().await,
            Err(RotationError::MissingCredential)
        );
        assert_eq!(fx.auth.credential(), Some(old));
        assert!(fx.notices.history().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_clears_and_notifies() {
        let config = ClientConfig::default().with_base_url("http://127.0.0.1:9");
        let dpop = DpopClient::in_memory();
        let auth = AuthState::new();
        let notices = NoticeCenter::default();
        let transport = Arc::new(Transport::new(&config, dpop.clone(), auth.clone()).unwrap());
        let coordinator =
            RotationCoordinator::new(transport, dpop, auth.clone(), notices.clone(), &config);

        auth.set_user(crate::types::User {
            username: "kim".to_string(),
            nickname: None,
            email: None,
            social: None,
        });

        assert!(matches!(
            coordinator.rotate().await,
            Err(RotationError::Aborted(_))
        ));
        assert!(!auth.is_logged_in());
        assert!(!coordinator.is_rotating());

        let history = notices.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].level, NoticeLevel::Error);
        assert!(history[0].message.contains("could not be renewed"));
    }

    #[tokio::test]
    async fn test_wait_for_confirms_flushes_pending_confirm() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/confirm"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, true);
        fx.coordinator.rotate().await.unwrap();
        fx.coordinator.wait_for_confirms(Duration::from_secs(5)).await;

        // No sleep: the confirm already landed.
        server.verify().await;
        // Nothing left to wait for.
        fx.coordinator.wait_for_confirms(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_wait_for_confirms_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/confirm"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let fx = fixture(&server, true);
        fx.coordinator.rotate().await.unwrap();

        let started = std::time::Instant::now();
        fx.coordinator.wait_for_confirms(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared.token"))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/confirm"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fx = fixture(&server, true);
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = fx.coordinator.clone();
                tokio::spawn(async move { coordinator.rotate().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }

        assert_eq!(fx.coordinator.refresh_count(), 1);
        assert!(!fx.coordinator.is_rotating());
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("second")))
            .mount(&server)
            .await;

        let fx = fixture(&server, false);
        assert!(fx.coordinator.rotate().await.is_err());
        assert!(fx.coordinator.rotate().await.is_ok());
        assert_eq!(fx.coordinator.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_discard_unusable_credential_keeps_marker() {
        let server = MockServer::start().await;
        let fx = fixture(&server, true);
        fx.dpop.vault().ensure_initialized().await.unwrap();
        fx.auth.set_credential(fx.dpop.cipher().encrypt("x").unwrap());
        fx.auth.set_user(crate::types::User {
            username: "kim".to_string(),
            nickname: None,
            email: None,
            social: None,
        });

        fx.coordinator.discard_unusable_credential();
        assert!(!fx.auth.has_credential());
        assert!(fx.auth.is_logged_in());
    }
}
