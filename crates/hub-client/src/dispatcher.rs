//! Request dispatcher: the single entry point for API calls.

use std::sync::Arc;

use hub_dpop::{CredentialStatus, DpopClient};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result, RotationError};
use crate::notice::NoticeCenter;
use crate::rotation::RotationCoordinator;
use crate::state::AuthState;
use crate::transport::Transport;
use crate::types::{HubResponse, RequestSpec};

/// Decides per call whether to attach the token, rotates ahead of expiry, and
/// retries once after a reactive rotation.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<ClientConfig>,
    transport: Arc<Transport>,
    coordinator: RotationCoordinator,
    dpop: DpopClient,
    auth: AuthState,
    notices: NoticeCenter,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ClientConfig>,
        transport: Arc<Transport>,
        coordinator: RotationCoordinator,
        dpop: DpopClient,
        auth: AuthState,
        notices: NoticeCenter,
    ) -> Self {
        Self {
            config,
            transport,
            coordinator,
            dpop,
            auth,
            notices,
        }
    }

    /// Whether `operation` carries the access token.
    pub fn requires_auth(&self, operation: &str) -> bool {
        !self.config.is_exempt(operation)
    }

    /// Send `spec` through the full pipeline.
    pub async fn dispatch(&self, spec: &RequestSpec) -> Result<HubResponse> {
        // The refresh call is the rotation itself; never wrap it.
        if self.is_refresh_call(spec) {
            return self.transport.send(spec, false).await;
        }

        let requires_auth = self.requires_auth(&spec.operation);
        let mut may_rotate = requires_auth;
        if requires_auth {
            match self.rotate_if_expiring().await {
                Ok(()) => {}
                // The backend refused the session; it is already over.
                Err(err @ ClientError::Rotation(RotationError::Rejected(_))) => return Err(err),
                Err(ClientError::Rotation(e)) => {
                    warn!(
                        operation = %spec.operation,
                        error = %e,
                        "Pre-emptive rotation failed, sending with the current state"
                    );
                    may_rotate = false;
                }
                Err(err) => return Err(err),
            }
        }

        let err = match self.send(spec, requires_auth).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if !(may_rotate && err.is_auth_expired()) {
            return Err(err);
        }

        info!(
            operation = %spec.operation,
            status = ?err.status(),
            "Access token rejected, rotating and retrying once"
        );
        self.coordinator.rotate().await?;
        self.send(spec, true).await
    }

    /// One transport send plus the failure side effects every attempt shares.
    async fn send(&self, spec: &RequestSpec, with_credential: bool) -> Result<HubResponse> {
        let result = self.transport.send(spec, with_credential).await;
        match &result {
            Err(err) if err.is_rate_limited() => {
                self.notices.notify_rate_limited();
            }
            Err(ClientError::Dpop(e)) if e.is_cipher() => {
                self.coordinator.discard_unusable_credential();
            }
            _ => {}
        }
        result
    }

    fn is_refresh_call(&self, spec: &RequestSpec) -> bool {
        spec.path.contains(self.config.endpoints.refresh.as_str())
    }

    /// Rotate before the call when the token is about to expire, or is missing
    /// while the user should be signed in.
    async fn rotate_if_expiring(&self) -> Result<()> {
        let logged_in = self.auth.is_logged_in();
        if !logged_in {
            return Ok(());
        }

        let needs_rotation = match self.auth.credential() {
            Some(credential) => {
                self.dpop.vault().ensure_initialized().await?;
                match self
                    .dpop
                    .cipher()
                    .credential_status(&credential, self.config.expiry_buffer_secs)
                {
                    Ok(CredentialStatus::Fresh { expires_in_secs }) => {
                        debug!(expires_in_secs, "Access token is fresh");
                        false
                    }
                    Ok(CredentialStatus::Expiring) => {
                        info!("Access token expiring, rotating before the call");
                        true
                    }
                    Err(e) if e.is_cipher() => {
                        self.coordinator.discard_unusable_credential();
                        true
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => {
                info!("Signed in without an access token, rotating before the call");
                true
            }
        };

        if needs_rotation {
            self.coordinator.rotate().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(server: &MockServer) -> (Dispatcher, RotationCoordinator) {
        let config = Arc::new(ClientConfig::default().with_base_url(server.uri()));
        let dpop = DpopClient::in_memory();
        let auth = AuthState::new();
        let notices = NoticeCenter::default();
        let transport = Arc::new(Transport::new(&config, dpop.clone(), auth.clone()).unwrap());
        let coordinator = RotationCoordinator::new(
            transport.clone(),
            dpop.clone(),
            auth.clone(),
            notices.clone(),
            &config,
        );
        (
            Dispatcher::new(config, transport, coordinator.clone(), dpop, auth, notices),
            coordinator,
        )
    }

    #[tokio::test]
    async fn test_requires_auth_follows_allow_list() {
        let server = MockServer::start().await;
        let (dispatcher, _) = dispatcher(&server);

        assert!(!dispatcher.requires_auth("login"));
        assert!(!dispatcher.requires_auth("exchangeToken"));
        assert!(!dispatcher.requires_auth("logout"));
        assert!(dispatcher.requires_auth("getUser"));
        assert!(dispatcher.requires_auth("anythingElse"));
    }

    #[tokio::test]
    async fn test_refresh_call_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"code": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, coordinator) = dispatcher(&server);
        let err = dispatcher
            .dispatch(&RequestSpec::post("refreshToken", "/auth/refresh"))
            .await
            .unwrap_err();

        // A 401 from refresh itself must not start another rotation.
        assert!(matches!(err, ClientError::Http { status: 401, .. }));
        assert_eq!(coordinator.refresh_count(), 0);
    }
}
