//! Authentication API: login, social-login exchange and logout.

use hub_dpop::EncryptedCredential;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::client::HubClient;
use crate::error::{ClientError, Result};
use crate::types::{HubResponse, LoginRequest, RequestSpec, TokenResponse};

/// Authentication API client.
pub struct AuthApi {
    client: HubClient,
}

impl AuthApi {
    pub(crate) fn new(client: HubClient) -> Self {
        Self { client }
    }

    /// Sign in with a username and password.
    ///
    /// The issued token is encrypted and stored; only the ciphertext is returned.
    pub async fn login(&self, username: &str, password: &str) -> Result<EncryptedCredential> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let spec = RequestSpec::post("login", self.client.config().endpoints.login.clone())
            .json(&request)?;
        let response = self.client.dispatch(&spec).await?;
        let credential = self.store_issued_token(&response)?;
        info!(username, "Logged in");
        Ok(credential)
    }

    /// Trade the cookie set by a social-login redirect for an access token.
    pub async fn exchange_social_login_cookie(&self) -> Result<EncryptedCredential> {
        let spec = RequestSpec::post(
            "exchangeToken",
            self.client.config().endpoints.exchange.clone(),
        );
        let response = self.client.dispatch(&spec).await?;
        let credential = self.store_issued_token(&response)?;
        info!("Exchanged social login cookie for an access token");
        Ok(credential)
    }

    /// Sign out.
    ///
    /// Local state is cleared whatever the backend says: auth state first, then
    /// the key pair. A backend failure is logged, not returned.
    pub async fn logout(&self) -> Result<()> {
        let spec = RequestSpec::post("logout", self.client.config().endpoints.logout.clone());
        if let Err(e) = self.client.dispatch(&spec).await {
            warn!(error = %e, "Backend logout failed, clearing local session anyway");
        }
        self.client.end_session().await
    }

    fn store_issued_token(&self, response: &HubResponse) -> Result<EncryptedCredential> {
        let token = response
            .result::<TokenResponse>()?
            .and_then(|tokens| tokens.access_token)
            .map(Zeroizing::new)
            .ok_or_else(|| ClientError::Decode("response carried no access token".to_string()))?;
        self.client.store_access_token(&token)
    }
}
