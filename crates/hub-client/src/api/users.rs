//! Users API.

use crate::client::HubClient;
use crate::error::{ClientError, Result};
use crate::types::{RegisterRequest, RequestSpec, User, UsernameQuery};

/// Users API client.
pub struct UsersApi {
    client: HubClient,
}

impl UsersApi {
    pub(crate) fn new(client: HubClient) -> Self {
        Self { client }
    }

    /// Fetch the signed-in user.
    ///
    /// Success sets the session marker; any failure clears it.
    pub async fn current(&self) -> Result<User> {
        let spec = RequestSpec::get("getUser", self.client.config().endpoints.user.clone());
        let user = match self.client.dispatch(&spec).await {
            Ok(response) => response.result::<User>().and_then(|user| {
                user.ok_or_else(|| ClientError::Decode("response carried no user".to_string()))
            }),
            Err(e) => Err(e),
        };

        match user {
            Ok(user) => {
                self.client.set_user(user.clone());
                Ok(user)
            }
            Err(e) => {
                self.client.clear_user();
                Err(e)
            }
        }
    }

    /// Create an account.
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let spec = RequestSpec::post("registerUser", self.client.config().endpoints.user.clone())
            .json(request)?;
        self.client.dispatch(&spec).await?;
        Ok(())
    }

    /// Whether `username` is free to register.
    pub async fn check_username_available(&self, username: &str) -> Result<bool> {
        let spec = RequestSpec::post(
            "checkUsernameExist",
            self.client.config().endpoints.username_exists.clone(),
        )
        .json(&UsernameQuery { username })?;
        let exists = self
            .client
            .dispatch(&spec)
            .await?
            .result::<bool>()?
            .unwrap_or(false);
        Ok(!exists)
    }
}
