//! Authenticated transport: one outbound request with its proof attached.

use std::time::Duration;

use hub_dpop::{DpopClient, HeaderScheme};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError, Result};
use crate::state::AuthState;
use crate::types::{Body, HubResponse, RequestSpec};

/// Sends requests with a proof header, and the access token when asked to.
#[derive(Debug)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    scheme: HeaderScheme,
    dpop: DpopClient,
    auth: AuthState,
}

impl Transport {
    pub fn new(config: &ClientConfig, dpop: DpopClient, auth: AuthState) -> Result<Self> {
        config.validate()?;
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("base_url".to_string()))?;

        // Normalize so relative joins keep the base path.
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let proof_header = HeaderName::from_bytes(config.proof_header.as_bytes()).map_err(|e| {
            ConfigError::Invalid {
                field: "proof_header".to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // The cookie store carries the refresh cookie set at login.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .user_agent(format!("hub-client/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            timeout: config.request_timeout(),
            scheme: HeaderScheme {
                proof_header,
                authorization_scheme: config.authorization_scheme.clone(),
            },
            dpop,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path against the base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send `spec`.
    ///
    /// With `requires_auth` and a stored credential, the request carries the
    /// access token and a proof bound to it. Otherwise it carries a plain proof.
    /// Non-2xx statuses come back as [`ClientError::Http`]; a missing response
    /// as [`ClientError::Transport`].
    pub async fn send(&self, spec: &RequestSpec, requires_auth: bool) -> Result<HubResponse> {
        self.dpop.vault().ensure_initialized().await?;

        let mut url = self.url(&spec.path)?;
        if !spec.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&spec.query);
        }

        let mut builder = self
            .http
            .request(spec.method.clone(), url)
            .timeout(self.timeout);
        if let Some(body) = &spec.body {
            builder = builder.json(body);
        }
        let mut request = builder.build()?;

        let credential = if requires_auth {
            self.auth.credential()
        } else {
            None
        };
        debug!(
            operation = %spec.operation,
            method = %request.method(),
            url = %request.url(),
            with_credential = credential.is_some(),
            "Sending request"
        );

        let response = match credential {
            Some(credential) => {
                self.dpop
                    .cipher()
                    .send_authorized(&self.http, request, &credential, &self.scheme)
                    .await?
            }
            None => {
                let proof = self
                    .dpop
                    .proofs()
                    .create_proof(request.method().as_str(), request.url().as_str())?;
                self.scheme.attach_proof(&mut request, proof.as_str())?;
                self.http.execute(request).await?
            }
        };

        read_response(response).await
    }
}

/// Parse the body by content type and split success from HTTP errors.
async fn read_response(response: reqwest::Response) -> Result<HubResponse> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    let text = response.text().await?;

    let body = if text.is_empty() {
        Body::Empty
    } else if is_json {
        match serde_json::from_str(&text) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(text),
        }
    } else {
        Body::Text(text)
    };

    debug!(status = status.as_u16(), "Received response");
    if status.is_success() {
        Ok(HubResponse {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(ClientError::Http {
            status: status.as_u16(),
            code: error_code(&body),
            body,
        })
    }
}

/// The `code` member of an error body, including JSON sent as plain text.
fn error_code(body: &Body) -> Option<String> {
    match body {
        Body::Json(_) => body.code().map(str::to_string),
        Body::Text(text) => serde_json::from_str::<serde_json::Value>(text)
            .ok()?
            .get("code")?
            .as_str()
            .map(str::to_string),
        Body::Empty => None,
    }
}
