//! Request and response types for the Hub API.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// One logical API call, as handed to the dispatcher.
///
/// `operation` names the call for the auth-exempt allow-list; `path` is
/// resolved against the configured base URL.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub operation: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(operation: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(operation, Method::GET, path)
    }

    pub fn post(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(operation, Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::InvalidRequest(format!("Unserializable body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// A response body, parsed according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

impl Body {
    /// The machine-readable `code` member of a JSON body.
    pub fn code(&self) -> Option<&str> {
        match self {
            Body::Json(value) => value.get("code").and_then(|c| c.as_str()),
            _ => None,
        }
    }

    /// The human-readable `message` member of a JSON body.
    pub fn message(&self) -> Option<&str> {
        match self {
            Body::Json(value) => value.get("message").and_then(|m| m.as_str()),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct HubResponse {
    pub status: u16,
    pub body: Body,
}

impl HubResponse {
    /// Deserialize a JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .body
            .as_json()
            .ok_or_else(|| ClientError::Decode(format!("Expected JSON body, got {:?}", self.body)))?;
        serde_json::from_value(value.clone()).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Deserialize a JSON body wrapped in the standard envelope and return its `result`.
    pub fn result<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        Ok(self.json::<ApiEnvelope<T>>()?.result)
    }
}

/// Standard response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
}

/// Result of login, exchange and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub dpop_bound: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// The signed-in user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Social login provider, when the account was created through one.
    #[serde(default)]
    pub social: Option<String>,
}

/// Username/password login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// New account registration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UsernameQuery<'a> {
    pub username: &'a str,
}
