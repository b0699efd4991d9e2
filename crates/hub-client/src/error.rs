//! Client error types.

use hub_dpop::DpopError;
use thiserror::Error;

use crate::types::Body;

/// Error code the backend uses for an expired access token.
pub const JWT_EXPIRED_CODE: &str = "client.request.jwt.expired";

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server answered with a non-2xx status.
    #[error("HTTP {status}{}", code_suffix(.code))]
    Http {
        /// HTTP status code.
        status: u16,
        /// Machine-readable `code` from the error body, if any.
        code: Option<String>,
        /// Parsed response body.
        body: Body,
    },

    /// No response arrived (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Key vault, proof or credential cipher failure.
    #[error(transparent)]
    Dpop(DpopError),

    /// Token rotation did not produce a usable credential.
    #[error("Token rotation failed: {0}")]
    Rotation(#[from] RotationError),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A successful response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Session file could not be read or written.
    #[error("Session storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

impl From<DpopError> for ClientError {
    fn from(e: DpopError) -> Self {
        match e {
            DpopError::Transport(source) => ClientError::Transport(source),
            other => ClientError::Dpop(other),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ClientError::InvalidRequest(e.to_string())
        } else {
            ClientError::Transport(e)
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidRequest(format!("Invalid URL: {}", e))
    }
}

/// How an error should be handled by the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 401 or an expired-token code: rotate and retry once.
    AuthExpired,
    /// 429: notify the user, never rotate.
    RateLimited,
    /// The refresh endpoint refused to rotate; the session is gone.
    RotationRejected(RotationFailure),
    /// The stored credential cannot be decrypted.
    CredentialUnusable,
    /// No response from the server.
    Network,
    /// Anything else; handed to the caller untouched.
    Generic,
}

impl ClientError {
    /// Classify this error for the request pipeline.
    pub fn classify(&self) -> ErrorClass {
        match self {
            ClientError::Http { status: 429, .. } => ErrorClass::RateLimited,
            ClientError::Http { status: 401, .. } => ErrorClass::AuthExpired,
            ClientError::Http { code: Some(code), .. } if code == JWT_EXPIRED_CODE => {
                ErrorClass::AuthExpired
            }
            ClientError::Http { code: Some(code), .. } => match RotationFailure::from_code(code) {
                RotationFailure::Unknown => ErrorClass::Generic,
                failure => ErrorClass::RotationRejected(failure),
            },
            ClientError::Rotation(RotationError::Rejected(failure)) => {
                ErrorClass::RotationRejected(*failure)
            }
            ClientError::Transport(_) => ErrorClass::Network,
            ClientError::Dpop(e) if e.is_cipher() => ErrorClass::CredentialUnusable,
            _ => ErrorClass::Generic,
        }
    }

    /// Check if this error should trigger a token rotation.
    pub fn is_auth_expired(&self) -> bool {
        self.classify() == ErrorClass::AuthExpired
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::Http { status: 429, .. })
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Http { status: 404, .. })
    }

    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable error code from the response body.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ClientError::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================================================
// Rotation errors
// ============================================================================

/// Why the backend refused to rotate a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationFailure {
    /// The token was already rotated by another client or tab.
    AlreadyRotated,
    /// The server-side session was invalidated.
    SessionInvalidated,
    /// A rotated-out token was presented again.
    ReuseDetected,
    Unknown,
}

impl RotationFailure {
    /// Map a backend error code to a failure class.
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth.token.already_rotated" => RotationFailure::AlreadyRotated,
            "auth.session.invalidated" => RotationFailure::SessionInvalidated,
            "auth.token.reuse_detected" => RotationFailure::ReuseDetected,
            _ => RotationFailure::Unknown,
        }
    }
}

impl std::fmt::Display for RotationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RotationFailure::AlreadyRotated => "token already rotated",
            RotationFailure::SessionInvalidated => "session invalidated",
            RotationFailure::ReuseDetected => "token reuse detected",
            RotationFailure::Unknown => "unknown failure",
        };
        f.write_str(text)
    }
}

/// Outcome of a failed rotation, shared by every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotationError {
    /// The refresh endpoint answered with an error. Session cleared.
    #[error("{0}")]
    Rejected(RotationFailure),

    /// The refresh succeeded but carried no access token. State untouched.
    #[error("refresh response carried no access token")]
    MissingCredential,

    /// No response, or the new token could not be stored. Session cleared.
    #[error("{0}")]
    Aborted(String),
}

// ============================================================================
// Config errors
// ============================================================================

/// Errors that can occur while loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// Missing required field.
    #[error("missing required field '{0}'")]
    MissingField(String),
}
