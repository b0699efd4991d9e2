//! Client configuration.
//!
//! # Configuration
//!
//! ```toml
//! base_url = "https://hub.example.com/api"
//! request_timeout_secs = 30
//! expiry_buffer_secs = 10
//! proof_header = "DPoP"
//! authorization_scheme = "DPoP"
//! two_phase_rotation = true
//! locale = "en"
//!
//! [endpoints]
//! refresh = "/auth/refresh"
//! confirm = "/auth/confirm"
//! ```
//!
//! # Environment Variables
//!
//! - `HUB_DATA_DIR` - Override the directory holding the key file and session

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::notice::Locale;

const APP_NAME: &str = "hub";
const DATA_DIR_ENV: &str = "HUB_DATA_DIR";

/// Default user config file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Persisted session file name within the data directory.
pub const SESSION_FILE: &str = "session.json";

/// Operations that never carry an access token.
pub const DEFAULT_EXEMPT_OPERATIONS: &[&str] = &[
    "exchangeToken",
    "login",
    "registerUser",
    "checkUsernameExist",
    "logout",
];

/// Backend endpoint paths, relative to `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    pub login: String,
    pub exchange: String,
    pub logout: String,
    pub refresh: String,
    pub confirm: String,
    pub user: String,
    pub username_exists: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            exchange: "/auth/exchange".to_string(),
            logout: "/auth/logout".to_string(),
            refresh: "/auth/refresh".to_string(),
            confirm: "/auth/confirm".to_string(),
            user: "/user".to_string(),
            username_exists: "/user/exist".to_string(),
        }
    }
}

/// Hub client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API base URL. Required.
    pub base_url: Option<String>,

    /// Per-request timeout. Also bounds how long callers can wait on a hung rotation.
    pub request_timeout_secs: u64,

    /// Rotate pre-emptively when the token expires within this many seconds.
    pub expiry_buffer_secs: i64,

    /// Header carrying the proof.
    pub proof_header: String,

    /// Scheme in `Authorization: <scheme> <token>`.
    pub authorization_scheme: String,

    /// Send the Phase-2 confirm after a successful refresh.
    pub two_phase_rotation: bool,

    /// Language for user-facing notices.
    pub locale: Locale,

    /// Directory for the key file and persisted session.
    ///
    /// When unset, [`ClientConfig::effective_data_dir`] falls back to
    /// `HUB_DATA_DIR` and then `<platform data dir>/hub`.
    pub data_dir: Option<PathBuf>,

    /// Operation names sent without an access token.
    pub exempt_operations: Vec<String>,

    pub endpoints: EndpointPaths,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
            expiry_buffer_secs: 10,
            proof_header: "DPoP".to_string(),
            authorization_scheme: "DPoP".to_string(),
            two_phase_rotation: true,
            locale: Locale::default(),
            data_dir: None,
            exempt_operations: DEFAULT_EXEMPT_OPERATIONS
                .iter()
                .map(|op| op.to_string())
                .collect(),
            endpoints: EndpointPaths::default(),
        }
    }
}

impl ClientConfig {
    /// Parse from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_two_phase_rotation(mut self, enabled: bool) -> Self {
        self.two_phase_rotation = enabled;
        self
    }

    pub fn with_expiry_buffer_secs(mut self, secs: i64) -> Self {
        self.expiry_buffer_secs = secs;
        self
    }

    pub fn with_proof_header(mut self, header: impl Into<String>) -> Self {
        self.proof_header = header.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether `operation` is sent without an access token.
    pub fn is_exempt(&self, operation: &str) -> bool {
        self.exempt_operations.iter().any(|op| op == operation)
    }

    /// Configured data directory, then `HUB_DATA_DIR`, then the platform default.
    pub fn effective_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(default_data_dir)
    }

    /// Check the values that cannot be defaulted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("base_url".to_string()))?;
        url::Url::parse(base_url).map_err(|e| ConfigError::Invalid {
            field: "base_url".to_string(),
            reason: e.to_string(),
        })?;

        reqwest::header::HeaderName::from_bytes(self.proof_header.as_bytes()).map_err(|e| {
            ConfigError::Invalid {
                field: "proof_header".to_string(),
                reason: e.to_string(),
            }
        })?;

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.expiry_buffer_secs < 0 {
            return Err(ConfigError::Invalid {
                field: "expiry_buffer_secs".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Load config from a specific file path.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ClientConfig::from_toml(&contents)
}

/// Load config from `path` if it exists, defaults otherwise.
pub fn load_config_or_default(path: &Path) -> Result<ClientConfig, ConfigError> {
    if path.is_file() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        Ok(ClientConfig::default())
    }
}

/// Data directory for hub.
///
/// Checks `HUB_DATA_DIR` first, then falls back to the platform data directory.
pub fn default_data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

/// Platform config file location for hub.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_FILE))
}
