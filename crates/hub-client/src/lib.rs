//! Authenticated client for the Hub API.
//!
//! Every request carries a DPoP proof from the device key pair. Requests that
//! need authentication also carry the access token, which is held encrypted
//! and only decrypted inside [`hub_dpop`] for the duration of one send.
//!
//! # Example
//!
//! ```no_run
//! use hub_client::{HubClient, RequestSpec, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = HubClient::builder()
//!     .base_url("https://hub.example.com/api")
//!     .build()?;
//!
//! client.auth().login("kim", "hunter2").await?;
//! client.users().current().await?;
//!
//! // Any other endpoint goes through the same pipeline.
//! let response = client
//!     .dispatch(&RequestSpec::get("listPosts", "/posts"))
//!     .await?;
//! println!("{:?}", response.body);
//! # Ok(())
//! # }
//! ```
//!
//! # Token rotation
//!
//! Before an authenticated call the dispatcher checks the token's expiry and
//! rotates ahead of time. A 401 (or an expired-token error code) triggers one
//! rotation and one retry. Concurrent callers share a single rotation.

pub mod api;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod notice;
pub mod rotation;
pub mod state;
pub mod transport;
pub mod types;

pub use client::{ClientBuilder, HubClient};
pub use config::{ClientConfig, EndpointPaths, load_config, load_config_or_default};
pub use error::{ClientError, ConfigError, ErrorClass, Result, RotationError, RotationFailure};
pub use notice::{Locale, Notice, NoticeCenter, NoticeLevel};
pub use rotation::{RotationCoordinator, RotationOutcome};
pub use state::{AuthSnapshot, AuthState};
pub use types::*;

pub use hub_dpop::{EncryptedCredential, Proof, PublicJwk};
