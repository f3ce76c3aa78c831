//! Transport layer for the dashboard backend.
//!
//! Provides:
//! - Wire protocol (JSON bodies and endpoint paths)
//! - Client configuration
//! - HTTP broker and token refresh clients (feature: http)

pub mod config;
pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

pub use config::{ClientConfig, ConfigError};
pub use protocol::{ErrorBody, RefreshRequest, RefreshResponse};

#[cfg(feature = "http")]
pub use http::{HttpBrokerClient, HttpTokenRefresher};
