//! Wire protocol for the dashboard backend.

use serde::{Deserialize, Serialize};

/// Opens the realtime bridge session.
pub const CONNECT_PATH: &str = "/mqtt/connect";

/// Closes the realtime bridge session. Spelled the way the backend serves it.
pub const DISCONNECT_PATH: &str = "/mqtt/disconect";

/// Exchanges a refresh token for a new access token.
pub const REFRESH_PATH: &str = "/refresh-token";

/// Body of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body of a successful refresh response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Error body the backend attaches to failed responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    /// Best-effort message from a response body: the `message` field when
    /// the body is the backend's JSON error, otherwise the trimmed body.
    #[must_use]
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<Self>(body) {
            Ok(parsed) if !parsed.message.is_empty() => parsed.message,
            _ => body.trim().to_owned(),
        }
    }
}
