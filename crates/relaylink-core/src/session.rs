//! Session model shared by the coordinator, the stores and the views.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traits::BrokerError;

/// Key recognized by a credential store.
///
/// The persisted names are what the dashboard has always written, so an
/// existing store stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Session flag; set only when the stored value is exactly `true`.
    SessionFlag,
    AccessToken,
    RefreshToken,
    Username,
    FullName,
    Email,
    PhoneNumber,
    /// Broker-service username.
    BrokerUsername,
    /// Broker-service key.
    BrokerKey,
    /// Avatar as a data URL.
    Avatar,
}

impl StoreKey {
    /// Keys that make up the session itself.
    pub const SESSION: [Self; 3] = [Self::SessionFlag, Self::AccessToken, Self::RefreshToken];

    /// Cached profile keys.
    pub const PROFILE: [Self; 7] = [
        Self::Username,
        Self::FullName,
        Self::Email,
        Self::PhoneNumber,
        Self::BrokerUsername,
        Self::BrokerKey,
        Self::Avatar,
    ];

    /// Persisted name of the key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionFlag => "isLoggedIn",
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
            Self::Username => "username",
            Self::FullName => "fullname",
            Self::Email => "email",
            Self::PhoneNumber => "phone_number",
            Self::BrokerUsername => "AIO_USERNAME",
            Self::BrokerKey => "AIO_KEY",
            Self::Avatar => "avatar",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value written under [`StoreKey::SessionFlag`] while logged in.
pub const SESSION_FLAG_SET: &str = "true";

/// The process-wide login session.
///
/// `is_logged_in` implies `access_token` is present; a logged-out session
/// has every field cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub is_logged_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Session {
    /// A logged-in session.
    #[must_use]
    pub const fn logged_in(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            is_logged_in: true,
            access_token: Some(access_token),
            refresh_token,
        }
    }

    /// Whether the session satisfies its field invariant.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        if self.is_logged_in {
            self.access_token.is_some()
        } else {
            self.access_token.is_none() && self.refresh_token.is_none()
        }
    }
}

/// Cached user profile fields.
///
/// These share the credential store with the session but belong to the
/// profile views; the coordinator only writes them on their behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(rename = "AIO_USERNAME", default, skip_serializing_if = "Option::is_none")]
    pub broker_username: Option<String>,
    #[serde(rename = "AIO_KEY", default, skip_serializing_if = "Option::is_none")]
    pub broker_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Profile {
    /// Build a profile by looking each field up by key.
    pub fn from_lookup(mut lookup: impl FnMut(StoreKey) -> Option<String>) -> Self {
        Self {
            username: lookup(StoreKey::Username),
            fullname: lookup(StoreKey::FullName),
            email: lookup(StoreKey::Email),
            phone_number: lookup(StoreKey::PhoneNumber),
            broker_username: lookup(StoreKey::BrokerUsername),
            broker_key: lookup(StoreKey::BrokerKey),
            avatar: lookup(StoreKey::Avatar),
        }
    }

    /// Fields paired with their store keys.
    #[must_use]
    pub fn fields(&self) -> [(StoreKey, Option<&str>); 7] {
        [
            (StoreKey::Username, self.username.as_deref()),
            (StoreKey::FullName, self.fullname.as_deref()),
            (StoreKey::Email, self.email.as_deref()),
            (StoreKey::PhoneNumber, self.phone_number.as_deref()),
            (StoreKey::BrokerUsername, self.broker_username.as_deref()),
            (StoreKey::BrokerKey, self.broker_key.as_deref()),
            (StoreKey::Avatar, self.avatar.as_deref()),
        ]
    }

    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_none())
    }
}

/// Result of the login view's own authentication call.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub profile: Option<Profile>,
}

impl LoginGrant {
    /// Create a grant from a token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            profile: None,
        }
    }

    /// Attach the profile returned alongside the tokens.
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }
}

impl fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    LoggedOut,
    /// Persisted session found at startup, not yet applied.
    Restoring,
    LoggedIn,
    /// Waiting on a token refresh after a rejected broker request.
    Refreshing,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Restoring => "restoring",
            Self::LoggedIn => "logged_in",
            Self::Refreshing => "refreshing",
        }
    }

    /// Whether the authenticated routes are reachable in this phase.
    #[must_use]
    pub const fn is_logged_in(self) -> bool {
        matches!(self, Self::LoggedIn | Self::Refreshing)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the realtime broker link as seen from this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Down,
    Connecting,
    Up,
    /// Gave up after a failed refresh; stays down until re-login or reload.
    Degraded,
}

impl LinkStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Connecting => "connecting",
            Self::Up => "up",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view handed to the router and other collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub link: LinkStatus,
    pub session: Session,
}

impl SessionSnapshot {
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.session.is_logged_in
    }
}

/// Broker request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Connect,
    Disconnect,
}

impl AttemptKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a broker request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Ok,
    Unauthorized,
    Error,
}

impl From<&Result<(), BrokerError>> for AttemptOutcome {
    fn from(result: &Result<(), BrokerError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(BrokerError::Unauthorized { .. }) => Self::Unauthorized,
            Err(BrokerError::Transport { .. }) => Self::Error,
        }
    }
}

/// One connect or disconnect request. Never persisted.
#[derive(Clone)]
pub struct ConnectionAttempt {
    pub id: Uuid,
    pub kind: AttemptKind,
    pub token: String,
    pub outcome: AttemptOutcome,
}

impl ConnectionAttempt {
    /// Start a pending attempt.
    #[must_use]
    pub fn new(kind: AttemptKind, token: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            token: token.into(),
            outcome: AttemptOutcome::Pending,
        }
    }

    /// Record the broker's answer.
    pub fn resolve(&mut self, result: &Result<(), BrokerError>) {
        self.outcome = AttemptOutcome::from(result);
    }
}

impl fmt::Debug for ConnectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionAttempt")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("token", &"<redacted>")
            .field("outcome", &self.outcome)
            .finish()
    }
}
