//! Collaborator traits for persistence, the broker bridge and token refresh.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{SESSION_FLAG_SET, StoreKey};

/// Credential store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store contents are corrupt: {0}")]
    Corrupt(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Durable string-keyed storage for tokens, the session flag and profile fields.
///
/// Last write wins. A missing key is a normal `None`, never an error.
pub trait CredentialStore: Send + Sync {
    /// Read a key.
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;

    /// Write a key.
    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key succeeds.
    fn clear(&self, key: StoreKey) -> Result<(), StoreError>;

    /// Whether the persisted session flag is set.
    fn session_flag(&self) -> Result<bool, StoreError> {
        Ok(self.get(StoreKey::SessionFlag)?.as_deref() == Some(SESSION_FLAG_SET))
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn clear(&self, key: StoreKey) -> Result<(), StoreError> {
        (**self).clear(key)
    }
}

/// Broker bridge error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The backend rejected the access token.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },
    /// Any other failed response or network fault.
    #[error("Transport error: {message}")]
    Transport { message: String },
}

/// Client for the backend's broker-bridge endpoints.
///
/// One request per call; retry policy belongs to the caller.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open the realtime bridge session for `access_token`.
    async fn connect(&self, access_token: &str) -> Result<(), BrokerError>;

    /// Close the realtime bridge session. Safe to call when nothing is open.
    async fn disconnect(&self, access_token: &str) -> Result<(), BrokerError>;
}

#[async_trait]
impl<T: BrokerClient + ?Sized> BrokerClient for Arc<T> {
    async fn connect(&self, access_token: &str) -> Result<(), BrokerError> {
        (**self).connect(access_token).await
    }

    async fn disconnect(&self, access_token: &str) -> Result<(), BrokerError> {
        (**self).disconnect(access_token).await
    }
}

/// Token refresh failure.
///
/// `Clone` so that one outcome can be shared by every caller waiting on the
/// same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingToken,
    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Refresh transport error: {0}")]
    Transport(String),
    #[error("Refresh response could not be decoded: {0}")]
    Decode(String),
}

/// Exchanges a refresh token for a new access token.
///
/// The refresh token is not rotated.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns the new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError>;
}

#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for Arc<T> {
    async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError> {
        (**self).refresh(refresh_token).await
    }
}
