//! Core abstractions for the relay dashboard session client.
//!
//! This crate provides the fundamental building blocks:
//! - `Session`, `Profile`, `LoginGrant` - the persisted session model
//! - `ConnectionAttempt` - one broker connect or disconnect in flight
//! - `CredentialStore`, `BrokerClient`, `TokenRefresher` traits
//! - `RouteGuard` - login-gated navigation decisions
//! - `EventHub` - broadcast + history of session events

pub mod events;
pub mod route;
pub mod session;
pub mod traits;

pub use events::{EventHub, SessionEvent};
pub use route::{Navigation, Route, RouteGuard};
pub use session::{
    AttemptKind, AttemptOutcome, ConnectionAttempt, LinkStatus, LoginGrant, Profile, Session,
    SessionPhase, SessionSnapshot, StoreKey,
};
pub use traits::{BrokerClient, BrokerError, CredentialStore, RefreshError, StoreError, TokenRefresher};
