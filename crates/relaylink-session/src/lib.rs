//! Session coordination and credential storage for the relay dashboard.
//!
//! Provides:
//! - `SessionCoordinator` - login, logout, startup restore and refresh-and-retry
//! - `RefreshGate` - single-flight token refresh
//! - Storage implementations (memory, file)

pub mod coordinator;
pub mod refresh;
pub mod storage;

pub use coordinator::{SessionCoordinator, SessionError};
pub use refresh::RefreshGate;
