//! Broadcast + history feed of session events.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::session::{AttemptKind, AttemptOutcome, LinkStatus, SessionPhase};

/// Default number of events kept for late subscribers.
const HISTORY_EVENTS: usize = 256;

/// Something the coordinator did or observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Coordinator state changed.
    Phase { from: SessionPhase, to: SessionPhase },
    /// Realtime link state changed.
    Link { status: LinkStatus },
    /// A broker request finished and its result was applied.
    Attempt {
        kind: AttemptKind,
        outcome: AttemptOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A broker result arrived after the session it belonged to was gone.
    StaleAttempt { kind: AttemptKind },
    /// Access token replaced.
    TokenRefreshed,
    /// Refresh failed; the session stays logged in without a live link.
    RefreshFailed { reason: String },
    /// The credential store could not be read or written.
    StoreFailure { reason: String },
}

/// Event hub with broadcast and history support.
///
/// New subscribers get the retained history and then live events, so a
/// view mounted late still sees why the link is down.
pub struct EventHub {
    history: RwLock<VecDeque<SessionEvent>>,
    capacity: usize,
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    /// Create a hub with the default history size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_EVENTS)
    }

    /// Create a hub keeping at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(32))),
            capacity,
            sender,
        }
    }

    /// Publish an event to live listeners and history.
    pub fn push(&self, event: SessionEvent) {
        let _ = self.sender.send(event.clone()); // live listeners

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Get a receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Snapshot of retained events, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<SessionEvent> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Stream that yields history first, then live events.
    ///
    /// Events dropped by a lagging receiver are skipped.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
