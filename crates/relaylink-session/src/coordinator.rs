//! Session coordinator: login, logout, startup restore and refresh-and-retry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relaylink_core::{
    AttemptKind, AttemptOutcome, BrokerClient, BrokerError, ConnectionAttempt, CredentialStore,
    EventHub, LinkStatus, LoginGrant, Navigation, Profile, RefreshError, RouteGuard, Session,
    SessionEvent, SessionPhase, SessionSnapshot, StoreError, StoreKey, TokenRefresher,
    session::SESSION_FLAG_SET,
};
use tokio::task::JoinHandle;

use crate::refresh::RefreshGate;

/// Session coordinator error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Access token must not be empty")]
    EmptyAccessToken,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What to do after a connect result has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Done,
    /// Refresh the access token, then retry the connect once.
    Refresh,
    /// Rejected again after a refresh; stop.
    GiveUp,
    /// The rejected token was already replaced; connect with this one.
    Reconnect(String),
}

/// Transition function for a settled connect attempt.
pub(crate) const fn next_step(outcome: AttemptOutcome, may_refresh: bool) -> Step {
    match outcome {
        AttemptOutcome::Unauthorized if may_refresh => Step::Refresh,
        AttemptOutcome::Unauthorized => Step::GiveUp,
        AttemptOutcome::Ok | AttemptOutcome::Error | AttemptOutcome::Pending => Step::Done,
    }
}

struct Inner {
    phase: SessionPhase,
    /// Bumped on every login, restore and logout. Network results issued
    /// under an older epoch are dropped.
    epoch: u64,
    session: Session,
    link: LinkStatus,
    /// Token of the connect in flight or of the live link.
    link_token: Option<String>,
}

/// Owns the login session and keeps the realtime link in step with it.
///
/// This is the only writer of the credential store's session keys. State
/// changes happen synchronously inside each operation; the network tail
/// runs on a spawned task whose handle is returned.
pub struct SessionCoordinator<S, B, R>
where
    S: CredentialStore,
    B: BrokerClient,
    R: TokenRefresher,
{
    store: S,
    broker: B,
    refresh: RefreshGate<R>,
    inner: Mutex<Inner>,
    events: EventHub,
}

impl<S, B, R> SessionCoordinator<S, B, R>
where
    S: CredentialStore + 'static,
    B: BrokerClient + 'static,
    R: TokenRefresher + 'static,
{
    /// Create a logged-out coordinator. Call [`Self::restore`] at startup.
    #[must_use]
    pub fn new(store: S, broker: B, refresher: R) -> Arc<Self> {
        Arc::new(Self {
            store,
            broker,
            refresh: RefreshGate::new(refresher),
            inner: Mutex::new(Inner {
                phase: SessionPhase::LoggedOut,
                epoch: 0,
                session: Session::default(),
                link: LinkStatus::Down,
                link_token: None,
            }),
            events: EventHub::new(),
        })
    }

    /// Current session, phase and link status.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            phase: inner.phase,
            link: inner.link,
            session: inner.session.clone(),
        }
    }

    /// The predicate the router gates authenticated views on.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.lock().session.is_logged_in
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn link(&self) -> LinkStatus {
        self.lock().link
    }

    /// Resolve a navigation request against the current login state.
    #[must_use]
    pub fn navigate(&self, path: &str) -> Navigation {
        RouteGuard::resolve(path, self.is_logged_in())
    }

    /// Session event feed.
    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Restore a persisted session at startup.
    ///
    /// The stored flag is trusted without asking the backend. Returns the
    /// startup connect task, or `None` when there was nothing to restore.
    pub fn restore(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut inner = self.lock();
        if inner.phase != SessionPhase::LoggedOut {
            tracing::debug!(phase = %inner.phase, "restore skipped, session already active");
            return None;
        }

        match self.store.session_flag() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                self.store_failure("restore", &e);
                return None;
            }
        }

        self.transition(&mut inner, SessionPhase::Restoring);

        let access_token = match self.store.get(StoreKey::AccessToken) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                self.store_failure("restore", &e);
                self.transition(&mut inner, SessionPhase::LoggedOut);
                return None;
            }
        };

        let Some(access_token) = access_token else {
            tracing::warn!("Session flag set without an access token, discarding persisted session");
            if let Err(e) = self.persist_session(&Session::default()) {
                self.store_failure("restore", &e);
            }
            self.transition(&mut inner, SessionPhase::LoggedOut);
            return None;
        };

        let refresh_token = self.store.get(StoreKey::RefreshToken).unwrap_or_else(|e| {
            self.store_failure("restore", &e);
            None
        });

        inner.epoch += 1;
        inner.session = Session::logged_in(access_token.clone(), refresh_token);
        self.transition(&mut inner, SessionPhase::LoggedIn);
        tracing::info!("Restored persisted session");

        let epoch = inner.epoch;
        self.begin_connect(&mut inner, &access_token);
        drop(inner);

        Some(self.spawn_connect(epoch, access_token))
    }

    /// Log in with tokens obtained by the login view.
    ///
    /// Replaces any current session. Returns the connect task. Profile
    /// fields are cached best-effort once the session keys are stored.
    ///
    /// # Errors
    /// Returns error if the access token is empty or the store rejects a
    /// session key; the coordinator state is unchanged in that case.
    pub fn login(self: &Arc<Self>, grant: LoginGrant) -> Result<JoinHandle<()>, SessionError> {
        if grant.access_token.trim().is_empty() {
            return Err(SessionError::EmptyAccessToken);
        }

        let mut inner = self.lock();
        let session = Session::logged_in(grant.access_token.clone(), Some(grant.refresh_token.clone()));

        if let Err(e) = self.persist_session(&session) {
            self.store_failure("login", &e);
            if let Err(rollback) = self.persist_session(&inner.session) {
                self.store_failure("login rollback", &rollback);
            }
            return Err(e.into());
        }
        if let Some(profile) = &grant.profile {
            if let Err(e) = self.persist_profile(profile) {
                self.store_failure("login profile", &e);
            }
        }

        inner.epoch += 1;
        inner.session = session;
        inner.link_token = None;
        self.set_link(&mut inner, LinkStatus::Down);
        self.transition(&mut inner, SessionPhase::LoggedIn);
        tracing::info!("Logged in");

        let epoch = inner.epoch;
        self.begin_connect(&mut inner, &grant.access_token);
        drop(inner);

        Ok(self.spawn_connect(epoch, grant.access_token))
    }

    /// Open the realtime link with the current access token.
    ///
    /// Returns `Ok(None)` when a connect with the same token is already in
    /// flight, the link is already up, or a refresh is under way (its retry
    /// reconnects).
    ///
    /// # Errors
    /// Returns error if not logged in.
    pub fn connect(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, SessionError> {
        let mut inner = self.lock();
        if !inner.session.is_logged_in {
            return Err(SessionError::NotLoggedIn);
        }
        let Some(token) = inner.session.access_token.clone() else {
            return Err(SessionError::NotLoggedIn);
        };
        if inner.phase == SessionPhase::Refreshing {
            tracing::debug!("Connect skipped, refresh in progress");
            return Ok(None);
        }

        if !self.begin_connect(&mut inner, &token) {
            return Ok(None);
        }
        let epoch = inner.epoch;
        drop(inner);

        Ok(Some(self.spawn_connect(epoch, token)))
    }

    /// Log out.
    ///
    /// Local state and the persisted session are cleared immediately, even
    /// if the store or the disconnect request fails. Returns the disconnect
    /// task, or `None` when already logged out.
    pub fn logout(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::LoggedOut {
            return None;
        }

        let token = inner.session.access_token.take();

        inner.epoch += 1;
        inner.session = Session::default();
        inner.link_token = None;
        self.set_link(&mut inner, LinkStatus::Down);

        if let Err(e) = self.persist_session(&Session::default()) {
            self.store_failure("logout", &e);
        }
        self.transition(&mut inner, SessionPhase::LoggedOut);
        tracing::info!("Logged out");
        drop(inner);

        let token = token?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            this.run_disconnect(token).await;
        }))
    }

    /// Cached profile fields. Advisory: views may read these at any time.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub fn profile(&self) -> Result<Profile, SessionError> {
        let mut failure = None;
        let profile = Profile::from_lookup(|key| {
            self.store.get(key).unwrap_or_else(|e| {
                failure.get_or_insert(e);
                None
            })
        });
        failure.map_or(Ok(profile), |e| Err(e.into()))
    }

    /// Persist profile fields after a profile edit. Absent fields are left as they are.
    ///
    /// # Errors
    /// Returns error if not logged in or the store rejects a write.
    pub fn update_profile(&self, profile: &Profile) -> Result<(), SessionError> {
        let inner = self.lock();
        if !inner.session.is_logged_in {
            return Err(SessionError::NotLoggedIn);
        }
        self.persist_profile(profile)?;
        drop(inner);
        Ok(())
    }

    fn spawn_connect(self: &Arc<Self>, epoch: u64, token: String) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive_connect(epoch, token).await })
    }

    /// Connect, and on rejection refresh once and retry once.
    async fn drive_connect(&self, epoch: u64, mut token: String) {
        let mut may_refresh = true;
        loop {
            let mut attempt = ConnectionAttempt::new(AttemptKind::Connect, token);
            tracing::debug!(attempt = %attempt.id, "Connecting realtime link");
            let result = self.broker.connect(&attempt.token).await;
            attempt.resolve(&result);

            match self.settle(epoch, &attempt, &result, may_refresh) {
                Some(Step::Refresh) => {
                    let Some(next) = self.recover(epoch).await else {
                        return;
                    };
                    token = next;
                    may_refresh = false;
                }
                Some(Step::Reconnect(current)) => token = current,
                Some(Step::Done | Step::GiveUp) | None => return,
            }
        }
    }

    /// Close the link of a session that has already been cleared. The
    /// outcome is only recorded.
    async fn run_disconnect(&self, token: String) {
        let mut attempt = ConnectionAttempt::new(AttemptKind::Disconnect, token);
        tracing::debug!(attempt = %attempt.id, "Disconnecting realtime link");
        let result = self.broker.disconnect(&attempt.token).await;
        attempt.resolve(&result);

        let message = result.as_ref().err().map(ToString::to_string);
        match &message {
            None => tracing::info!(attempt = %attempt.id, "Realtime link disconnected"),
            Some(err) => tracing::warn!(attempt = %attempt.id, "Disconnect after logout failed: {err}"),
        }
        self.events.push(SessionEvent::Attempt {
            kind: attempt.kind,
            outcome: attempt.outcome,
            message,
        });
    }

    /// Apply a connect result. Returns `None` when the attempt is stale.
    fn settle(
        &self,
        epoch: u64,
        attempt: &ConnectionAttempt,
        result: &Result<(), BrokerError>,
        may_refresh: bool,
    ) -> Option<Step> {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!(
                attempt = %attempt.id,
                outcome = ?attempt.outcome,
                "Dropping result from a previous session"
            );
            self.events.push(SessionEvent::StaleAttempt { kind: attempt.kind });
            return None;
        }

        let message = result.as_ref().err().map(ToString::to_string);
        self.events.push(SessionEvent::Attempt {
            kind: attempt.kind,
            outcome: attempt.outcome,
            message: message.clone(),
        });

        let rejected = attempt.outcome == AttemptOutcome::Unauthorized;
        if rejected && inner.session.access_token.as_deref() != Some(attempt.token.as_str()) {
            tracing::debug!(attempt = %attempt.id, "Rejected token was already replaced");
            return Some(self.reconnect_current(&mut inner));
        }

        let owns_link = inner.link_token.as_deref() == Some(attempt.token.as_str());
        let step = next_step(attempt.outcome, may_refresh);

        match attempt.outcome {
            AttemptOutcome::Ok => {
                tracing::info!(attempt = %attempt.id, "Realtime link connected");
                if owns_link {
                    self.set_link(&mut inner, LinkStatus::Up);
                }
            }
            AttemptOutcome::Error => {
                tracing::warn!(attempt = %attempt.id, "Connect failed: {}", message.unwrap_or_default());
                if owns_link {
                    inner.link_token = None;
                    self.set_link(&mut inner, LinkStatus::Down);
                }
            }
            AttemptOutcome::Unauthorized if step == Step::GiveUp => {
                tracing::warn!(attempt = %attempt.id, "Broker rejected the refreshed token");
                if owns_link {
                    self.set_link(&mut inner, LinkStatus::Degraded);
                }
            }
            AttemptOutcome::Unauthorized => {
                tracing::info!(attempt = %attempt.id, "Access token rejected, refreshing");
                if owns_link {
                    self.set_link(&mut inner, LinkStatus::Down);
                }
                self.transition(&mut inner, SessionPhase::Refreshing);
            }
            AttemptOutcome::Pending => {}
        }

        Some(step)
    }

    /// Follow up a rejection of a token that has since been replaced. A
    /// refresh in progress reconnects on its own.
    fn reconnect_current(&self, inner: &mut Inner) -> Step {
        if inner.phase == SessionPhase::Refreshing {
            return Step::Done;
        }
        match inner.session.access_token.clone() {
            Some(token) if self.begin_connect(inner, &token) => Step::Reconnect(token),
            _ => Step::Done,
        }
    }

    /// Refresh the access token. Returns the token to retry the connect
    /// with, unless a connect with it is already under way.
    async fn recover(&self, epoch: u64) -> Option<String> {
        let refresh_token = self.lock().session.refresh_token.clone();
        let result = match refresh_token {
            Some(refresh_token) => self.refresh.refresh(&refresh_token).await,
            None => Err(RefreshError::MissingToken),
        };

        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!("Dropping refresh result from a previous session");
            return None;
        }

        match result {
            Ok(access_token) => {
                if let Err(e) = self.store.set(StoreKey::AccessToken, &access_token) {
                    self.store_failure("refresh", &e);
                }
                inner.session.access_token = Some(access_token.clone());
                self.events.push(SessionEvent::TokenRefreshed);
                self.transition(&mut inner, SessionPhase::LoggedIn);
                tracing::info!("Access token refreshed");

                self.begin_connect(&mut inner, &access_token).then_some(access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, realtime link stays down: {e}");
                self.events.push(SessionEvent::RefreshFailed {
                    reason: e.to_string(),
                });
                self.transition(&mut inner, SessionPhase::LoggedIn);
                if inner.link != LinkStatus::Up {
                    self.set_link(&mut inner, LinkStatus::Degraded);
                }
                None
            }
        }
    }

    /// Mark a connect with `token` as in flight unless one already is or
    /// the link is already up with it.
    fn begin_connect(&self, inner: &mut Inner, token: &str) -> bool {
        let busy = matches!(inner.link, LinkStatus::Connecting | LinkStatus::Up);
        if busy && inner.link_token.as_deref() == Some(token) {
            tracing::debug!(link = %inner.link, "Connect skipped, link already active for this token");
            return false;
        }
        inner.link_token = Some(token.to_owned());
        self.set_link(inner, LinkStatus::Connecting);
        true
    }

    /// Write or clear the session keys. The flag is written last and
    /// cleared first, so it never outlives the tokens.
    fn persist_session(&self, session: &Session) -> Result<(), StoreError> {
        if !session.is_logged_in {
            self.store.clear(StoreKey::SessionFlag)?;
            self.store.clear(StoreKey::AccessToken)?;
            return self.store.clear(StoreKey::RefreshToken);
        }

        match &session.access_token {
            Some(token) => self.store.set(StoreKey::AccessToken, token)?,
            None => self.store.clear(StoreKey::AccessToken)?,
        }
        match &session.refresh_token {
            Some(token) => self.store.set(StoreKey::RefreshToken, token)?,
            None => self.store.clear(StoreKey::RefreshToken)?,
        }
        self.store.set(StoreKey::SessionFlag, SESSION_FLAG_SET)
    }

    fn persist_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        for (key, value) in profile.fields() {
            if let Some(value) = value {
                self.store.set(key, value)?;
            }
        }
        Ok(())
    }

    fn transition(&self, inner: &mut Inner, to: SessionPhase) {
        let from = inner.phase;
        if from == to {
            return;
        }
        inner.phase = to;
        inner.session.is_logged_in = to.is_logged_in();
        tracing::debug!(%from, %to, "Session phase changed");
        self.events.push(SessionEvent::Phase { from, to });
    }

    fn set_link(&self, inner: &mut Inner, status: LinkStatus) {
        if inner.link == status {
            return;
        }
        inner.link = status;
        self.events.push(SessionEvent::Link { status });
    }

    fn store_failure(&self, action: &str, err: &StoreError) {
        tracing::error!(action, "Credential store failure: {err}");
        self.events.push(SessionEvent::StoreFailure {
            reason: format!("{action}: {err}"),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
