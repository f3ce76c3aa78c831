//! Single-flight token refresh.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use relaylink_core::{RefreshError, TokenRefresher};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

struct InFlight {
    id: u64,
    future: RefreshFuture,
}

#[derive(Default)]
struct Flights {
    next_id: u64,
    by_token: HashMap<String, InFlight>,
}

/// Deduplicates refresh requests per refresh token.
///
/// While a refresh for a token is running, every other caller asking for
/// the same token awaits that request's outcome instead of sending its own.
/// Once it completes, the next caller starts a fresh request.
pub struct RefreshGate<R> {
    refresher: Arc<R>,
    flights: Mutex<Flights>,
}

impl<R> RefreshGate<R>
where
    R: TokenRefresher + 'static,
{
    /// Wrap a refresher.
    #[must_use]
    pub fn new(refresher: R) -> Self {
        Self {
            refresher: Arc::new(refresher),
            flights: Mutex::new(Flights::default()),
        }
    }

    /// Refresh `refresh_token`, joining a request already in flight for it.
    ///
    /// # Errors
    /// Returns the shared [`RefreshError`] when the request fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError> {
        let (id, future) = self.join_or_start(refresh_token);
        let result = future.await;

        let mut flights = self.flights();
        if flights
            .by_token
            .get(refresh_token)
            .is_some_and(|flight| flight.id == id)
        {
            flights.by_token.remove(refresh_token);
        }

        result
    }

    /// Number of refresh requests currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights().by_token.len()
    }

    fn join_or_start(&self, refresh_token: &str) -> (u64, RefreshFuture) {
        let mut flights = self.flights();
        if let Some(flight) = flights.by_token.get(refresh_token) {
            tracing::debug!(flight = flight.id, "joining refresh already in flight");
            return (flight.id, flight.future.clone());
        }

        let id = flights.next_id;
        flights.next_id = flights.next_id.wrapping_add(1);

        let refresher = Arc::clone(&self.refresher);
        let token = refresh_token.to_owned();
        let future = async move { refresher.refresh(&token).await }
            .boxed()
            .shared();

        tracing::debug!(flight = id, "starting token refresh");
        flights.by_token.insert(
            refresh_token.to_owned(),
            InFlight {
                id,
                future: future.clone(),
            },
        );

        (id, future)
    }

    fn flights(&self) -> MutexGuard<'_, Flights> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    /// Refresher that blocks until released and counts requests.
    struct HeldRefresher {
        calls: AtomicUsize,
        release: Notify,
        result: Result<String, RefreshError>,
    }

    impl HeldRefresher {
        fn new(result: Result<String, RefreshError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
                result,
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for HeldRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<String, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_request() {
        let refresher = Arc::new(HeldRefresher::new(Ok("B".into())));
        let gate = Arc::new(RefreshGate::new(Arc::clone(&refresher)));

        let first = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.refresh("R").await }
        });
        let second = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.refresh("R").await }
        });

        while refresher.calls.load(Ordering::SeqCst) == 0 || gate.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        // Give the second caller a chance to join before releasing.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        refresher.release.notify_one();

        assert_eq!(first.await.unwrap(), Ok("B".into()));
        assert_eq!(second.await.unwrap(), Ok("B".into()));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_is_shared_and_not_cached() {
        let refresher = Arc::new(HeldRefresher::new(Err(RefreshError::Rejected {
            status: 403,
            message: "refresh token expired".into(),
        })));
        let gate = RefreshGate::new(Arc::clone(&refresher));

        refresher.release.notify_one();
        let err = gate.refresh("R").await.unwrap_err();
        assert!(matches!(err, RefreshError::Rejected { status: 403, .. }));

        refresher.release.notify_one();
        assert!(gate.refresh("R").await.is_err());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_tokens_do_not_share() {
        let refresher = Arc::new(HeldRefresher::new(Ok("B".into())));
        let gate = Arc::new(RefreshGate::new(Arc::clone(&refresher)));

        let first = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.refresh("R1").await }
        });
        let second = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.refresh("R2").await }
        });

        while refresher.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        refresher.release.notify_waiters();

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }
}
