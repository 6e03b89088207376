//! Token lifecycle management with single-flight renewal.
//!
//! [`TokenLifecycleManager`] wraps the [`TokenStore`] and guarantees at
//! most one renewal request in flight regardless of how many callers ask
//! for a valid credential at once: the first caller installs a shared
//! in-flight future, every concurrent caller attaches to it, and all of
//! them resolve to the same outcome.
//!
//! A proactive background task renews the credential ahead of expiry so
//! steady-state sessions never pay the renewal latency on a request path.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{epoch_ms_now, AuthError, Credential, SessionUser, TokenStore};
use crate::constants;
use crate::events::SessionEvent;
use crate::server::AuthApi;

type RenewalFuture = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

/// Shared manager of the session credential.
///
/// Cheap to clone; all clones observe the same store.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<Inner>,
    expiry_buffer: Duration,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: Mutex<TokenStore>,
    in_flight: Mutex<Option<RenewalFuture>>,
    renew_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on invalidation so a renewal racing a logout cannot
    /// resurrect a cleared credential.
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("expiry_buffer", &self.expiry_buffer)
            .finish_non_exhaustive()
    }
}

impl TokenLifecycleManager {
    /// Create a manager over the given backend.
    pub fn new(api: Arc<dyn AuthApi>, events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store: Mutex::new(TokenStore::default()),
                in_flight: Mutex::new(None),
                renew_task: Mutex::new(None),
                generation: AtomicU64::new(0),
                events,
            }),
            expiry_buffer: constants::TOKEN_EXPIRY_BUFFER,
        }
    }

    /// Override the on-demand expiry buffer (default 60s).
    #[must_use]
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Store a freshly issued credential pair, e.g. after login.
    pub fn adopt(&self, access_token: &str, refresh_token: &str, user: Option<SessionUser>) {
        let cred = Credential::from_tokens(access_token, refresh_token);
        let mut store = self.inner.store.lock().expect("token store lock poisoned");
        store.set_credential(cred);
        if user.is_some() {
            store.set_user(user);
        }
    }

    /// Current credential without any freshness guarantee.
    pub fn current(&self) -> Option<Credential> {
        self.inner
            .store
            .lock()
            .expect("token store lock poisoned")
            .credential()
            .cloned()
    }

    /// The session user attached at login.
    pub fn session_user(&self) -> Option<SessionUser> {
        self.inner
            .store
            .lock()
            .expect("token store lock poisoned")
            .user()
            .cloned()
    }

    /// Milliseconds until the current credential expires. `None` when no
    /// credential is held.
    pub fn remaining_ms(&self) -> Option<i64> {
        self.current().map(|c| c.remaining_ms(epoch_ms_now()))
    }

    /// Get a currently valid credential, renewing if it expires within
    /// the configured buffer.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError`] if no refresh token exists or renewal is
    /// rejected; every caller waiting on the same in-flight renewal gets
    /// the identical failure.
    pub async fn valid_credential(&self) -> Result<Credential, AuthError> {
        self.renew_if_expiring(self.expiry_buffer).await
    }

    /// Get a credential valid for at least `threshold`, renewing through
    /// the single-flight path if necessary.
    pub async fn renew_if_expiring(&self, threshold: Duration) -> Result<Credential, AuthError> {
        if let Some(cred) = self.fresh_credential(threshold) {
            return Ok(cred);
        }

        let fut = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .expect("in-flight lock poisoned");
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fut: RenewalFuture = async move {
                        let result = Inner::renew(&inner).await;
                        // Clearing here (not in the awaiters) keeps the
                        // slot occupied for exactly the lifetime of the
                        // request, so a late joiner can never race a
                        // second renewal into flight.
                        *inner.in_flight.lock().expect("in-flight lock poisoned") = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        fut.await
    }

    /// Start the proactive renewal timer.
    ///
    /// Every `check_interval` the task renews the credential if it
    /// expires within `renew_threshold`. Calling this again replaces the
    /// previous timer rather than stacking a second one. An explicit
    /// "reset after renewal" is unnecessary: each tick re-reads the
    /// stored expiry, so a renewal from any path pushes the next renewal
    /// out automatically.
    pub fn start_proactive_renewal(&self, check_interval: Duration, renew_threshold: Duration) {
        let mut slot = self
            .inner
            .renew_task
            .lock()
            .expect("renew task lock poisoned");
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let mgr = self.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately; skip the zeroth tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if mgr.current().is_none() {
                    // Logged out (or never logged in). The channel's own
                    // token watch handles its side; nothing to renew.
                    continue;
                }
                match mgr.renew_if_expiring(renew_threshold).await {
                    Ok(cred) => {
                        log::debug!(
                            "proactive check: credential valid for {}s",
                            cred.remaining_ms(epoch_ms_now()) / 1000
                        );
                    }
                    Err(e) => {
                        log::warn!("proactive renewal failed, session over: {e}");
                        return;
                    }
                }
            }
        }));
    }

    /// Stop the proactive renewal timer if running.
    pub fn stop_proactive_renewal(&self) {
        if let Some(task) = self
            .inner
            .renew_task
            .lock()
            .expect("renew task lock poisoned")
            .take()
        {
            task.abort();
        }
    }

    /// Clear the credential and stop the proactive timer.
    ///
    /// Used on logout and on unrecoverable renewal failure.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    fn fresh_credential(&self, threshold: Duration) -> Option<Credential> {
        self.inner
            .store
            .lock()
            .expect("token store lock poisoned")
            .credential()
            .filter(|c| !c.expires_within(threshold))
            .cloned()
    }
}

impl Inner {
    async fn renew(inner: &Arc<Self>) -> Result<Credential, AuthError> {
        let generation = inner.generation.load(Ordering::Acquire);
        let refresh_token = {
            let store = inner.store.lock().expect("token store lock poisoned");
            match store.credential() {
                Some(c) => c.refresh_token.clone(),
                None => return Err(AuthError::Expired),
            }
        };

        log::debug!("renewing access token");
        match inner.api.refresh(&refresh_token).await {
            Ok(resp) => {
                let cred = Credential::from_tokens(
                    resp.access_token,
                    resp.refresh_token.unwrap_or(refresh_token),
                );
                let mut store = inner.store.lock().expect("token store lock poisoned");
                if inner.generation.load(Ordering::Acquire) != generation {
                    // Invalidated while the request was in flight; do not
                    // resurrect the session.
                    return Err(AuthError::Expired);
                }
                store.set_credential(cred.clone());
                log::info!(
                    "access token renewed, valid for {}s",
                    cred.remaining_ms(epoch_ms_now()) / 1000
                );
                Ok(cred)
            }
            Err(e) => {
                log::warn!("token renewal rejected: {e}");
                inner.invalidate();
                let _ = inner.events.send(SessionEvent::SessionExpired);
                Err(AuthError::RefreshRejected(e.to_string()))
            }
        }
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store
            .lock()
            .expect("token store lock poisoned")
            .clear();
        if let Some(task) = self
            .renew_task
            .lock()
            .expect("renew task lock poisoned")
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::frames::NotificationFrame;
    use crate::server::{ApiError, AuthResponse};
    use async_trait::async_trait;
    use base64::Engine as _;
    use std::sync::atomic::AtomicUsize;

    fn make_jwt(offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + offset_secs;
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(format!(r#"{{"exp":{exp},"sub":"u-1"}}"#));
        format!("{header}.{payload}.sig")
    }

    struct MockApi {
        refresh_calls: AtomicUsize,
        fail_refresh: bool,
        refresh_delay: Duration,
    }

    impl MockApi {
        fn new(fail_refresh: bool) -> Arc<Self> {
            Arc::new(Self {
                refresh_calls: AtomicUsize::new(0),
                fail_refresh,
                refresh_delay: Duration::from_millis(50),
            })
        }

        fn refresh_count(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthApi for MockApi {
        async fn login(&self, _u: &str, _p: &str) -> Result<AuthResponse, ApiError> {
            unimplemented!("not exercised here")
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<AuthResponse, ApiError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.refresh_delay).await;
            if self.fail_refresh {
                Err(ApiError::Status(401))
            } else {
                Ok(AuthResponse {
                    success: true,
                    access_token: make_jwt(3600),
                    refresh_token: None,
                    data: None,
                })
            }
        }

        async fn logout(&self, _u: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn unread_notifications(
            &self,
            _t: &str,
        ) -> Result<Vec<NotificationFrame>, ApiError> {
            Ok(Vec::new())
        }

        async fn mark_read(&self, _t: &str, _id: i64) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn manager(api: Arc<MockApi>) -> TokenLifecycleManager {
        TokenLifecycleManager::new(api, crate::events::channel())
    }

    #[tokio::test]
    async fn fresh_credential_is_returned_without_renewal() {
        let api = MockApi::new(false);
        let mgr = manager(Arc::clone(&api));
        mgr.adopt(&make_jwt(3600), "refresh-1", None);

        let cred = mgr.valid_credential().await.expect("valid");
        assert_eq!(api.refresh_count(), 0);
        assert_eq!(cred.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_renewal() {
        let api = MockApi::new(false);
        let mgr = manager(Arc::clone(&api));
        // Expires inside the 60s buffer, so every caller wants a renewal.
        mgr.adopt(&make_jwt(10), "refresh-1", None);

        let (a, b, c, d, e) = tokio::join!(
            mgr.valid_credential(),
            mgr.valid_credential(),
            mgr.valid_credential(),
            mgr.valid_credential(),
            mgr.valid_credential(),
        );

        assert_eq!(api.refresh_count(), 1, "single-flight renewal");
        let token = a.expect("renewed").access_token;
        for result in [b, c, d, e] {
            assert_eq!(result.expect("renewed").access_token, token);
        }
    }

    #[tokio::test]
    async fn renewal_failure_reaches_every_waiter_and_clears_session() {
        let api = MockApi::new(true);
        let events = crate::events::channel();
        let mut event_rx = events.subscribe();
        let mgr = TokenLifecycleManager::new(Arc::clone(&api) as Arc<dyn AuthApi>, events);
        mgr.adopt(&make_jwt(10), "refresh-1", None);

        let (a, b, c) = tokio::join!(
            mgr.valid_credential(),
            mgr.valid_credential(),
            mgr.valid_credential(),
        );

        assert_eq!(api.refresh_count(), 1);
        for result in [a, b, c] {
            assert!(matches!(result, Err(AuthError::RefreshRejected(_))));
        }
        assert!(mgr.current().is_none(), "credential cleared on failure");
        assert_eq!(event_rx.recv().await, Ok(SessionEvent::SessionExpired));
    }

    #[tokio::test]
    async fn missing_credential_is_auth_expired() {
        let mgr = manager(MockApi::new(false));
        assert_eq!(mgr.valid_credential().await, Err(AuthError::Expired));
    }

    #[tokio::test]
    async fn proactive_timer_renews_ahead_of_expiry() {
        let api = MockApi::new(false);
        let mgr = manager(Arc::clone(&api));
        mgr.adopt(&make_jwt(120), "refresh-1", None);

        // Threshold of 300s means the 120s credential is due immediately.
        mgr.start_proactive_renewal(Duration::from_millis(20), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(api.refresh_count() >= 1);
        let remaining = mgr.remaining_ms().expect("credential held");
        assert!(remaining > 300_000, "credential was replaced with a fresh one");
        mgr.stop_proactive_renewal();
    }

    #[tokio::test]
    async fn restarting_the_timer_replaces_it() {
        let api = MockApi::new(false);
        let mgr = manager(Arc::clone(&api));
        mgr.adopt(&make_jwt(120), "refresh-1", None);

        mgr.start_proactive_renewal(Duration::from_millis(20), Duration::from_secs(300));
        // Replaced before the first tick fires; the long interval never fires.
        mgr.start_proactive_renewal(Duration::from_secs(3600), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(api.refresh_count(), 0, "previous timer was cancelled, not stacked");
        mgr.stop_proactive_renewal();
    }

    #[tokio::test]
    async fn invalidate_clears_credential_and_stops_timer() {
        let api = MockApi::new(false);
        let mgr = manager(Arc::clone(&api));
        mgr.adopt(&make_jwt(120), "refresh-1", None);
        mgr.start_proactive_renewal(Duration::from_millis(20), Duration::from_secs(300));

        mgr.invalidate();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(mgr.current().is_none());
        assert_eq!(api.refresh_count(), 0, "no renewal after invalidation");
    }
}
