//! Session facade wiring the token lifecycle, push channel and
//! notification store together.
//!
//! UI collaborators hold a [`RealtimeSession`] and interact only through
//! its reactive views and actions; they never touch the socket or the
//! credential directly.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::channel::{ConnectionManager, ConnectionState};
use crate::config::Config;
use crate::events::{self, SessionEvent};
use crate::notifications::{NotificationRecord, NotificationStore, NotifyError};
use crate::server::{ApiClient, ApiError, AuthApi, NotificationApi};
use crate::token::{SessionUser, TokenLifecycleManager};

/// Errors from session-level operations.
#[derive(Debug)]
pub enum SessionError {
    /// A REST call failed.
    Api(ApiError),
    /// The login response was accepted but missing the refresh token or
    /// user payload the session needs.
    IncompleteLogin,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api(e) => write!(f, "{e}"),
            Self::IncompleteLogin => write!(f, "login response missing credential or user data"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

/// A user session with its realtime notification channel.
pub struct RealtimeSession {
    cfg: Config,
    api: Arc<dyn AuthApi>,
    tokens: TokenLifecycleManager,
    notify_api: NotificationApi,
    store: Arc<NotificationStore>,
    connection: ConnectionManager,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("api_url", &self.cfg.api_url)
            .field("ws_url", &self.cfg.ws_url)
            .finish_non_exhaustive()
    }
}

impl RealtimeSession {
    /// Create a session against the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(cfg: Config) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::new(cfg.api_url.clone())?);
        Ok(Self::with_api(cfg, api))
    }

    /// Create a session over a custom backend, e.g. a mock in tests.
    pub fn with_api(cfg: Config, api: Arc<dyn AuthApi>) -> Self {
        let events = events::channel();
        let tokens = TokenLifecycleManager::new(Arc::clone(&api), events.clone())
            .with_expiry_buffer(cfg.token_expiry_buffer());
        let store = Arc::new(NotificationStore::new());
        let connection = ConnectionManager::new(
            cfg.clone(),
            tokens.clone(),
            Arc::clone(&store),
            events.clone(),
        );
        let notify_api = NotificationApi::new(Arc::clone(&api), tokens.clone());
        Self {
            cfg,
            api,
            tokens,
            notify_api,
            store,
            connection,
            events,
        }
    }

    /// Authenticate, backfill unread notifications and open the channel.
    ///
    /// # Errors
    ///
    /// Fails if the login call is rejected or the response is missing
    /// the credential pair or user payload. A failed backfill is logged
    /// and skipped; the channel still opens.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionUser, SessionError> {
        let resp = self.api.login(username, password).await?;
        let refresh_token = resp.refresh_token.ok_or(SessionError::IncompleteLogin)?;
        let user = resp.data.ok_or(SessionError::IncompleteLogin)?;

        self.tokens
            .adopt(&resp.access_token, &refresh_token, Some(user.clone()));
        self.store.set_session_user(Some(user.id.clone()));
        self.tokens.start_proactive_renewal(
            self.cfg.proactive_check_interval(),
            self.cfg.proactive_renew_threshold(),
        );

        self.backfill_unread().await;
        self.connection.connect();

        log::info!("session opened for {}", user.username);
        Ok(user)
    }

    /// End the session: close the channel, invalidate the credential
    /// server-side (best effort) and clear all local state.
    pub async fn logout(&self) {
        let username = self.tokens.session_user().map(|u| u.username);
        self.connection.disconnect();
        if let Some(username) = username {
            if let Err(e) = self.api.logout(&username).await {
                // Local teardown proceeds regardless.
                log::warn!("server-side logout failed: {e}");
            }
        }
        self.tokens.invalidate();
        self.store.set_session_user(None);
        self.store.clear();
        log::info!("session closed");
    }

    /// One-time fetch of the unread backlog, merged through the same
    /// classification/dedup path as live frames.
    async fn backfill_unread(&self) {
        match self.notify_api.unread().await {
            Ok(frames) => {
                let mut accepted = 0usize;
                for frame in frames {
                    if self.store.ingest(frame) {
                        accepted += 1;
                    }
                }
                log::info!("backfilled {accepted} unread notifications");
            }
            Err(e) => log::warn!("unread backfill failed: {e}"),
        }
    }

    /// Open the push channel (no-op when already connecting/connected).
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Close the push channel until the next explicit [`connect`].
    ///
    /// [`connect`]: RealtimeSession::connect
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Acknowledge a notification as read (optimistic with rollback).
    ///
    /// # Errors
    ///
    /// See [`NotificationStore::mark_read`].
    pub async fn mark_read(&self, id: i64) -> Result<(), NotifyError> {
        let result = self
            .store
            .mark_read(id, &self.notify_api, &self.connection.actions())
            .await;
        if matches!(result, Err(NotifyError::MarkReadSyncFailed(_))) {
            let _ = self.events.send(SessionEvent::MarkReadFailed { id });
        }
        result
    }

    /// Reactive notification list, newest first.
    pub fn notifications(&self) -> watch::Receiver<Vec<NotificationRecord>> {
        self.store.subscribe()
    }

    /// Reactive connection state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state()
    }

    /// Number of unread notifications currently held.
    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    /// Terminal session events (forced logout, exhausted reconnects,
    /// failed acknowledgments).
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The authenticated user, if logged in.
    pub fn user(&self) -> Option<SessionUser> {
        self.tokens.session_user()
    }

    /// The token lifecycle manager backing this session.
    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }
}
