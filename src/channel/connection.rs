//! Push-channel connection manager.
//!
//! Owns the WebSocket to the notification endpoint and drives the
//! connect / heartbeat / reconnect state machine from a single spawned
//! task. Credentials come from the [`TokenLifecycleManager`] on every
//! (re)connect attempt, so channel handshakes share the single-flight
//! renewal with ordinary API calls.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
};

use super::frames::{self, ControlKind, InboundFrame, OutboundAction};
use super::{ChannelError, ConnectionState};
use crate::config::Config;
use crate::events::SessionEvent;
use crate::notifications::NotificationStore;
use crate::token::TokenLifecycleManager;

/// Concrete WebSocket stream type.
type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;

/// Capacity of the outbound action queue. Actions are tiny and
/// fire-and-forget; overflow while offline is silently dropped.
const ACTION_QUEUE_CAPACITY: usize = 32;

/// Backoff delay before reconnect attempt `attempt` (1-based).
///
/// `base * 2^(attempt-1)`: with the default 1s base the sequence is
/// 1s, 2s, 4s, 8s, 16s.
pub fn reconnect_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(1 << (attempt.saturating_sub(1)))
}

/// Cloneable handle for sending fire-and-forget actions through the
/// channel without holding a reference to the manager.
#[derive(Clone, Debug)]
pub struct ActionSender {
    tx: mpsc::Sender<OutboundAction>,
}

impl ActionSender {
    /// Queue an action for the connected socket. Dropped silently when
    /// the channel is down or the queue is full.
    pub fn send(&self, action: OutboundAction) {
        if let Err(e) = self.tx.try_send(action) {
            log::debug!("channel action dropped: {e}");
        }
    }
}

/// Everything the connection task needs, bundled so the loop functions
/// stay readable.
struct ConnCtx {
    cfg: Config,
    tokens: TokenLifecycleManager,
    store: Arc<NotificationStore>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Sender<ConnectionState>,
    actions: Arc<AsyncMutex<mpsc::Receiver<OutboundAction>>>,
    manual_disconnect: Arc<AtomicBool>,
}

/// Owner of the push-channel socket and its state machine.
pub struct ConnectionManager {
    cfg: Config,
    tokens: TokenLifecycleManager,
    store: Arc<NotificationStore>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Sender<ConnectionState>,
    action_tx: mpsc::Sender<OutboundAction>,
    action_rx: Arc<AsyncMutex<mpsc::Receiver<OutboundAction>>>,
    manual_disconnect: Arc<AtomicBool>,
    shutdown: StdMutex<Option<oneshot::Sender<()>>>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("ws_url", &self.cfg.ws_url)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager. No connection is attempted until [`connect`].
    ///
    /// [`connect`]: ConnectionManager::connect
    pub fn new(
        cfg: Config,
        tokens: TokenLifecycleManager,
        store: Arc<NotificationStore>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            cfg,
            tokens,
            store,
            events,
            state,
            action_tx,
            action_rx: Arc::new(AsyncMutex::new(action_rx)),
            manual_disconnect: Arc::new(AtomicBool::new(false)),
            shutdown: StdMutex::new(None),
            task: StdMutex::new(None),
        }
    }

    /// Reactive view of the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current connection state snapshot.
    pub fn current_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Handle for queueing outbound actions.
    pub fn actions(&self) -> ActionSender {
        ActionSender {
            tx: self.action_tx.clone(),
        }
    }

    /// Open the channel.
    ///
    /// Idempotent: calling while already connecting or connected is a
    /// no-op. Clears the manual-disconnect flag set by [`disconnect`].
    ///
    /// [`disconnect`]: ConnectionManager::disconnect
    pub fn connect(&self) {
        let mut task = self.task.lock().expect("connection task lock poisoned");
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            log::debug!("channel already connecting or connected");
            return;
        }

        self.manual_disconnect.store(false, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(shutdown_tx);

        let ctx = ConnCtx {
            cfg: self.cfg.clone(),
            tokens: self.tokens.clone(),
            store: Arc::clone(&self.store),
            events: self.events.clone(),
            state: self.state.clone(),
            actions: Arc::clone(&self.action_rx),
            manual_disconnect: Arc::clone(&self.manual_disconnect),
        };
        *task = Some(tokio::spawn(run_connection_loop(ctx, shutdown_rx)));
    }

    /// Close the channel and stay down.
    ///
    /// Sets the manual-disconnect flag (cleared only by the next
    /// [`connect`]), cancels any pending reconnect backoff, closes the
    /// socket with a normal status code and transitions to
    /// `Disconnected`.
    ///
    /// [`connect`]: ConnectionManager::connect
    pub fn disconnect(&self) {
        self.manual_disconnect.store(true, Ordering::SeqCst);
        if let Some(tx) = self
            .shutdown
            .lock()
            .expect("shutdown lock poisoned")
            .take()
        {
            let _ = tx.send(());
        }

        let task = self.task.lock().expect("connection task lock poisoned");
        if !task.as_ref().is_some_and(|t| !t.is_finished()) {
            // No live task to perform the transition for us.
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// Why the message loop returned.
enum LoopExit {
    /// Caller-initiated shutdown; terminal.
    Shutdown,
    /// Credential approaching expiry; reconnect immediately with a
    /// fresh one, no backoff and no attempt charged.
    TokenRefresh,
    /// Credential already expired or gone; terminal for this session.
    TokenDead,
    /// Unexpected close or socket error; subject to backoff.
    Remote(String),
}

async fn run_connection_loop(ctx: ConnCtx, mut shutdown_rx: oneshot::Receiver<()>) {
    let mut attempt: u32 = 0;
    // Set after a proactive rotate: the credential that triggered the
    // rotation still clears the ordinary buffer, so the reconnect must
    // renew against the rotation threshold or it would reuse the token
    // it just closed over.
    let mut rotate_threshold: Option<Duration> = None;

    loop {
        // A disconnect() can land between the backoff select and here;
        // acquiring a credential for a session being torn down would
        // misreport the teardown as an auth error.
        if ctx.manual_disconnect.load(Ordering::SeqCst) {
            ctx.state.send_replace(ConnectionState::Disconnected);
            return;
        }

        ctx.state.send_replace(ConnectionState::Connecting);

        let acquired = match rotate_threshold.take() {
            Some(threshold) => ctx.tokens.renew_if_expiring(threshold).await,
            None => ctx.tokens.valid_credential().await,
        };
        let cred = match acquired {
            Ok(c) => c,
            Err(e) => {
                // No retry: the user must re-authenticate.
                log::warn!("cannot open notification channel: {e}");
                ctx.state.send_replace(ConnectionState::Error(e.to_string()));
                return;
            }
        };

        let connected = tokio::select! {
            result = connect_socket(&ctx.cfg.ws_url, &cred.access_token) => result,
            _ = &mut shutdown_rx => {
                ctx.state.send_replace(ConnectionState::Disconnected);
                return;
            }
        };

        match connected {
            Ok(ws) => {
                log::info!("notification channel connected");
                ctx.state.send_replace(ConnectionState::Connected);
                attempt = 0;

                match run_message_loop(&ctx, ws, &mut shutdown_rx).await {
                    LoopExit::Shutdown => {
                        ctx.state.send_replace(ConnectionState::Disconnected);
                        return;
                    }
                    LoopExit::TokenRefresh => {
                        log::info!("reconnecting channel with renewed credential");
                        rotate_threshold = Some(ctx.cfg.reconnect_token_threshold());
                        continue;
                    }
                    LoopExit::TokenDead => {
                        log::warn!("credential expired, closing notification channel");
                        ctx.state.send_replace(ConnectionState::Disconnected);
                        return;
                    }
                    LoopExit::Remote(reason) => {
                        log::warn!("notification channel lost: {reason}");
                        // Error while retries remain; the exhaustion and
                        // manual-disconnect checks below settle the
                        // terminal state.
                        ctx.state.send_replace(ConnectionState::Error(reason));
                    }
                }
            }
            Err(e) => {
                log::warn!("notification channel connect failed: {e}");
                ctx.state.send_replace(ConnectionState::Error(e.to_string()));
            }
        }

        if ctx.manual_disconnect.load(Ordering::SeqCst) {
            ctx.state.send_replace(ConnectionState::Disconnected);
            return;
        }

        attempt += 1;
        if attempt > ctx.cfg.max_reconnect_attempts {
            log::error!(
                "giving up after {} reconnect attempts",
                ctx.cfg.max_reconnect_attempts
            );
            let _ = ctx.events.send(SessionEvent::ConnectionExhausted {
                attempts: ctx.cfg.max_reconnect_attempts,
            });
            ctx.state.send_replace(ConnectionState::Disconnected);
            return;
        }

        let delay = reconnect_delay(attempt, ctx.cfg.reconnect_base_delay());
        log::info!(
            "reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            ctx.cfg.max_reconnect_attempts
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                log::debug!("shutdown during reconnect backoff");
                ctx.state.send_replace(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

/// Open the socket with the credential embedded in the handshake.
///
/// JWTs are base64url plus dots, which are query-safe, so the token is
/// appended without further encoding.
async fn connect_socket(ws_url: &str, access_token: &str) -> Result<WsStream, ChannelError> {
    let url = format!("{ws_url}?token={access_token}");
    let request = url
        .into_client_request()
        .map_err(|e| ChannelError::ConnectionFailed(format!("invalid URL: {e}")))?;

    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
    Ok(ws)
}

async fn run_message_loop(
    ctx: &ConnCtx,
    ws: WsStream,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> LoopExit {
    let (mut write, mut read) = ws.split();

    // Only one connection task exists at a time (connect() is
    // idempotent), so this lock is uncontended.
    let mut actions = ctx.actions.lock().await;
    // Actions queued while offline belong to a dead session; drop them.
    while actions.try_recv().is_ok() {}

    let mut heartbeat = tokio::time::interval(ctx.cfg.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await; // intervals fire immediately; skip the zeroth tick

    let mut token_check = tokio::time::interval(ctx.cfg.token_check_interval());
    token_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    token_check.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                log::trace!("heartbeat ping");
                if let Err(e) = send_action(&mut write, &OutboundAction::Ping).await {
                    return LoopExit::Remote(format!("heartbeat send failed: {e}"));
                }
            }

            _ = token_check.tick() => {
                match check_token(ctx).await {
                    TokenVerdict::Healthy => {}
                    TokenVerdict::RefreshNow => {
                        let _ = write
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "token refresh".into(),
                            })))
                            .await;
                        return LoopExit::TokenRefresh;
                    }
                    TokenVerdict::Dead => {
                        let _ = write
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "token expired".into(),
                            })))
                            .await;
                        return LoopExit::TokenDead;
                    }
                }
            }

            Some(action) = actions.recv() => {
                if let Err(e) = send_action(&mut write, &action).await {
                    return LoopExit::Remote(format!("action send failed: {e}"));
                }
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(ctx, &text, &mut write).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    // Protocol-level ping; the JSON `ping` control frame is
                    // handled in handle_frame.
                    if write.send(Message::Pong(payload)).await.is_err() {
                        return LoopExit::Remote("pong send failed".into());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return LoopExit::Remote(match frame {
                        Some(f) => format!("closed by server: {} {}", f.code, f.reason),
                        None => "closed by server".into(),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LoopExit::Remote(e.to_string()),
                None => return LoopExit::Remote("stream ended".into()),
            },

            _ = &mut *shutdown_rx => {
                let _ = write
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    })))
                    .await;
                return LoopExit::Shutdown;
            }
        }
    }
}

enum TokenVerdict {
    Healthy,
    RefreshNow,
    Dead,
}

/// Periodic credential check while connected.
///
/// Reconnecting *before* expiry matters: a mid-session expiry would
/// orphan the channel without the server evicting it in time. An already
/// expired (or missing) credential cannot be trusted, so that case tears
/// the channel down instead.
async fn check_token(ctx: &ConnCtx) -> TokenVerdict {
    let threshold_ms = ctx.cfg.reconnect_token_threshold_ms as i64;
    match ctx.tokens.remaining_ms() {
        None => {
            log::warn!("credential gone, disconnecting channel");
            TokenVerdict::Dead
        }
        Some(ms) if ms <= 0 => TokenVerdict::Dead,
        Some(ms) if ms < threshold_ms => {
            log::info!("credential expires in {}s, rotating channel", ms / 1000);
            TokenVerdict::RefreshNow
        }
        Some(ms) => {
            log::debug!("credential valid for another {}s", ms / 1000);
            TokenVerdict::Healthy
        }
    }
}

async fn send_action(write: &mut WsWriter, action: &OutboundAction) -> Result<(), ChannelError> {
    let text = serde_json::to_string(action).expect("actions are serializable");
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))
}

/// Classify and dispatch one inbound text frame.
async fn handle_frame(ctx: &ConnCtx, text: &str, write: &mut WsWriter) {
    match frames::parse_inbound(text) {
        Ok(InboundFrame::Control(control)) => match control.kind {
            ControlKind::Connected => {
                log::info!(
                    "channel acknowledged: {}",
                    control.message.as_deref().unwrap_or("connected")
                );
            }
            ControlKind::Pong => log::trace!("heartbeat acknowledged"),
            ControlKind::Ping => {
                // Server-initiated heartbeat wants an immediate answer.
                if let Err(e) = send_action(write, &OutboundAction::Ping).await {
                    log::warn!("ping reply failed: {e}");
                }
            }
            ControlKind::MarkReadAck => {
                log::debug!(
                    "mark-read acknowledged for {:?} (success: {:?})",
                    control.notification_id,
                    control.success
                );
            }
        },
        Ok(InboundFrame::Notification(frame)) => {
            if ctx.store.ingest(frame) {
                log::debug!("notification accepted into store");
            }
        }
        Err(e) => {
            // Malformed frames are logged and dropped, never fatal.
            log::warn!("malformed channel frame dropped: {e}");
        }
    }
}

/// Detached action queue for store-level tests.
#[cfg(test)]
pub(crate) fn action_sender_for_tests() -> (ActionSender, mpsc::Receiver<OutboundAction>) {
    let (tx, rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
    (ActionSender { tx }, rx)
}
