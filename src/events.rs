//! Session-level events surfaced to UI collaborators.
//!
//! Transient conditions (individual reconnect attempts, heartbeat traffic)
//! are absorbed into state transitions and log lines; only terminal or
//! user-actionable conditions are broadcast here.

use tokio::sync::broadcast;

/// Capacity of the session event channel. Events are small and consumers
/// are expected to drain promptly; lagging receivers skip old events.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Terminal or user-actionable session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session credential could not be renewed. The session is over;
    /// the UI must redirect to login.
    SessionExpired,
    /// Automatic reconnection gave up after the configured number of
    /// attempts. The channel stays down until an explicit `connect()`.
    ConnectionExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
    /// The remote rejected a mark-read acknowledgment; the local change
    /// was rolled back. Recoverable, surfaced as a toast.
    MarkReadFailed {
        /// Id of the notification whose acknowledgment failed.
        id: i64,
    },
}

/// Create the session event channel.
pub fn channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
