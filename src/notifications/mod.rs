//! Notification records and the reactive notification store.

pub mod store;

pub use store::NotificationStore;

use chrono::{DateTime, Utc};

use crate::channel::frames::{NotificationFrame, NotificationKind};

/// A notification held by the store.
///
/// `id` is unique within the store; `is_read` changes only through the
/// optimistic-acknowledge protocol in [`NotificationStore::mark_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Unique id (server-assigned, or local fallback for id-less frames).
    pub id: i64,
    /// Recipient user id for targeted notifications.
    pub recipient_id: Option<String>,
    /// Whether this was addressed to every connected session.
    pub is_broadcast: bool,
    /// Severity.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Whether the recipient has read it.
    pub is_read: bool,
}

impl NotificationRecord {
    /// Build a record from a wire frame with its final id.
    pub(crate) fn from_frame(frame: NotificationFrame, id: i64) -> Self {
        Self {
            id,
            recipient_id: frame.user_id,
            is_broadcast: frame.broadcast,
            kind: frame.kind,
            title: frame.title,
            message: frame.message,
            timestamp: frame.timestamp,
            is_read: frame.is_read,
        }
    }
}

/// Errors from notification actions.
#[derive(Debug)]
pub enum NotifyError {
    /// The caller passed an id that is not in the store. Recoverable.
    InvalidNotificationId(i64),
    /// The remote rejected the read acknowledgment; the local change was
    /// rolled back. Recoverable.
    MarkReadSyncFailed(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNotificationId(id) => write!(f, "unknown notification id {id}"),
            Self::MarkReadSyncFailed(msg) => write!(f, "mark-read not confirmed: {msg}"),
        }
    }
}

impl std::error::Error for NotifyError {}
