//! Ordered, deduplicated notification store.
//!
//! The store is the single writer of notification records. It accepts
//! candidate frames from the connection manager and from the REST
//! backfill, classifies and deduplicates them, and exposes the result as
//! a reactive read-only view (newest first). Acknowledgment is
//! optimistic: the local mutation happens before the remote confirms,
//! and is rolled back to the exact prior state on failure.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use tokio::sync::watch;

use super::{NotificationRecord, NotifyError};
use crate::channel::frames::{NotificationFrame, OutboundAction};
use crate::channel::ActionSender;
use crate::server::NotificationApi;
use crate::token::epoch_ms_now;

/// A record removed optimistically, retaining everything needed to
/// reverse the exact prior state.
struct RemovedRecord {
    index: usize,
    record: NotificationRecord,
}

/// Reactive store of the session's notifications.
#[derive(Debug)]
pub struct NotificationStore {
    view: watch::Sender<Vec<NotificationRecord>>,
    session_user: RwLock<Option<String>>,
    /// Fallback id source for frames without a server id. Seeded from
    /// the wall clock in epoch milliseconds so locally assigned ids sit
    /// far above server-assigned sequence numbers; a later
    /// server-assigned id for the same logical event would still slip
    /// past dedup, which is a documented limitation of this policy.
    local_id: AtomicI64,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (view, _) = watch::channel(Vec::new());
        Self {
            view,
            session_user: RwLock::new(None),
            local_id: AtomicI64::new(epoch_ms_now()),
        }
    }

    /// Set (or clear) the session user targeted notifications must match.
    pub fn set_session_user(&self, user_id: Option<String>) {
        *self
            .session_user
            .write()
            .expect("session user lock poisoned") = user_id;
    }

    /// Reactive read-only view, newest first.
    pub fn subscribe(&self) -> watch::Receiver<Vec<NotificationRecord>> {
        self.view.subscribe()
    }

    /// Current snapshot of the view.
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.view.borrow().clone()
    }

    /// Number of unread notifications currently held.
    pub fn unread_count(&self) -> usize {
        self.view.borrow().iter().filter(|n| !n.is_read).count()
    }

    /// Classify and merge one candidate frame.
    ///
    /// Returns whether the frame was accepted. Discards are silent by
    /// design: a targeted notification for another user or a duplicate
    /// id is expected traffic, not an error.
    pub fn ingest(&self, frame: NotificationFrame) -> bool {
        if !frame.broadcast {
            let session_user = self
                .session_user
                .read()
                .expect("session user lock poisoned");
            let matches = matches!(
                (session_user.as_deref(), frame.user_id.as_deref()),
                (Some(session), Some(recipient)) if session == recipient
            );
            if !matches {
                log::trace!("targeted notification for another user discarded");
                return false;
            }
        }

        let id = frame.id.unwrap_or_else(|| self.next_local_id());
        self.view.send_if_modified(|list| {
            if list.iter().any(|n| n.id == id) {
                log::trace!("duplicate notification {id} discarded");
                return false;
            }
            list.insert(0, NotificationRecord::from_frame(frame, id));
            true
        })
    }

    /// Drop all records, e.g. on logout.
    pub fn clear(&self) {
        self.view.send_if_modified(|list| {
            if list.is_empty() {
                return false;
            }
            list.clear();
            true
        });
    }

    /// Acknowledge a notification as read, optimistically.
    ///
    /// The record leaves the unread view immediately, then the
    /// acknowledgment is sent over the channel (fire-and-forget) and
    /// confirmed via REST. A remote failure restores the record at its
    /// exact prior position and surfaces [`NotifyError::MarkReadSyncFailed`].
    ///
    /// # Errors
    ///
    /// [`NotifyError::InvalidNotificationId`] if `id` is not in the
    /// store; no network call is made in that case.
    pub async fn mark_read(
        &self,
        id: i64,
        api: &NotificationApi,
        channel: &ActionSender,
    ) -> Result<(), NotifyError> {
        let removed = self
            .take(id)
            .ok_or(NotifyError::InvalidNotificationId(id))?;

        channel.send(OutboundAction::MarkRead {
            notification_id: id,
        });

        match api.mark_read(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("mark-read for {id} rejected, rolling back: {e}");
                self.restore(removed);
                Err(NotifyError::MarkReadSyncFailed(e.to_string()))
            }
        }
    }

    fn take(&self, id: i64) -> Option<RemovedRecord> {
        let mut removed = None;
        self.view.send_if_modified(|list| {
            match list.iter().position(|n| n.id == id) {
                Some(index) => {
                    removed = Some(RemovedRecord {
                        index,
                        record: list.remove(index),
                    });
                    true
                }
                None => false,
            }
        });
        removed
    }

    fn restore(&self, removed: RemovedRecord) {
        self.view.send_if_modified(|list| {
            // A replayed frame can re-ingest the id while the confirm is
            // in flight (the item is still unread server-side); inserting
            // the removed copy on top would duplicate the id.
            if list.iter().any(|n| n.id == removed.record.id) {
                log::debug!("rollback of {} skipped, record re-ingested", removed.record.id);
                return false;
            }
            let index = removed.index.min(list.len());
            list.insert(index, removed.record);
            true
        });
    }

    fn next_local_id(&self) -> i64 {
        self.local_id.fetch_add(1, Ordering::SeqCst)
    }
}
