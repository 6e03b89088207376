//! Wire frames for the notification channel.
//!
//! Every inbound text frame is either a control frame (connection
//! bookkeeping, heartbeat, acknowledgment echoes) or a notification
//! frame. Classification is structural: control frames carry a `type`
//! drawn from a closed set, notification frames carry the notification
//! body with its own `type` (severity) field, so an untagged enum
//! resolves them unambiguously.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Control frame discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Server-side handshake confirmation.
    Connected,
    /// Reply to our application heartbeat.
    Pong,
    /// Server-initiated heartbeat; we must answer immediately.
    Ping,
    /// Echo of a mark-read action.
    MarkReadAck,
}

/// Connection bookkeeping frame, consumed by the connection manager and
/// never forwarded to the notification store.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlFrame {
    /// Frame discriminator.
    #[serde(rename = "type")]
    pub kind: ControlKind,
    /// Optional human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
    /// Optional server timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Notification id for acknowledgment echoes.
    #[serde(default)]
    pub notification_id: Option<i64>,
    /// Whether the acknowledged action succeeded.
    #[serde(default)]
    pub success: Option<bool>,
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Informational.
    Info,
    /// Successful operation.
    Success,
    /// Needs attention.
    Warning,
    /// Failed operation.
    Error,
}

/// Notification payload as it appears on the wire (push frame and REST
/// backfill share this shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFrame {
    /// Server-assigned id. Absent on some legacy producers; the store
    /// assigns a local fallback id in that case.
    #[serde(default)]
    pub id: Option<i64>,
    /// Recipient user id for targeted notifications.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Creation time, ISO-8601.
    pub timestamp: DateTime<Utc>,
    /// Whether the recipient has already read it.
    #[serde(default)]
    pub is_read: bool,
    /// Whether this is addressed to every connected session.
    #[serde(default)]
    pub broadcast: bool,
}

/// Inbound frame after classification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    /// Connection bookkeeping.
    Control(ControlFrame),
    /// A notification for the store.
    Notification(NotificationFrame),
}

/// Parse an inbound text frame.
///
/// # Errors
///
/// Returns the serde error for unparseable payloads; callers log and
/// drop these (a malformed frame is never fatal).
pub fn parse_inbound(text: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(text)
}

/// Action sent to the server over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    /// Application heartbeat (also the reply to a server `ping`).
    Ping,
    /// Fire-and-forget read acknowledgment.
    MarkRead {
        /// Id of the notification being acknowledged.
        notification_id: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_frames() {
        let frame = parse_inbound(r#"{"type":"connected","message":"ready"}"#).expect("parses");
        let InboundFrame::Control(c) = frame else {
            panic!("expected control frame");
        };
        assert_eq!(c.kind, ControlKind::Connected);
        assert_eq!(c.message.as_deref(), Some("ready"));

        let frame = parse_inbound(
            r#"{"type":"mark_read_ack","notification_id":7,"success":true}"#,
        )
        .expect("parses");
        let InboundFrame::Control(c) = frame else {
            panic!("expected control frame");
        };
        assert_eq!(c.kind, ControlKind::MarkReadAck);
        assert_eq!(c.notification_id, Some(7));
    }

    #[test]
    fn parses_notification_frames() {
        let frame = parse_inbound(
            r#"{"id":42,"user_id":"u-1","title":"Equipment approved",
                "message":"EQ-0042 was approved","type":"success",
                "timestamp":"2026-08-20T10:15:00Z","is_read":false,"broadcast":false}"#,
        )
        .expect("parses");
        let InboundFrame::Notification(n) = frame else {
            panic!("expected notification frame");
        };
        assert_eq!(n.id, Some(42));
        assert_eq!(n.kind, NotificationKind::Success);
        assert!(!n.broadcast);
    }

    #[test]
    fn severity_does_not_collide_with_control_types() {
        // "type":"info" must never be read as a control frame even though
        // both shapes discriminate on the same key.
        let frame = parse_inbound(
            r#"{"title":"Maintenance window","message":"Tonight 22:00","type":"info",
                "timestamp":"2026-08-20T10:15:00Z","broadcast":true}"#,
        )
        .expect("parses");
        assert!(matches!(frame, InboundFrame::Notification(_)));
    }

    #[test]
    fn malformed_frames_are_errors_not_panics() {
        assert!(parse_inbound("{not json").is_err());
        assert!(parse_inbound(r#"{"type":"shrug"}"#).is_err());
        assert!(parse_inbound(r#"{"title":"no body"}"#).is_err());
    }

    #[test]
    fn outbound_actions_serialize_to_the_wire_shape() {
        assert_eq!(
            serde_json::to_string(&OutboundAction::Ping).expect("serializable"),
            r#"{"action":"ping"}"#
        );
        assert_eq!(
            serde_json::to_string(&OutboundAction::MarkRead { notification_id: 9 })
                .expect("serializable"),
            r#"{"action":"mark_read","notification_id":9}"#
        );
    }
}
