//! Resilient push channel to the notification endpoint.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager
//!     ├── WebSocket connection (tokio-tungstenite)
//!     ├── Heartbeat (application-level ping every 30s)
//!     ├── Reconnection (capped exponential backoff)
//!     └── Token watch (proactive reconnect before credential expiry)
//! ```
//!
//! The connection runs as a single spawned task driving a
//! `tokio::select!` loop; every state change goes through the
//! [`ConnectionState`] watch channel so UI collaborators observe a
//! consistent, reactive view and never touch the socket directly.

pub mod connection;
pub mod frames;

pub use connection::{ActionSender, ConnectionManager};
pub use frames::{ControlFrame, ControlKind, InboundFrame, NotificationFrame, OutboundAction};

/// Connection state for the push channel.
///
/// Exactly one value at a time; transitions are driven solely by the
/// connection task's event handlers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Last attempt failed. Transient while automatic retries remain
    /// (the channel settles to `Disconnected` once they are exhausted);
    /// terminal when no credential can be produced for the handshake.
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Errors that can occur during channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection.
    ConnectionFailed(String),
    /// Failed to send a frame.
    SendFailed(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            Self::SendFailed(msg) => write!(f, "send failed: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}
