//! Maintrack realtime client core.
//!
//! This crate provides the session-side core for the maintrack
//! maintenance-approval backend: token lifecycle management, a resilient
//! WebSocket push channel and a reactive notification store.
//!
//! # Architecture
//!
//! The crate follows a single-owner state pattern:
//!
//! - **RealtimeSession** - Facade wiring the pieces together for UI callers
//! - **TokenLifecycleManager** - Owns the credential, single-flight renewal
//! - **ConnectionManager** - Owns the push channel and its state machine
//! - **NotificationStore** - Single writer of the notification list
//! - **ApiClient** - REST adapter for auth and acknowledgment traffic
//!
//! # Modules
//!
//! - [`session`] - Session facade
//! - [`token`] - Credential storage, expiry decoding, lifecycle manager
//! - [`channel`] - WebSocket connection manager and wire frames
//! - [`notifications`] - Notification records and store
//! - [`server`] - REST client and API types
//! - [`config`] - Runtime configuration

pub mod channel;
pub mod config;
pub mod constants;
pub mod events;
pub mod notifications;
pub mod server;
pub mod session;
pub mod token;

// Re-export commonly used types
pub use channel::{ConnectionManager, ConnectionState};
pub use config::Config;
pub use events::SessionEvent;
pub use notifications::{NotificationRecord, NotificationStore};
pub use server::{ApiClient, ApiError, AuthApi};
pub use token::{Credential, SessionUser, TokenLifecycleManager};

// Re-export the facade
pub use session::{RealtimeSession, SessionError};
