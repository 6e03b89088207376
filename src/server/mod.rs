//! REST backend surface.
//!
//! The core never talks to the network directly for auth or acknowledgment
//! traffic; it goes through the [`AuthApi`] trait so tests can substitute a
//! mock backend. [`ApiClient`] is the production `reqwest` implementation.
//!
//! Consumed operations:
//!
//! - `POST /auth/login {username, password}` → credential-bearing payload
//! - `POST /auth/refresh {refresh_token}` → credential-bearing payload
//! - `POST /auth/logout {username}`
//! - `GET /notifications/unread` → unread notification list
//! - `POST /notifications/mark-read {id}`

pub mod client;
pub mod types;

pub use client::{ApiClient, AuthApi, NotificationApi};
pub use types::{AuthResponse, UnreadResponse};

use crate::token::AuthError;

/// Errors from REST calls.
#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure (DNS, TLS, timeout, connection refused).
    Transport(String),
    /// Non-success HTTP status.
    Status(u16),
    /// Response body could not be decoded.
    Decode(String),
    /// The server answered but rejected the operation (`success: false`).
    Rejected(String),
    /// A valid credential could not be produced for the request.
    Auth(AuthError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Status(code) => write!(f, "server returned status {code}"),
            Self::Decode(msg) => write!(f, "invalid response body: {msg}"),
            Self::Rejected(msg) => write!(f, "request rejected: {msg}"),
            Self::Auth(e) => write!(f, "authentication failed: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
