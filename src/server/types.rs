//! Wire payload types for the REST endpoints.

use serde::{Deserialize, Serialize};

use crate::channel::frames::NotificationFrame;
use crate::token::SessionUser;

/// Body of `POST /auth/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    /// Login name.
    pub username: &'a str,
    /// Plaintext password (the transport is TLS).
    pub password: &'a str,
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    /// The refresh token issued at login.
    pub refresh_token: &'a str,
}

/// Body of `POST /auth/logout`.
#[derive(Debug, Serialize)]
pub struct LogoutRequest<'a> {
    /// Login name of the user ending the session.
    pub username: &'a str,
}

/// Body of `POST /notifications/mark-read`.
#[derive(Debug, Serialize)]
pub struct MarkReadRequest {
    /// Id of the notification being acknowledged.
    pub id: i64,
}

/// Credential-bearing response from login and refresh.
///
/// Refresh responses omit `refresh_token` and `data`; the client keeps
/// the values it already holds in that case.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Whether the operation was accepted.
    pub success: bool,
    /// New access token.
    pub access_token: String,
    /// New refresh token (login only).
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Authenticated user (login only).
    #[serde(default)]
    pub data: Option<SessionUser>,
}

/// Envelope of `GET /notifications/unread`.
#[derive(Debug, Deserialize)]
pub struct UnreadResponse {
    /// Unread notifications for the session user, oldest first.
    pub notifications: Vec<NotificationFrame>,
}
