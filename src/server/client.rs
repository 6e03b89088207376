//! HTTP client for the maintrack REST API.
//!
//! [`ApiClient`] implements the [`AuthApi`] trait over `reqwest`.
//! [`NotificationApi`] layers credential acquisition on top: every
//! protected request first asks the lifecycle manager for a currently
//! valid credential, so API traffic and the push channel share one
//! renewal path.

use async_trait::async_trait;
use std::sync::Arc;

use super::types::{
    AuthResponse, LoginRequest, LogoutRequest, MarkReadRequest, RefreshRequest, UnreadResponse,
};
use super::ApiError;
use crate::channel::frames::NotificationFrame;
use crate::constants;
use crate::token::TokenLifecycleManager;

/// Remote auth and notification operations the core consumes.
///
/// Protected operations take the access token explicitly; the caller
/// decides how to obtain a valid one (see [`NotificationApi`]).
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange username/password for a credential pair.
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;

    /// Invalidate the session server-side.
    async fn logout(&self, username: &str) -> Result<(), ApiError>;

    /// Fetch the unread notification backlog for the session user.
    async fn unread_notifications(
        &self,
        access_token: &str,
    ) -> Result<Vec<NotificationFrame>, ApiError>;

    /// Acknowledge a notification as read.
    async fn mark_read(&self, access_token: &str, id: i64) -> Result<(), ApiError>;
}

/// API client for the maintrack REST backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
}

impl ApiClient {
    /// Creates a new API client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    /// Creates an API client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    /// Returns the API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn post_auth(&self, path: &str, body: &impl serde::Serialize) -> Result<AuthResponse, ApiError> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let auth: AuthResponse = response.json().await?;
        if auth.success {
            Ok(auth)
        } else {
            Err(ApiError::Rejected(format!("{path} refused by server")))
        }
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.post_auth("/auth/login", &LoginRequest { username, password })
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        self.post_auth("/auth/refresh", &RefreshRequest { refresh_token })
            .await
    }

    async fn logout(&self, username: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/logout", self.api_url))
            .json(&LogoutRequest { username })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status(status.as_u16()))
        }
    }

    async fn unread_notifications(
        &self,
        access_token: &str,
    ) -> Result<Vec<NotificationFrame>, ApiError> {
        let response = self
            .client
            .get(format!("{}/notifications/unread", self.api_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let unread: UnreadResponse = response.json().await?;
        Ok(unread.notifications)
    }

    async fn mark_read(&self, access_token: &str, id: i64) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/notifications/mark-read", self.api_url))
            .bearer_auth(access_token)
            .json(&MarkReadRequest { id })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status(status.as_u16()))
        }
    }
}

/// Notification endpoints with automatic credential acquisition.
///
/// Each call asks the lifecycle manager for a valid credential first, so
/// concurrent API calls and channel (re)connects collapse onto the same
/// single-flight renewal.
#[derive(Clone)]
pub struct NotificationApi {
    api: Arc<dyn AuthApi>,
    tokens: TokenLifecycleManager,
}

impl std::fmt::Debug for NotificationApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationApi").finish_non_exhaustive()
    }
}

impl NotificationApi {
    /// Wrap an API backend with credential acquisition.
    pub fn new(api: Arc<dyn AuthApi>, tokens: TokenLifecycleManager) -> Self {
        Self { api, tokens }
    }

    /// Fetch the unread backlog with a valid credential.
    pub async fn unread(&self) -> Result<Vec<NotificationFrame>, ApiError> {
        let cred = self.tokens.valid_credential().await?;
        self.api.unread_notifications(&cred.access_token).await
    }

    /// Acknowledge a notification as read with a valid credential.
    pub async fn mark_read(&self, id: i64) -> Result<(), ApiError> {
        let cred = self.tokens.valid_credential().await?;
        self.api.mark_read(&cred.access_token, id).await
    }
}
