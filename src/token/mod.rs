//! Session credential storage and JWT expiry decoding.
//!
//! The [`TokenStore`] is the single owner of the access/refresh credential
//! pair. UI collaborators never mutate it directly; it changes only through
//! login, renewal and invalidation inside [`TokenLifecycleManager`].
//!
//! Expiry is always derived by decoding the access token's `exp` claim,
//! never supplied independently. A token that cannot be decoded is treated
//! as already expired (forcing renewal) rather than as a fatal error.

pub mod lifecycle;

pub use lifecycle::TokenLifecycleManager;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The access/refresh token pair with its derived expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// JWT presented on API calls and the channel handshake.
    pub access_token: String,
    /// Opaque token exchanged for a new access token on renewal.
    pub refresh_token: String,
    /// Expiry of `access_token` in epoch milliseconds, decoded from its
    /// `exp` claim. Zero when the token could not be decoded.
    pub expires_at_epoch_ms: i64,
}

impl Credential {
    /// Build a credential, deriving the expiry from the access token.
    ///
    /// A decode failure yields an expiry of 0 so the credential reads as
    /// expired and the next caller forces a renewal.
    pub fn from_tokens(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let expires_at_epoch_ms = decode_expiry_ms(&access_token).unwrap_or_else(|e| {
            log::warn!("access token undecodable, treating as expired: {e}");
            0
        });
        Self {
            access_token,
            refresh_token: refresh_token.into(),
            expires_at_epoch_ms,
        }
    }

    /// Milliseconds until expiry relative to `now_ms` (negative if past).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at_epoch_ms - now_ms
    }

    /// Whether the credential expires within `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.remaining_ms(epoch_ms_now()) < window.as_millis() as i64
    }
}

/// The authenticated user attached to the session at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Stable user identifier; targeted notifications are matched on it.
    pub id: String,
    /// Login name, echoed back to the server on logout.
    pub username: String,
}

/// Holder of the current credential and session user.
///
/// Pure data plus accessors; all mutation goes through the lifecycle
/// manager which replaces the credential atomically under its lock.
#[derive(Debug, Default)]
pub struct TokenStore {
    credential: Option<Credential>,
    user: Option<SessionUser>,
}

impl TokenStore {
    /// Current credential, if any.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Current session user, if any.
    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    /// Replace the credential. The previous value is dropped whole, so no
    /// intermediate state is ever observable.
    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    /// Attach the session user.
    pub fn set_user(&mut self, user: Option<SessionUser>) {
        self.user = user;
    }

    /// Drop credential and user.
    pub fn clear(&mut self) {
        self.credential = None;
        self.user = None;
    }
}

/// Errors from the token lifecycle.
///
/// Cloneable because a single renewal outcome fans out to every caller
/// awaiting the shared in-flight renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable refresh token exists. Fatal to the session.
    Expired,
    /// The remote rejected the renewal. Fatal to the session.
    RefreshRejected(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "session expired: no usable refresh token"),
            Self::RefreshRejected(msg) => write!(f, "token renewal rejected: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// JWT claims the client cares about. Signature verification is the
/// server's job; the client only reads scheduling metadata.
#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
    #[serde(default)]
    #[allow(dead_code, reason = "kept for diagnostics in debug logs")]
    sub: Option<String>,
}

/// Decode the `exp` claim of a JWT into epoch milliseconds.
pub fn decode_expiry_ms(token: &str) -> Result<i64, String> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| "token has no payload segment".to_string())?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| format!("payload is not base64url: {e}"))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| format!("payload is not claims JSON: {e}"))?;
    claims
        .exp
        .map(|exp| exp * 1000)
        .ok_or_else(|| "token has no exp claim".to_string())
}

/// Current wall clock in epoch milliseconds.
pub(crate) fn epoch_ms_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an unsigned JWT whose exp is `offset_secs` from now.
    fn make_jwt(offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + offset_secs;
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(format!(r#"{{"exp":{exp},"sub":"u-1"}}"#));
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn decodes_exp_claim() {
        let token = make_jwt(600);
        let exp_ms = decode_expiry_ms(&token).expect("decodable");
        let expected = (chrono::Utc::now().timestamp() + 600) * 1000;
        assert!((exp_ms - expected).abs() < 2000);
    }

    #[test]
    fn garbage_token_reads_as_expired() {
        assert!(decode_expiry_ms("not-a-jwt").is_err());
        let cred = Credential::from_tokens("not-a-jwt", "refresh");
        assert_eq!(cred.expires_at_epoch_ms, 0);
        assert!(cred.expires_within(Duration::from_secs(60)));
    }

    #[test]
    fn missing_exp_claim_is_an_error() {
        let header =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"sub":"u-1"}"#);
        assert!(decode_expiry_ms(&format!("{header}.{payload}.")).is_err());
    }

    #[test]
    fn expires_within_respects_buffer() {
        let fresh = Credential::from_tokens(make_jwt(3600), "refresh");
        assert!(!fresh.expires_within(Duration::from_secs(60)));
        assert!(fresh.expires_within(Duration::from_secs(7200)));

        let stale = Credential::from_tokens(make_jwt(30), "refresh");
        assert!(stale.expires_within(Duration::from_secs(60)));
    }

    #[test]
    fn store_replaces_credential_whole() {
        let mut store = TokenStore::default();
        assert!(store.credential().is_none());
        store.set_credential(Credential::from_tokens(make_jwt(100), "r1"));
        store.set_credential(Credential::from_tokens(make_jwt(200), "r2"));
        assert_eq!(
            store.credential().map(|c| c.refresh_token.as_str()),
            Some("r2")
        );
        store.clear();
        assert!(store.credential().is_none());
        assert!(store.user().is_none());
    }
}
