//! Application-wide constants for maintrack.
//!
//! This module centralizes all magic numbers and configuration constants
//! to improve maintainability and discoverability. Constants are grouped
//! by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Token lifecycle**: Expiry buffers and proactive renewal scheduling
//! - **Push channel**: Heartbeat, reconnection and token-watch configuration

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to individual HTTP requests to the auth and notification
/// endpoints. 10 seconds is sufficient for most operations while
/// preventing indefinite hangs on network issues.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Token lifecycle
// ============================================================================

/// Expiry buffer applied when a caller asks for a valid credential.
///
/// A credential that expires within this window is treated as already
/// expired and renewed before it is handed out, so the caller never
/// receives a token that dies mid-request.
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// How often the proactive renewal task re-checks the credential.
pub const PROACTIVE_CHECK_INTERVAL: Duration = Duration::from_secs(120);

/// Remaining-lifetime threshold below which the proactive renewal task
/// renews the credential without waiting for a caller to hit the buffer.
pub const PROACTIVE_RENEW_THRESHOLD: Duration = Duration::from_secs(300);

// ============================================================================
// Push channel
// ============================================================================

/// Application-level heartbeat interval while the channel is connected.
///
/// The server expects a `{"action":"ping"}` frame at this cadence to keep
/// the connection registered. 30 seconds balances connection freshness
/// against network overhead.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Base delay for exponential reconnect backoff.
///
/// Attempt `n` waits `RECONNECT_BASE_DELAY * 2^(n-1)`, giving the
/// sequence 1s, 2s, 4s, 8s, 16s.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Maximum number of automatic reconnect attempts after an unexpected
/// close. Exceeding this leaves the channel down until an explicit
/// `connect()`.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// How often the connected channel re-checks the credential lifetime.
pub const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(120);

/// Remaining-lifetime threshold below which the channel closes and
/// reopens the socket with a freshly renewed credential. This must fire
/// before the token actually expires, otherwise the server would be left
/// holding an orphaned channel it cannot evict in time.
pub const RECONNECT_TOKEN_THRESHOLD: Duration = Duration::from_secs(300);
