//! Runtime configuration for the maintrack client.
//!
//! All intervals default to the values in [`crate::constants`] but can be
//! overridden, which the integration tests rely on to run the channel
//! state machine with millisecond timings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;

/// Configuration for a maintrack session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Base URL of the REST API (e.g. `https://maintrack.example.com/api`).
    pub api_url: String,
    /// WebSocket URL of the notification channel
    /// (e.g. `wss://maintrack.example.com/ws/notifications`).
    pub ws_url: String,
    /// Buffer before expiry at which a credential is renewed on demand.
    #[serde(default = "default_token_expiry_buffer_ms")]
    pub token_expiry_buffer_ms: u64,
    /// Proactive renewal task check interval.
    #[serde(default = "default_proactive_check_interval_ms")]
    pub proactive_check_interval_ms: u64,
    /// Remaining lifetime below which the proactive task renews.
    #[serde(default = "default_proactive_renew_threshold_ms")]
    pub proactive_renew_threshold_ms: u64,
    /// Application heartbeat interval while connected.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Base delay for exponential reconnect backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum automatic reconnect attempts.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Connected-channel credential lifetime check interval.
    #[serde(default = "default_token_check_interval_ms")]
    pub token_check_interval_ms: u64,
    /// Remaining lifetime below which the channel reconnects proactively.
    #[serde(default = "default_reconnect_token_threshold_ms")]
    pub reconnect_token_threshold_ms: u64,
}

fn default_token_expiry_buffer_ms() -> u64 {
    constants::TOKEN_EXPIRY_BUFFER.as_millis() as u64
}

fn default_proactive_check_interval_ms() -> u64 {
    constants::PROACTIVE_CHECK_INTERVAL.as_millis() as u64
}

fn default_proactive_renew_threshold_ms() -> u64 {
    constants::PROACTIVE_RENEW_THRESHOLD.as_millis() as u64
}

fn default_heartbeat_interval_ms() -> u64 {
    constants::HEARTBEAT_INTERVAL.as_millis() as u64
}

fn default_reconnect_base_delay_ms() -> u64 {
    constants::RECONNECT_BASE_DELAY.as_millis() as u64
}

fn default_max_reconnect_attempts() -> u32 {
    constants::MAX_RECONNECT_ATTEMPTS
}

fn default_token_check_interval_ms() -> u64 {
    constants::TOKEN_CHECK_INTERVAL.as_millis() as u64
}

fn default_reconnect_token_threshold_ms() -> u64 {
    constants::RECONNECT_TOKEN_THRESHOLD.as_millis() as u64
}

impl Config {
    /// Create a configuration with default intervals for the given endpoints.
    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: ws_url.into(),
            token_expiry_buffer_ms: default_token_expiry_buffer_ms(),
            proactive_check_interval_ms: default_proactive_check_interval_ms(),
            proactive_renew_threshold_ms: default_proactive_renew_threshold_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            token_check_interval_ms: default_token_check_interval_ms(),
            reconnect_token_threshold_ms: default_reconnect_token_threshold_ms(),
        }
    }

    /// Expiry buffer as a [`Duration`].
    pub fn token_expiry_buffer(&self) -> Duration {
        Duration::from_millis(self.token_expiry_buffer_ms)
    }

    /// Proactive check interval as a [`Duration`].
    pub fn proactive_check_interval(&self) -> Duration {
        Duration::from_millis(self.proactive_check_interval_ms)
    }

    /// Proactive renew threshold as a [`Duration`].
    pub fn proactive_renew_threshold(&self) -> Duration {
        Duration::from_millis(self.proactive_renew_threshold_ms)
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reconnect base delay as a [`Duration`].
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// Token check interval as a [`Duration`].
    pub fn token_check_interval(&self) -> Duration {
        Duration::from_millis(self.token_check_interval_ms)
    }

    /// Proactive-reconnect token threshold as a [`Duration`].
    pub fn reconnect_token_threshold(&self) -> Duration {
        Duration::from_millis(self.reconnect_token_threshold_ms)
    }
}
