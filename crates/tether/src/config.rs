//! Connection manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_protocol::PROTOCOL_VERSION;
use tether_session::AdmissionRules;
use tether_timer::RetryPolicy;
use tracing::warn;

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Tunables for a [`ConnectionManager`](crate::ConnectionManager).
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```rust
/// use tether::ConnectionConfig;
///
/// let config: ConnectionConfig =
///     serde_json::from_str(r#"{ "max_players": 4 }"#).unwrap();
/// assert_eq!(config.max_players, 4);
/// assert_eq!(config.reconnect.max_attempts, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Name handed to the session directory when hosting.
    pub session_name: String,

    /// Maximum connected players, the host included.
    pub max_players: usize,

    /// Protocol version sent by clients and required by hosts.
    pub protocol_version: u32,

    /// How long a client waits for the host to accept it.
    pub connect_timeout: Duration,

    /// Pacing and bound of the automatic client reconnect loop.
    pub reconnect: RetryPolicy,

    /// Connect payloads larger than this are treated as missing.
    pub max_payload_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            session_name: "tether".to_owned(),
            max_players: 8,
            protocol_version: PROTOCOL_VERSION,
            connect_timeout: Duration::from_secs(30),
            reconnect: RetryPolicy::default(),
            max_payload_bytes: 1024,
        }
    }
}

impl ConnectionConfig {
    /// Upper bound on `max_players`.
    pub const MAX_PLAYERS: usize = 256;

    /// Upper bound on `max_payload_bytes`.
    pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically when a manager is built. Rules:
    /// - `max_players` within `1..=MAX_PLAYERS`.
    /// - `connect_timeout` non-zero (falls back to the default).
    /// - `max_payload_bytes` within `1..=MAX_PAYLOAD_BYTES`.
    /// - `reconnect` clamped by [`RetryPolicy::validated`].
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.max_players == 0 || self.max_players > Self::MAX_PLAYERS {
            let clamped = self.max_players.clamp(1, Self::MAX_PLAYERS);
            warn!(
                max_players = self.max_players,
                clamped, "max_players out of range, clamping"
            );
            self.max_players = clamped;
        }
        if self.connect_timeout.is_zero() {
            warn!("connect_timeout is zero, using default");
            self.connect_timeout = defaults.connect_timeout;
        }
        if self.max_payload_bytes == 0 || self.max_payload_bytes > Self::MAX_PAYLOAD_BYTES {
            let clamped = self.max_payload_bytes.clamp(1, Self::MAX_PAYLOAD_BYTES);
            warn!(
                max_payload_bytes = self.max_payload_bytes,
                clamped, "max_payload_bytes out of range, clamping"
            );
            self.max_payload_bytes = clamped;
        }
        self.reconnect = self.reconnect.validated();
        self
    }

    /// The approval limits this config implies.
    pub fn admission_rules(&self) -> AdmissionRules {
        AdmissionRules {
            capacity: self.max_players,
            protocol_version: self.protocol_version,
        }
    }
}
