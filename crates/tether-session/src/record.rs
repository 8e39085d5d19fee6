//! Per-player records kept by the host.
//!
//! A record is the host's memory of one player for the lifetime of a
//! session. It's keyed by the durable [`PlayerId`], so when a player drops
//! and comes back on a new transport handle, the host finds the same record
//! (and e.g. knows the player already spawned once).

use tether_protocol::{PROTOCOL_VERSION, PlayerId};
use tether_transport::PeerId;

// ---------------------------------------------------------------------------
// AdmissionRules
// ---------------------------------------------------------------------------

/// The limits the approval check enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRules {
    /// Maximum number of simultaneously connected players, host included.
    pub capacity: usize,

    /// Protocol version clients must present.
    pub protocol_version: u32,
}

impl Default for AdmissionRules {
    fn default() -> Self {
        Self {
            capacity: 8,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPlayerRecord
// ---------------------------------------------------------------------------

/// The host's record of one player.
///
/// ```text
///   admitted ──(peer drops)──→ disconnected ──(same PlayerId admitted)──┐
///       ↑                                                              │
///       └──────────────────────(new PeerId)────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlayerRecord {
    pub player_id: PlayerId,

    /// Transport handle of the current (or last) connection.
    pub peer: PeerId,

    pub display_name: String,

    pub is_connected: bool,

    /// Set by the gameplay layer once the player's object exists, so a
    /// reconnecting player isn't spawned twice.
    pub has_spawned: bool,
}

impl SessionPlayerRecord {
    pub(crate) fn new(player_id: PlayerId, peer: PeerId, display_name: String) -> Self {
        Self {
            player_id,
            peer,
            display_name,
            is_connected: true,
            has_spawned: false,
        }
    }
}
