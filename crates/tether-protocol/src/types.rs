//! Identity, connect payload, approval, and notification types.

use std::fmt;

use serde::{Deserialize, Serialize};
use tether_transport::PeerId;
use uuid::Uuid;

use crate::ConnectStatus;

/// Version of the connect handshake. Hosts reject clients that send a
/// different one.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Durable player identifier.
///
/// Bound to a device or account and kept across reconnects, unlike the
/// transport's [`PeerId`], which changes every time a connection is made.
/// Duplicate-connection checks are keyed on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// A fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Connect payload
// ---------------------------------------------------------------------------

/// What a client presents to the host when it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPayload {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Defaults to [`PROTOCOL_VERSION`] when absent so older clients that
    /// never sent a version are treated as version 1.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

impl ConnectionPayload {
    /// Builds a payload for the current protocol version.
    pub fn new(player_id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// An incoming connection attempt, as seen by the host's approval check.
///
/// `payload` is `None` when the client sent nothing or sent something the
/// host couldn't decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub peer: PeerId,
    pub payload: Option<ConnectionPayload>,
}

/// Why a connection attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// The host is at capacity.
    ServerFull,
    /// The player is already connected.
    DuplicateConnection,
    /// No usable connect payload.
    MissingPayload,
    /// The client's protocol version doesn't match the host's.
    IncompatibleVersion,
    /// This peer isn't hosting, so it can't approve anyone.
    NotHosting,
}

impl RejectReason {
    /// The status the rejected client ends up seeing.
    pub fn status(self) -> ConnectStatus {
        match self {
            Self::ServerFull => ConnectStatus::ServerFull,
            Self::DuplicateConnection => ConnectStatus::LoggedInAgain,
            Self::IncompatibleVersion => ConnectStatus::IncompatibleVersion,
            Self::MissingPayload | Self::NotHosting => ConnectStatus::GenericDisconnect,
        }
    }
}

/// The host's decision on an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalResponse {
    pub approved: bool,
    /// Set exactly when `approved` is `false`.
    pub reason: Option<RejectReason>,
    /// Whether the gameplay layer should spawn an object for the new peer.
    pub create_player_object: bool,
}

impl ApprovalResponse {
    /// Admit the peer and ask for its player object.
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
            create_player_object: true,
        }
    }

    /// Turn the peer away.
    pub fn reject(reason: RejectReason) -> Self {
        Self {
            approved: false,
            reason: Some(reason),
            create_player_object: false,
        }
    }

    /// The disconnect reason to hand the transport for a rejection.
    /// Empty for an approval.
    pub fn disconnect_reason(&self) -> &'static str {
        match self.reason {
            Some(reason) => reason.status().to_reason(),
            None => "",
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Published at the start of every reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectProgress {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max: u32,
}

/// Host-side bookkeeping notification about a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub peer: PeerId,
    pub player_id: Option<PlayerId>,
    pub display_name: Option<String>,
    /// `Success` on connect, `GenericDisconnect` on drop.
    pub status: ConnectStatus,
}
