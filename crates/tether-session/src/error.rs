//! Error types for the session layer.

use tether_protocol::PlayerId;
use tether_transport::PeerId;

/// Errors from the host-side registry of admitted players.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No record exists for the given player.
    #[error("no session record for player {0}")]
    NotFound(PlayerId),

    /// No connected record uses the given transport handle.
    #[error("no player connected as {0}")]
    UnknownPeer(PeerId),
}

/// Errors a [`SessionDirectory`](crate::SessionDirectory) can report.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The directory couldn't be reached or timed out. Worth retrying.
    #[error("session directory unavailable: {0}")]
    Unavailable(String),

    /// The directory refused the request. Retrying won't help.
    #[error("session directory rejected request: {0}")]
    Rejected(String),

    /// The session no longer exists.
    #[error("session closed")]
    SessionClosed,
}

impl DirectoryError {
    /// Whether a later attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
