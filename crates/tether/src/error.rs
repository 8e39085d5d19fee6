//! Unified error type for Tether.

use tether_protocol::ProtocolError;
use tether_session::{DirectoryError, SessionError};
use tether_transport::TransportError;

use crate::StateKind;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tether` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant auto-generates `From` impls, so the `?` operator
/// converts sub-crate errors automatically.
///
/// Most connection failures never show up here: they are reported as a
/// [`ConnectStatus`](tether_protocol::ConnectStatus) on the status channel.
/// This type covers misuse of the API and failures inside setup tasks.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A transport-level error (bind, connect, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (payload encode/decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An approval registry error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The requested operation isn't allowed in the current state.
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: StateKind,
    },

    /// The manager task is gone (every handle outlived it).
    #[error("connection manager has shut down")]
    ManagerClosed,
}
