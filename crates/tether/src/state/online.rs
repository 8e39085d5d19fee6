//! Behavior shared by every state past the lobby.
//!
//! Five states (`ClientConnecting`, `ClientConnected`, `ClientReconnecting`,
//! `StartingHost`, `Hosting`) handle a user shutdown and a transport failure
//! the same way. They delegate here rather than each repeating it.

use tether_protocol::ConnectStatus;
use tracing::warn;

use super::Flow;
use crate::context::Context;

/// The user asked to leave: say so, then go offline.
pub(super) fn on_user_requested_shutdown<T, D>(cx: &mut Context<T, D>) -> Flow {
    cx.publish(ConnectStatus::UserRequestedDisconnect);
    Flow::offline()
}

/// The transport died under us. Nothing is published; the transport's own
/// error reporting already covers it.
pub(super) fn on_transport_failure<T, D>(_cx: &mut Context<T, D>) -> Flow {
    warn!("transport failure, going offline");
    Flow::offline()
}

/// Publishes `status` and goes offline.
pub(super) fn fail<T, D>(cx: &mut Context<T, D>, status: ConnectStatus) -> Flow {
    cx.publish(status);
    Flow::offline()
}
