//! Transport boundary for Tether.
//!
//! Tether doesn't move bytes itself. The connection state machine talks to
//! a [`Transport`] through a handful of async calls (start as host, start as
//! client, disconnect a peer, shut down) and hears back through a stream of
//! [`TransportEvent`]s delivered on a channel. Everything a transport reports
//! lands on that one channel, so the state machine sees events in exactly
//! the order the transport produced them.
//!
//! Disconnect reasons are plain strings at this layer. The protocol crate
//! decides what goes in them; the transport only carries them.
//!
//! # Feature Flags
//!
//! - `websocket` (default): reference WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::fmt;
use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Transient handle the transport assigns to one connection.
///
/// A player that drops and comes back gets a new `PeerId`; the durable
/// identity lives in the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// The handle a host uses for itself.
    pub const HOST: PeerId = PeerId(0);

    /// Creates a new `PeerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Where to reach a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Coordinates {
    /// A directly reachable `host:port`.
    Address(String),
    /// A join code resolved by a relay service.
    Relay { code: String },
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "{addr}"),
            Self::Relay { code } => write!(f, "relay:{code}"),
        }
    }
}

/// The host's answer to a pending connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Let the peer in. The transport follows up with
    /// [`TransportEvent::PeerConnected`].
    Accept,
    /// Turn the peer away. `reason` is delivered to the client as the
    /// disconnect reason.
    Reject { reason: String },
}

/// A connection attempt waiting for the host to decide.
///
/// Carries the raw connect payload the client sent (if any) and a reply
/// channel. Dropping it without answering counts as a rejection with an
/// empty reason.
#[derive(Debug)]
pub struct PendingApproval {
    /// Transport handle of the connecting peer.
    pub peer: PeerId,
    /// Raw connect payload, `None` if the client sent nothing.
    pub payload: Option<Vec<u8>>,
    reply: oneshot::Sender<Admission>,
}

impl PendingApproval {
    /// Creates a pending approval and the receiver the transport waits on.
    pub fn new(
        peer: PeerId,
        payload: Option<Vec<u8>>,
    ) -> (Self, oneshot::Receiver<Admission>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                peer,
                payload,
                reply,
            },
            rx,
        )
    }

    /// Sends the decision back to the transport.
    ///
    /// The transport may have given up on the peer in the meantime; that
    /// isn't an error for the caller.
    pub fn respond(self, admission: Admission) {
        if self.reply.send(admission).is_err() {
            debug!(peer = %self.peer, "approval answered after peer left");
        }
    }
}

/// Everything a transport reports back to the connection state machine.
#[derive(Debug)]
pub enum TransportEvent {
    /// A peer finished connecting. On a client this is the local peer.
    PeerConnected(PeerId),
    /// A peer went away. `reason` is empty when the transport has nothing
    /// structured to say.
    PeerDisconnected { peer: PeerId, reason: String },
    /// The host socket is open and accepting.
    ListenStarted,
    /// The host socket closed.
    ListenStopped,
    /// The transport failed underneath us.
    TransportFailure,
    /// A peer wants in and the host must decide.
    ApprovalRequested(PendingApproval),
}

/// Sending half of the transport event channel, handed to the transport.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
/// Receiving half, handed to the connection manager.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates the channel a transport reports its events on.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A network transport driven by the connection state machine.
///
/// All methods take `&self` so a transport can be shared behind an `Arc`
/// and called from the short-lived tasks the state machine spawns.
/// Results of the *connection itself* are reported through the event
/// channel, not through these return values: `start_client` returning `Ok`
/// means "connecting has begun", and `PeerConnected` follows later.
pub trait Transport: Send + Sync + 'static {
    /// Starts listening as a host at `coordinates`.
    ///
    /// Returning `Ok` does not mean the socket is open yet; the transport
    /// reports [`TransportEvent::ListenStarted`] when it is.
    fn start_host(
        &self,
        coordinates: &Coordinates,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts connecting to a host at `coordinates`, presenting `payload`
    /// for approval.
    fn start_client(
        &self,
        coordinates: &Coordinates,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Drops one peer, attaching `reason` to the disconnect it sees.
    fn disconnect(
        &self,
        peer: PeerId,
        reason: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops everything and forgets all peers. Safe to call when idle.
    fn shutdown(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// The handle of the local peer, once known.
    fn local_peer_id(&self) -> Option<PeerId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_new_and_into_inner() {
        let id = PeerId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId::new(7).to_string(), "peer-7");
        assert_eq!(PeerId::HOST.to_string(), "peer-0");
    }

    #[test]
    fn test_coordinates_display() {
        assert_eq!(
            Coordinates::Address("127.0.0.1:7777".into()).to_string(),
            "127.0.0.1:7777"
        );
        assert_eq!(
            Coordinates::Relay { code: "ABCD".into() }.to_string(),
            "relay:ABCD"
        );
    }

    #[tokio::test]
    async fn test_pending_approval_respond_reaches_transport() {
        let (pending, rx) = PendingApproval::new(PeerId::new(3), None);
        pending.respond(Admission::Reject {
            reason: "ServerFull".into(),
        });
        assert_eq!(
            rx.await.expect("reply should arrive"),
            Admission::Reject {
                reason: "ServerFull".into()
            }
        );
    }

    #[tokio::test]
    async fn test_pending_approval_dropped_closes_reply() {
        let (pending, rx) = PendingApproval::new(PeerId::new(3), Some(vec![1]));
        drop(pending);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_pending_approval_respond_after_receiver_gone_is_silent() {
        let (pending, rx) = PendingApproval::new(PeerId::new(5), None);
        drop(rx);
        pending.respond(Admission::Accept);
    }
}
