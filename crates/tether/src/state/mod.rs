//! The connection lifecycle states.
//!
//! Exactly one state is active at a time. Each is a small struct holding
//! only what that state needs (a connection method, a timer or two) and
//! implementing [`StateHooks`]. Hooks return a [`Flow`] telling the manager
//! whether to stay or move on; states never swap themselves out.
//!
//! ```text
//!            start_as_host / start_as_client
//! Offline ──────────────→ LobbyConnecting ──┬──→ StartingHost ──→ Hosting
//!    ↑                                      │
//!    │                                      └──→ ClientConnecting ──→ ClientConnected
//!    │                                                                  │    ↑
//!    │                                                  (unstructured   │    │ (reconnected)
//!    │                                                   disconnect)    ↓    │
//!    └──────────────── failure / shutdown / give up ──── ClientReconnecting
//! ```

mod client_connected;
mod client_connecting;
mod client_reconnecting;
mod hosting;
mod lobby;
mod offline;
mod online;
mod starting_host;

pub(crate) use client_connected::ClientConnected;
pub(crate) use client_connecting::ClientConnecting;
pub(crate) use client_reconnecting::ClientReconnecting;
pub(crate) use hosting::Hosting;
pub(crate) use lobby::LobbyConnecting;
pub(crate) use offline::Offline;
pub(crate) use starting_host::StartingHost;

use tether_protocol::{ApprovalRequest, ApprovalResponse, RejectReason};
use tether_session::SessionDirectory;
use tether_transport::{PeerId, Transport};
use tracing::{debug, trace};

use crate::context::{Context, InternalEvent};

// ---------------------------------------------------------------------------
// StateKind
// ---------------------------------------------------------------------------

/// Which state the connection manager is in. A plain, `Copy` view of the
/// internal state for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum StateKind {
    Offline,
    LobbyConnecting,
    ClientConnecting,
    ClientConnected,
    ClientReconnecting,
    StartingHost,
    Hosting,
}

impl StateKind {
    /// Whether the transport may be in use.
    pub fn is_online(self) -> bool {
        !matches!(self, Self::Offline | Self::LobbyConnecting)
    }

    /// Whether this peer is (or is becoming) the host.
    pub fn is_host(self) -> bool {
        matches!(self, Self::StartingHost | Self::Hosting)
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// What a hook wants the manager to do next.
pub(crate) enum Flow {
    Stay,
    Goto(ConnectionState),
}

impl Flow {
    pub(crate) fn offline() -> Self {
        Self::Goto(ConnectionState::Offline(Offline))
    }
}

// ---------------------------------------------------------------------------
// StateHooks
// ---------------------------------------------------------------------------

/// Lifecycle hooks every state implements. Defaults ignore the event, so a
/// state only spells out what it reacts to.
pub(crate) trait StateHooks {
    const KIND: StateKind;

    /// Called once the state is current. May chain straight to another
    /// state.
    fn enter<T: Transport, D: SessionDirectory>(&mut self, _cx: &mut Context<T, D>) -> Flow {
        Flow::Stay
    }

    /// Called before the state is replaced. Must cancel anything the state
    /// armed.
    fn exit<T: Transport, D: SessionDirectory>(&mut self, _cx: &mut Context<T, D>) {}

    fn on_peer_connected<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
        peer: PeerId,
    ) -> Flow {
        trace!(state = %Self::KIND, %peer, "peer connected ignored");
        Flow::Stay
    }

    fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
        peer: PeerId,
        _reason: &str,
    ) -> Flow {
        trace!(state = %Self::KIND, %peer, "peer disconnected ignored");
        Flow::Stay
    }

    fn on_listen_started<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
    ) -> Flow {
        trace!(state = %Self::KIND, "listen started ignored");
        Flow::Stay
    }

    fn on_listen_stopped<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
    ) -> Flow {
        trace!(state = %Self::KIND, "listen stopped ignored");
        Flow::Stay
    }

    fn on_transport_failure<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
    ) -> Flow {
        trace!(state = %Self::KIND, "transport failure ignored");
        Flow::Stay
    }

    fn on_user_requested_shutdown<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
    ) -> Flow {
        debug!(state = %Self::KIND, "shutdown requested, nothing to do");
        Flow::Stay
    }

    /// Completion of async work this state started.
    fn on_internal<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
        event: InternalEvent,
    ) -> Flow {
        debug!(state = %Self::KIND, ?event, "internal event ignored");
        Flow::Stay
    }

    /// Only host states admit anyone.
    fn approval_check<T: Transport, D: SessionDirectory>(
        &mut self,
        _cx: &mut Context<T, D>,
        request: &ApprovalRequest,
    ) -> ApprovalResponse {
        debug!(state = %Self::KIND, peer = %request.peer, "approval requested while not hosting");
        ApprovalResponse::reject(RejectReason::NotHosting)
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The active state.
pub(crate) enum ConnectionState {
    Offline(Offline),
    LobbyConnecting(LobbyConnecting),
    ClientConnecting(ClientConnecting),
    ClientConnected(ClientConnected),
    ClientReconnecting(ClientReconnecting),
    StartingHost(StartingHost),
    Hosting(Hosting),
}

/// Forwards a hook call to whichever state is active.
macro_rules! dispatch {
    ($state:expr, $s:ident => $call:expr) => {
        match $state {
            ConnectionState::Offline($s) => $call,
            ConnectionState::LobbyConnecting($s) => $call,
            ConnectionState::ClientConnecting($s) => $call,
            ConnectionState::ClientConnected($s) => $call,
            ConnectionState::ClientReconnecting($s) => $call,
            ConnectionState::StartingHost($s) => $call,
            ConnectionState::Hosting($s) => $call,
        }
    };
}

impl ConnectionState {
    pub(crate) fn kind(&self) -> StateKind {
        match self {
            Self::Offline(_) => Offline::KIND,
            Self::LobbyConnecting(_) => LobbyConnecting::KIND,
            Self::ClientConnecting(_) => ClientConnecting::KIND,
            Self::ClientConnected(_) => ClientConnected::KIND,
            Self::ClientReconnecting(_) => ClientReconnecting::KIND,
            Self::StartingHost(_) => StartingHost::KIND,
            Self::Hosting(_) => Hosting::KIND,
        }
    }

    pub(crate) fn enter<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        dispatch!(self, s => s.enter(cx))
    }

    pub(crate) fn exit<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) {
        dispatch!(self, s => s.exit(cx))
    }

    pub(crate) fn on_peer_connected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
    ) -> Flow {
        dispatch!(self, s => s.on_peer_connected(cx, peer))
    }

    pub(crate) fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
        reason: &str,
    ) -> Flow {
        dispatch!(self, s => s.on_peer_disconnected(cx, peer, reason))
    }

    pub(crate) fn on_listen_started<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        dispatch!(self, s => s.on_listen_started(cx))
    }

    pub(crate) fn on_listen_stopped<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        dispatch!(self, s => s.on_listen_stopped(cx))
    }

    pub(crate) fn on_transport_failure<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        dispatch!(self, s => s.on_transport_failure(cx))
    }

    pub(crate) fn on_user_requested_shutdown<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        dispatch!(self, s => s.on_user_requested_shutdown(cx))
    }

    pub(crate) fn on_internal<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        event: InternalEvent,
    ) -> Flow {
        dispatch!(self, s => s.on_internal(cx, event))
    }

    pub(crate) fn approval_check<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        request: &ApprovalRequest,
    ) -> ApprovalResponse {
        dispatch!(self, s => s.approval_check(cx, request))
    }
}
