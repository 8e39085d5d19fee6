//! `ConnectionManager` builder and event loop.
//!
//! The manager is the single owner of the connection state. Everything that
//! can change it funnels through one task:
//!
//! - user requests (`start_as_client`, `start_as_host`, `request_shutdown`)
//! - transport events (peer connected/disconnected, listen started/stopped,
//!   failures, approval requests)
//! - completions of async work the states started (directory lookups,
//!   transport setup, timers)
//!
//! Drive it directly with [`step`](ConnectionManager::step) (handy in tests
//! and single-task programs), or hand it to its own task with
//! [`spawn`](ConnectionManager::spawn) and talk to it through a
//! [`ConnectionHandle`].

use std::sync::Arc;
use std::time::Duration;

use tether_protocol::{
    ApprovalRequest, ApprovalResponse, ConnectStatus, PeerEvent, PlayerId, ReconnectProgress,
};
use tether_session::{ApprovalRegistry, SessionDirectory};
use tether_timer::RetryPolicy;
use tether_transport::{
    Admission, Coordinates, EventReceiver, PendingApproval, Transport, TransportEvent,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::context::{Context, Internal, InternalReceiver};
use crate::handle::{Command, ConnectionHandle};
use crate::state::{ClientConnecting, ConnectionState, Flow, LobbyConnecting, Offline, StateKind};
use crate::{ConnectionConfig, ConnectionMethod, Role, TetherError};

/// Command queue depth for a spawned manager. Senders wait when it's full.
const COMMAND_CHANNEL_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`ConnectionManager`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use tether::prelude::*;
///
/// # async fn run() {
/// let (events_tx, events_rx) = event_channel();
/// let transport = Arc::new(WebSocketTransport::new(events_tx));
/// let directory = Arc::new(DirectAddressDirectory::new("127.0.0.1:7777"));
///
/// let handle = ConnectionManagerBuilder::new()
///     .session_name("friday-night")
///     .max_players(4)
///     .connect_timeout(Duration::from_secs(10))
///     .build(transport, directory, events_rx)
///     .spawn();
///
/// handle.start_as_host("Alice").await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionManagerBuilder {
    config: ConnectionConfig,
    player_id: Option<PlayerId>,
}

impl ConnectionManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the name used when creating a session.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_name = name.into();
        self
    }

    /// Sets the maximum number of connected players, host included.
    pub fn max_players(mut self, max_players: usize) -> Self {
        self.config.max_players = max_players;
        self
    }

    /// Sets how long a client waits for the host to accept it.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the client reconnect policy.
    pub fn reconnect(mut self, policy: RetryPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Sets this peer's durable identity. Defaults to a random one; real
    /// games should persist it so duplicate detection works across
    /// restarts.
    pub fn player_id(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    /// Builds the manager in `Offline`. `events` must be the receiving end
    /// of the channel `transport` reports to.
    pub fn build<T: Transport, D: SessionDirectory>(
        self,
        transport: Arc<T>,
        directory: Arc<D>,
        events: EventReceiver,
    ) -> ConnectionManager<T, D> {
        let config = self.config.validated();
        let player_id = self.player_id.unwrap_or_else(PlayerId::random);
        let (cx, internal) = Context::new(config, player_id, transport, directory);
        ConnectionManager {
            state: ConnectionState::Offline(Offline),
            cx,
            events,
            internal,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Owns the connection lifecycle state and drives it from user requests,
/// transport events, and timers.
pub struct ConnectionManager<T: Transport, D: SessionDirectory> {
    state: ConnectionState,
    cx: Context<T, D>,
    events: EventReceiver,
    internal: InternalReceiver,
}

impl<T: Transport, D: SessionDirectory> ConnectionManager<T, D> {
    /// Creates a new builder.
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    /// Builds a manager from `config` with a random player identity.
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<T>,
        directory: Arc<D>,
        events: EventReceiver,
    ) -> Self {
        Self::builder()
            .config(config)
            .build(transport, directory, events)
    }

    // -- Queries ------------------------------------------------------------

    /// The current state.
    pub fn state_kind(&self) -> StateKind {
        self.state.kind()
    }

    /// This peer's durable identity.
    pub fn player_id(&self) -> PlayerId {
        self.cx.player_id
    }

    /// The effective (validated) configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.cx.config
    }

    /// Players admitted to the session this peer is hosting.
    pub fn registry(&self) -> &ApprovalRegistry {
        &self.cx.registry
    }

    /// Status changes, as they happen.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectStatus> {
        self.cx.status_sender().subscribe()
    }

    /// One notification per client reconnect attempt.
    pub fn subscribe_reconnects(&self) -> broadcast::Receiver<ReconnectProgress> {
        self.cx.reconnect_sender().subscribe()
    }

    /// Remote peers joining and leaving, host side.
    pub fn subscribe_peers(&self) -> broadcast::Receiver<PeerEvent> {
        self.cx.peer_sender().subscribe()
    }

    // -- User requests --------------------------------------------------------

    /// Looks up a session through the directory and joins it.
    ///
    /// # Errors
    /// [`TetherError::InvalidState`] unless the manager is `Offline`.
    pub fn start_as_client(&mut self, display_name: impl Into<String>) -> Result<(), TetherError> {
        self.ensure_offline("start as client")?;
        let lobby = LobbyConnecting::new(Role::Client, display_name.into());
        self.change_state(ConnectionState::LobbyConnecting(lobby));
        Ok(())
    }

    /// Creates a session through the directory and hosts it.
    ///
    /// # Errors
    /// [`TetherError::InvalidState`] unless the manager is `Offline`.
    pub fn start_as_host(&mut self, display_name: impl Into<String>) -> Result<(), TetherError> {
        self.ensure_offline("start as host")?;
        let lobby = LobbyConnecting::new(Role::Host, display_name.into());
        self.change_state(ConnectionState::LobbyConnecting(lobby));
        Ok(())
    }

    /// Joins a host at known coordinates without asking the directory.
    ///
    /// There's no session id to look up afterwards, so a dropped connection
    /// isn't retried.
    ///
    /// # Errors
    /// [`TetherError::InvalidState`] unless the manager is `Offline`.
    pub fn connect_direct(
        &mut self,
        coordinates: Coordinates,
        display_name: impl Into<String>,
    ) -> Result<(), TetherError> {
        self.ensure_offline("connect")?;
        let display_name: String = display_name.into();
        let payload = self.cx.local_payload(&display_name);
        let method = ConnectionMethod::direct(coordinates, payload);
        self.cx.publish(ConnectStatus::Connecting);
        self.change_state(ConnectionState::ClientConnecting(ClientConnecting::new(method)));
        Ok(())
    }

    /// Leaves the session. A no-op when already `Offline`.
    pub fn request_shutdown(&mut self) {
        let flow = self.state.on_user_requested_shutdown(&mut self.cx);
        self.apply(flow);
    }

    /// Decides whether an incoming connection may join. Only the host
    /// states admit anyone; the rest answer `NotHosting`.
    pub fn approval_check(&mut self, request: &ApprovalRequest) -> ApprovalResponse {
        self.state.approval_check(&mut self.cx, request)
    }

    fn ensure_offline(&self, action: &'static str) -> Result<(), TetherError> {
        match self.state.kind() {
            StateKind::Offline => Ok(()),
            state => Err(TetherError::InvalidState { action, state }),
        }
    }

    // -- Event loop -----------------------------------------------------------

    /// Waits for the next transport event or internal completion and
    /// processes it.
    pub async fn step(&mut self) {
        tokio::select! {
            Some(internal) = self.internal.recv() => self.handle_internal(internal),
            Some(event) = self.events.recv() => self.handle_transport_event(event),
            else => {}
        }
    }

    /// Moves the manager onto its own task and returns a handle to it.
    ///
    /// The task runs until every handle is dropped, then goes offline and
    /// exits.
    pub fn spawn(self) -> ConnectionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let handle = ConnectionHandle::new(
            tx,
            self.cx.status_sender().clone(),
            self.cx.reconnect_sender().clone(),
            self.cx.peer_sender().clone(),
        );
        tokio::spawn(self.run(rx));
        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(player_id = %self.cx.player_id, "connection manager started");
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(internal) = self.internal.recv() => self.handle_internal(internal),
                Some(event) = self.events.recv() => self.handle_transport_event(event),
            }
        }
        if self.state.kind() != StateKind::Offline {
            self.change_state(ConnectionState::Offline(Offline));
        }
        info!("connection manager stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartClient {
                display_name,
                reply,
            } => {
                let _ = reply.send(self.start_as_client(display_name));
            }
            Command::StartHost {
                display_name,
                reply,
            } => {
                let _ = reply.send(self.start_as_host(display_name));
            }
            Command::ConnectDirect {
                coordinates,
                display_name,
                reply,
            } => {
                let _ = reply.send(self.connect_direct(coordinates, display_name));
            }
            Command::Shutdown { reply } => {
                self.request_shutdown();
                let _ = reply.send(());
            }
            Command::State { reply } => {
                let _ = reply.send(self.state.kind());
            }
            Command::Players { reply } => {
                let players = self.cx.registry.connected().cloned().collect();
                let _ = reply.send(players);
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let flow = match event {
            TransportEvent::PeerConnected(peer) => self.state.on_peer_connected(&mut self.cx, peer),
            TransportEvent::PeerDisconnected { peer, reason } => {
                self.state.on_peer_disconnected(&mut self.cx, peer, &reason)
            }
            TransportEvent::ListenStarted => self.state.on_listen_started(&mut self.cx),
            TransportEvent::ListenStopped => self.state.on_listen_stopped(&mut self.cx),
            TransportEvent::TransportFailure => self.state.on_transport_failure(&mut self.cx),
            TransportEvent::ApprovalRequested(pending) => {
                self.answer_approval(pending);
                Flow::Stay
            }
        };
        self.apply(flow);
    }

    /// Decodes the pending request, runs the approval check, and sends the
    /// verdict back to the transport. Rejections carry the reason string
    /// the client will parse.
    fn answer_approval(&mut self, pending: PendingApproval) {
        let request = ApprovalRequest {
            peer: pending.peer,
            payload: self.cx.decode_payload(pending.peer, pending.payload.as_deref()),
        };
        let response = self.approval_check(&request);
        let admission = if response.approved {
            Admission::Accept
        } else {
            Admission::Reject {
                reason: response.disconnect_reason().to_owned(),
            }
        };
        pending.respond(admission);
    }

    fn handle_internal(&mut self, internal: Internal) {
        let Internal { epoch, event } = internal;
        if epoch != self.cx.epoch() {
            debug!(epoch, current = self.cx.epoch(), ?event, "stale completion dropped");
            return;
        }
        let flow = self.state.on_internal(&mut self.cx, event);
        self.apply(flow);
    }

    fn apply(&mut self, flow: Flow) {
        if let Flow::Goto(next) = flow {
            self.change_state(next);
        }
    }

    /// Exits the current state, starts a new epoch, and enters `next`.
    /// Repeats while `enter` asks to move on again.
    fn change_state(&mut self, next: ConnectionState) {
        let mut next = next;
        loop {
            let from = self.state.kind();
            let to = next.kind();
            self.state.exit(&mut self.cx);
            self.cx.advance_epoch();
            self.state = next;
            info!(%from, %to, "connection state changed");

            match self.state.enter(&mut self.cx) {
                Flow::Stay => return,
                Flow::Goto(further) => next = further,
            }
        }
    }
}
