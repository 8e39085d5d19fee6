//! `ConnectionHandle`: talking to a spawned connection manager.

use tether_protocol::{ConnectStatus, PeerEvent, ReconnectProgress};
use tether_session::SessionPlayerRecord;
use tether_transport::Coordinates;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{StateKind, TetherError};

/// Commands sent from handles to the manager task.
///
/// The `oneshot::Sender` in each variant is a "reply channel": the manager
/// answers on it once the command has been applied.
pub(crate) enum Command {
    StartClient {
        display_name: String,
        reply: oneshot::Sender<Result<(), TetherError>>,
    },
    StartHost {
        display_name: String,
        reply: oneshot::Sender<Result<(), TetherError>>,
    },
    ConnectDirect {
        coordinates: Coordinates,
        display_name: String,
        reply: oneshot::Sender<Result<(), TetherError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<StateKind>,
    },
    Players {
        reply: oneshot::Sender<Vec<SessionPlayerRecord>>,
    },
}

/// A cheap, cloneable handle to a manager running on its own task.
///
/// Created by [`ConnectionManager::spawn`](crate::ConnectionManager::spawn).
/// The manager stops (going offline first) once every handle is dropped.
#[derive(Clone)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<Command>,
    status: broadcast::Sender<ConnectStatus>,
    reconnects: broadcast::Sender<ReconnectProgress>,
    peers: broadcast::Sender<PeerEvent>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<Command>,
        status: broadcast::Sender<ConnectStatus>,
        reconnects: broadcast::Sender<ReconnectProgress>,
        peers: broadcast::Sender<PeerEvent>,
    ) -> Self {
        Self {
            sender,
            status,
            reconnects,
            peers,
        }
    }

    /// Looks up a session through the directory and joins it.
    pub async fn start_as_client(&self, display_name: impl Into<String>) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartClient {
            display_name: display_name.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TetherError::ManagerClosed)?
    }

    /// Creates a session through the directory and hosts it.
    pub async fn start_as_host(&self, display_name: impl Into<String>) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartHost {
            display_name: display_name.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TetherError::ManagerClosed)?
    }

    /// Joins a host at known coordinates without asking the directory.
    pub async fn connect_direct(
        &self,
        coordinates: Coordinates,
        display_name: impl Into<String>,
    ) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ConnectDirect {
            coordinates,
            display_name: display_name.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TetherError::ManagerClosed)?
    }

    /// Leaves the session. Resolves once the manager has gone offline.
    pub async fn request_shutdown(&self) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| TetherError::ManagerClosed)
    }

    /// The manager's current state.
    pub async fn state(&self) -> Result<StateKind, TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State { reply }).await?;
        rx.await.map_err(|_| TetherError::ManagerClosed)
    }

    /// Connected players, when hosting. Gameplay compares this against its
    /// minimum player count; every entry has already been approved and
    /// registered.
    pub async fn connected_players(&self) -> Result<Vec<SessionPlayerRecord>, TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Players { reply }).await?;
        rx.await.map_err(|_| TetherError::ManagerClosed)
    }

    /// Status changes from now on. Like the other subscriptions, the
    /// receiver reports `Closed` once every handle is dropped and the
    /// manager has stopped.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_reconnects(&self) -> broadcast::Receiver<ReconnectProgress> {
        self.reconnects.subscribe()
    }

    pub fn subscribe_peers(&self) -> broadcast::Receiver<PeerEvent> {
        self.peers.subscribe()
    }

    async fn send(&self, cmd: Command) -> Result<(), TetherError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| TetherError::ManagerClosed)
    }
}
