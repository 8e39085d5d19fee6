//! Services and bookkeeping shared by every connection state.
//!
//! The [`Context`] is what each state hook receives: the injected transport
//! and directory, the approval registry, config, the status publishers, and
//! the plumbing for async work. States never reach anything global.
//!
//! # Async work and the epoch
//!
//! Directory calls, transport setup, and timers all complete on other
//! tasks. Each is tagged with the epoch current when it was started and
//! reports back through the internal channel. The manager bumps the epoch
//! on every state change and drops any completion carrying an older one, so
//! a result meant for a state that has already exited can never drive a
//! transition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tether_protocol::{
    Codec, ConnectStatus, ConnectionPayload, JsonCodec, PeerEvent, PlayerId, ReconnectProgress,
};
use tether_session::{ApprovalRegistry, DirectoryError, SessionDirectory, SessionTicket};
use tether_timer::RetryTimer;
use tether_transport::{PeerId, Transport};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ConnectionConfig, Reconnection, TetherError};

/// Capacity of each notification channel. Slow subscribers lag rather than
/// block the manager.
const NOTIFY_CAPACITY: usize = 64;

/// Time given to queued kick messages to reach the wire before the
/// transport is shut down.
const KICK_FLUSH: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Internal events
// ---------------------------------------------------------------------------

/// Completion of some async work, delivered back to the manager task.
#[derive(Debug)]
pub(crate) enum InternalEvent {
    SessionCreated(Result<SessionTicket, DirectoryError>),
    SessionFound(Result<Option<SessionTicket>, DirectoryError>),
    HostStarted(Result<(), TetherError>),
    ClientStarted(Result<(), TetherError>),
    Reconnection(Reconnection),
    ConnectTimeout,
    ReconnectTick,
}

/// An [`InternalEvent`] tagged with the epoch that started it.
#[derive(Debug)]
pub(crate) struct Internal {
    pub(crate) epoch: u64,
    pub(crate) event: InternalEvent,
}

pub(crate) type InternalReceiver = mpsc::UnboundedReceiver<Internal>;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub(crate) struct Context<T, D> {
    pub(crate) transport: Arc<T>,
    pub(crate) directory: Arc<D>,
    pub(crate) registry: ApprovalRegistry,
    pub(crate) config: ConnectionConfig,
    /// This peer's durable identity.
    pub(crate) player_id: PlayerId,

    status_tx: broadcast::Sender<ConnectStatus>,
    reconnect_tx: broadcast::Sender<ReconnectProgress>,
    peer_tx: broadcast::Sender<PeerEvent>,

    internal_tx: mpsc::UnboundedSender<Internal>,
    epoch: u64,
    /// Setup work in flight for the current state. Aborted on state change.
    tasks: Vec<JoinHandle<()>>,
    /// Transport teardown still running. The next piece of async work
    /// waits for it, so a late shutdown can't undo a fresh start.
    teardown: Option<JoinHandle<()>>,
}

impl<T, D> Context<T, D> {
    pub(crate) fn new(
        config: ConnectionConfig,
        player_id: PlayerId,
        transport: Arc<T>,
        directory: Arc<D>,
    ) -> (Self, InternalReceiver) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let cx = Self {
            transport,
            directory,
            registry: ApprovalRegistry::new(config.admission_rules()),
            config,
            player_id,
            status_tx: broadcast::channel(NOTIFY_CAPACITY).0,
            reconnect_tx: broadcast::channel(NOTIFY_CAPACITY).0,
            peer_tx: broadcast::channel(NOTIFY_CAPACITY).0,
            internal_tx,
            epoch: 0,
            tasks: Vec::new(),
            teardown: None,
        };
        (cx, internal_rx)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Starts a new epoch: everything tagged with the old one is now stale,
    /// and setup work still running for it is aborted.
    pub(crate) fn advance_epoch(&mut self) {
        self.epoch += 1;
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    // -- Notifications ------------------------------------------------------

    /// Publishes a status change. Having no subscribers is fine.
    pub(crate) fn publish(&self, status: ConnectStatus) {
        info!(%status, "connect status");
        let _ = self.status_tx.send(status);
    }

    pub(crate) fn publish_progress(&self, progress: ReconnectProgress) {
        let _ = self.reconnect_tx.send(progress);
    }

    pub(crate) fn publish_peer(&self, event: PeerEvent) {
        let _ = self.peer_tx.send(event);
    }

    pub(crate) fn status_sender(&self) -> &broadcast::Sender<ConnectStatus> {
        &self.status_tx
    }

    pub(crate) fn reconnect_sender(&self) -> &broadcast::Sender<ReconnectProgress> {
        &self.reconnect_tx
    }

    pub(crate) fn peer_sender(&self) -> &broadcast::Sender<PeerEvent> {
        &self.peer_tx
    }

    // -- Payloads -----------------------------------------------------------

    /// The payload this peer presents when joining.
    pub(crate) fn local_payload(&self, display_name: &str) -> ConnectionPayload {
        ConnectionPayload {
            player_id: self.player_id,
            display_name: display_name.to_owned(),
            protocol_version: self.config.protocol_version,
        }
    }

    /// Decodes an incoming connect payload. Anything absent, oversized, or
    /// malformed comes back as `None`.
    pub(crate) fn decode_payload(
        &self,
        peer: PeerId,
        bytes: Option<&[u8]>,
    ) -> Option<ConnectionPayload> {
        let bytes = bytes?;
        match JsonCodec.decode_bounded(bytes, self.config.max_payload_bytes) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(%peer, error = %e, "unusable connect payload");
                None
            }
        }
    }

    // -- Timers -------------------------------------------------------------

    /// Arms `timer` to deliver `event` after `after`, tagged with the
    /// current epoch.
    pub(crate) fn schedule(&self, timer: &mut RetryTimer, after: Duration, event: InternalEvent) {
        timer.schedule(
            after,
            self.internal_tx.clone(),
            Internal {
                epoch: self.epoch,
                event,
            },
        );
    }
}

impl<T: Transport, D: SessionDirectory> Context<T, D> {
    /// Whether `peer` is this process's own connection. With no local id
    /// known (the transport already let go of it) every peer counts, since
    /// a client transport only reports on its own connection.
    pub(crate) fn is_local(&self, peer: PeerId) -> bool {
        self.transport.local_peer_id().is_none_or(|local| local == peer)
    }

    /// Runs `task` in the background and reports its result back, tagged
    /// with the current epoch. Waits for any pending teardown first.
    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = InternalEvent> + Send + 'static,
    {
        let epoch = self.epoch;
        let tx = self.internal_tx.clone();
        let teardown = self.teardown.take();
        let handle = tokio::spawn(async move {
            if let Some(teardown) = teardown {
                let _ = teardown.await;
            }
            let event = task.await;
            if tx.send(Internal { epoch, event }).is_err() {
                debug!("manager gone before task completed");
            }
        });
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }

    /// Shuts the transport down in the background.
    pub(crate) fn begin_teardown(&mut self) {
        let transport = Arc::clone(&self.transport);
        self.chain_teardown(async move {
            if let Err(e) = transport.shutdown().await {
                warn!(error = %e, "transport shutdown failed");
            }
        });
    }

    /// Disconnects `peers` with `reason` ahead of the next teardown.
    pub(crate) fn kick(&mut self, peers: Vec<PeerId>, reason: &'static str) {
        let transport = Arc::clone(&self.transport);
        self.chain_teardown(async move {
            for peer in peers {
                if let Err(e) = transport.disconnect(peer, reason).await {
                    debug!(%peer, error = %e, "kick failed");
                }
            }
            tokio::time::sleep(KICK_FLUSH).await;
        });
    }

    fn chain_teardown<F>(&mut self, step: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let previous = self.teardown.take();
        self.teardown = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            step.await;
        }));
    }
}
