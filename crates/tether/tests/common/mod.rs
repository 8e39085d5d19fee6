//! Shared test doubles: a scripted transport and directory, and a harness
//! that drives a manager step by step.
//!
//! All tests using these run with `start_paused = true`, so the manager's
//! timers fire as soon as nothing else is ready and timing is exact.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether::prelude::*;
use tether_transport::{EventSender, PendingApproval};
use tokio::sync::broadcast;

/// Coordinates every mock session lives at.
pub const ADDR: &str = "127.0.0.1:7777";

pub fn ticket() -> SessionTicket {
    SessionTicket {
        session_id: SessionId("test-session".into()),
        coordinates: Coordinates::Address(ADDR.into()),
    }
}

// =========================================================================
// MockTransport
// =========================================================================

/// What the manager asked the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartHost,
    StartClient(Vec<u8>),
    Disconnect(PeerId, String),
    Shutdown,
}

pub struct MockTransport {
    events: EventSender,
    calls: Mutex<Vec<Call>>,
    local: Mutex<Option<PeerId>>,
    next_local: AtomicU64,
    /// Report `PeerConnected(local)` as soon as a client start succeeds.
    pub auto_accept: AtomicBool,
    /// Report `ListenStarted` as soon as a host start succeeds.
    pub auto_listen: AtomicBool,
    fail_client_starts: AtomicUsize,
    fail_host_start: AtomicBool,
}

impl MockTransport {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            next_local: AtomicU64::new(1),
            auto_accept: AtomicBool::new(true),
            auto_listen: AtomicBool::new(true),
            fail_client_starts: AtomicUsize::new(0),
            fail_host_start: AtomicBool::new(false),
        }
    }

    /// Injects a transport event as if the network produced it.
    pub fn emit(&self, event: TransportEvent) {
        self.events.send(event).expect("manager should be listening");
    }

    /// Injects an approval request and returns where the verdict lands.
    pub fn request_approval(
        &self,
        peer: PeerId,
        payload: Option<Vec<u8>>,
    ) -> tokio::sync::oneshot::Receiver<tether_transport::Admission> {
        let (pending, rx) = PendingApproval::new(peer, payload);
        self.emit(TransportEvent::ApprovalRequested(pending));
        rx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn client_starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::StartClient(_)))
            .count()
    }

    pub fn local(&self) -> Option<PeerId> {
        *self.local.lock().unwrap()
    }

    pub fn set_auto_accept(&self, on: bool) {
        self.auto_accept.store(on, Ordering::SeqCst);
    }

    pub fn set_auto_listen(&self, on: bool) {
        self.auto_listen.store(on, Ordering::SeqCst);
    }

    pub fn fail_next_client_starts(&self, n: usize) {
        self.fail_client_starts.store(n, Ordering::SeqCst);
    }

    pub fn fail_host_start(&self) {
        self.fail_host_start.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Transport for MockTransport {
    async fn start_host(&self, _coordinates: &Coordinates) -> Result<(), TransportError> {
        self.record(Call::StartHost);
        if self.fail_host_start.load(Ordering::SeqCst) {
            return Err(TransportError::ListenFailed(std::io::Error::other(
                "address in use",
            )));
        }
        *self.local.lock().unwrap() = Some(PeerId::HOST);
        if self.auto_listen.load(Ordering::SeqCst) {
            self.emit(TransportEvent::ListenStarted);
        }
        Ok(())
    }

    async fn start_client(
        &self,
        _coordinates: &Coordinates,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.record(Call::StartClient(payload));
        let failing = self.fail_client_starts.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_client_starts.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectFailed(std::io::Error::other(
                "connection refused",
            )));
        }
        let local = PeerId::new(self.next_local.fetch_add(1, Ordering::SeqCst));
        *self.local.lock().unwrap() = Some(local);
        if self.auto_accept.load(Ordering::SeqCst) {
            self.emit(TransportEvent::PeerConnected(local));
        }
        Ok(())
    }

    async fn disconnect(&self, peer: PeerId, reason: &str) -> Result<(), TransportError> {
        self.record(Call::Disconnect(peer, reason.to_owned()));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.record(Call::Shutdown);
        *self.local.lock().unwrap() = None;
        Ok(())
    }

    fn local_peer_id(&self) -> Option<PeerId> {
        self.local()
    }
}

// =========================================================================
// MockDirectory
// =========================================================================

/// A directory that answers from scripts. With nothing scripted it creates
/// and finds [`ticket()`] and never re-locates a session.
#[derive(Default)]
pub struct MockDirectory {
    create: Mutex<VecDeque<Result<SessionTicket, DirectoryError>>>,
    find: Mutex<VecDeque<Result<Option<SessionTicket>, DirectoryError>>>,
    reconnect: Mutex<VecDeque<Result<Option<Coordinates>, DirectoryError>>>,
    reconnect_calls: AtomicUsize,
}

impl MockDirectory {
    pub fn script_create(&self, result: Result<SessionTicket, DirectoryError>) {
        self.create.lock().unwrap().push_back(result);
    }

    pub fn script_find(&self, result: Result<Option<SessionTicket>, DirectoryError>) {
        self.find.lock().unwrap().push_back(result);
    }

    pub fn script_reconnect(&self, result: Result<Option<Coordinates>, DirectoryError>) {
        self.reconnect.lock().unwrap().push_back(result);
    }

    pub fn reconnect_calls(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }
}

impl SessionDirectory for MockDirectory {
    async fn create_session(
        &self,
        _name: &str,
        _capacity: usize,
    ) -> Result<SessionTicket, DirectoryError> {
        self.create
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ticket()))
    }

    async fn find_and_join_session(&self) -> Result<Option<SessionTicket>, DirectoryError> {
        self.find
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Some(ticket())))
    }

    async fn reconnect(
        &self,
        _session_id: &SessionId,
    ) -> Result<Option<Coordinates>, DirectoryError> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.reconnect
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

// =========================================================================
// Harness
// =========================================================================

pub type Manager = ConnectionManager<MockTransport, MockDirectory>;

pub struct Harness {
    pub manager: Manager,
    pub transport: Arc<MockTransport>,
    pub directory: Arc<MockDirectory>,
    pub status: broadcast::Receiver<ConnectStatus>,
    pub reconnects: broadcast::Receiver<ReconnectProgress>,
    pub peers: broadcast::Receiver<PeerEvent>,
}

pub fn harness() -> Harness {
    harness_with(ConnectionManagerBuilder::new())
}

pub fn harness_with(builder: ConnectionManagerBuilder) -> Harness {
    let (tx, rx) = event_channel();
    let transport = Arc::new(MockTransport::new(tx));
    let directory = Arc::new(MockDirectory::default());
    let manager = builder.build(Arc::clone(&transport), Arc::clone(&directory), rx);
    let status = manager.subscribe_status();
    let reconnects = manager.subscribe_reconnects();
    let peers = manager.subscribe_peers();
    Harness {
        manager,
        transport,
        directory,
        status,
        reconnects,
        peers,
    }
}

impl Harness {
    /// Steps the manager until it reaches `kind`. Generous timeout: with
    /// paused time it only matters if the state is never reached.
    pub async fn run_until(&mut self, kind: StateKind) {
        let manager = &mut self.manager;
        tokio::time::timeout(Duration::from_secs(600), async {
            while manager.state_kind() != kind {
                manager.step().await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {kind}, stuck in {}", manager.state_kind()));
    }

    /// Steps the manager for `period` of (virtual) time.
    pub async fn run_for(&mut self, period: Duration) {
        let manager = &mut self.manager;
        let _ = tokio::time::timeout(period, async {
            loop {
                manager.step().await;
            }
        })
        .await;
    }

    /// Every status published since the last drain.
    pub fn drain_status(&mut self) -> Vec<ConnectStatus> {
        drain(&mut self.status)
    }

    pub fn drain_reconnects(&mut self) -> Vec<ReconnectProgress> {
        drain(&mut self.reconnects)
    }

    pub fn drain_peers(&mut self) -> Vec<PeerEvent> {
        drain(&mut self.peers)
    }

    /// Lets spawned teardown work finish.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}
