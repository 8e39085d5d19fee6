//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Wire handshake, in order:
//! 1. client opens the socket and sends its connect payload as the first
//!    binary frame;
//! 2. the host raises [`TransportEvent::ApprovalRequested`] and waits;
//! 3. accepted → host sends a `welcome` text frame and both sides report
//!    `PeerConnected`; rejected → host sends a close frame whose reason is
//!    the rejection string.
//!
//! After that the transport only watches for the socket closing. Close
//! frame reasons travel up as the `reason` of `PeerDisconnected`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info};

use crate::{
    Admission, Coordinates, EventSender, PeerId, PendingApproval, Transport,
    TransportError, TransportEvent,
};

/// How long a freshly accepted socket has to send its connect payload.
const PAYLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Text frame the host sends once a peer is approved.
const WELCOME: &str = "welcome";

type Outbox = mpsc::UnboundedSender<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Host,
    Client,
}

struct Shared {
    mode: Mutex<Mode>,
    /// Writer queues for every live connection, including the local one on
    /// a client.
    peers: Mutex<HashMap<PeerId, Outbox>>,
    local: Mutex<Option<PeerId>>,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_peer: AtomicU64,
}

/// Locks a std mutex, ignoring poisoning. The guarded data is plain
/// bookkeeping that stays consistent even if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn next_peer_id(&self) -> PeerId {
        PeerId::new(self.next_peer.fetch_add(1, Ordering::Relaxed))
    }

    fn release(&self) {
        *lock(&self.mode) = Mode::Idle;
    }
}

/// A WebSocket-based [`Transport`] that can act as either host or client.
///
/// Only [`Coordinates::Address`] is supported; relay codes need a relay
/// service this transport doesn't speak.
pub struct WebSocketTransport {
    events: EventSender,
    shared: Arc<Shared>,
}

impl WebSocketTransport {
    /// Creates an idle transport reporting to `events`.
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            shared: Arc::new(Shared {
                mode: Mutex::new(Mode::Idle),
                peers: Mutex::new(HashMap::new()),
                local: Mutex::new(None),
                local_addr: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                // 0 is reserved for the host itself.
                next_peer: AtomicU64::new(1),
            }),
        }
    }

    /// The address the host socket is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.local_addr)
    }

    fn claim(&self, mode: Mode) -> Result<(), TransportError> {
        let mut current = lock(&self.shared.mode);
        if *current != Mode::Idle {
            return Err(TransportError::AlreadyStarted);
        }
        *current = mode;
        Ok(())
    }

    fn release(&self) {
        self.shared.release();
    }
}

fn address(coordinates: &Coordinates) -> Result<&str, TransportError> {
    match coordinates {
        Coordinates::Address(addr) => Ok(addr),
        other => Err(TransportError::UnsupportedCoordinates(other.to_string())),
    }
}

fn close_message(reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: reason.to_owned().into(),
    }))
}

fn io_error(kind: std::io::ErrorKind, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(kind, e.to_string())
}

impl Transport for WebSocketTransport {
    async fn start_host(
        &self,
        coordinates: &Coordinates,
    ) -> Result<(), TransportError> {
        let addr = address(coordinates)?;
        self.claim(Mode::Host)?;

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.release();
                return Err(TransportError::ListenFailed(e));
            }
        };
        let bound = listener.local_addr().ok();
        *lock(&self.shared.local_addr) = bound;
        *lock(&self.shared.local) = Some(PeerId::HOST);
        info!(addr, ?bound, "WebSocket host listening");

        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared), events));
        shared.track(task);
        Ok(())
    }

    async fn start_client(
        &self,
        coordinates: &Coordinates,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let addr = address(coordinates)?;
        self.claim(Mode::Client)?;

        let url = format!("ws://{addr}");
        let ws = match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                self.release();
                return Err(TransportError::ConnectFailed(io_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                )));
            }
        };

        let (mut sink, stream) = ws.split();
        if let Err(e) = sink.send(Message::Binary(payload.into())).await {
            self.release();
            return Err(TransportError::SendFailed(io_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            )));
        }

        let local = self.shared.next_peer_id();
        *lock(&self.shared.local) = Some(local);
        debug!(%local, %url, "connect payload sent, awaiting approval");

        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let task = tokio::spawn(client_session(local, sink, stream, Arc::clone(&shared), events));
        shared.track(task);
        Ok(())
    }

    async fn disconnect(
        &self,
        peer: PeerId,
        reason: &str,
    ) -> Result<(), TransportError> {
        let outbox = lock(&self.shared.peers)
            .get(&peer)
            .cloned()
            .ok_or(TransportError::UnknownPeer(peer))?;
        outbox
            .send(close_message(reason))
            .map_err(|_| TransportError::UnknownPeer(peer))
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let tasks: Vec<_> = lock(&self.shared.tasks).drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        lock(&self.shared.peers).clear();
        *lock(&self.shared.local) = None;
        *lock(&self.shared.local_addr) = None;
        let previous = std::mem::replace(&mut *lock(&self.shared.mode), Mode::Idle);
        if previous != Mode::Idle {
            info!(mode = ?previous, aborted = tasks.len(), "WebSocket transport shut down");
        }
        Ok(())
    }

    fn local_peer_id(&self) -> Option<PeerId> {
        *lock(&self.shared.local)
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, events: EventSender) {
    if events.send(TransportEvent::ListenStarted).is_err() {
        return;
    }
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed, host stopping");
                let _ = events.send(TransportEvent::ListenStopped);
                return;
            }
        };
        let task = tokio::spawn(serve_peer(stream, addr, Arc::clone(&shared), events.clone()));
        shared.track(task);
    }
}

/// Host side of one connection: collect the payload, wait for approval,
/// then watch the socket until it closes.
async fn serve_peer(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
    events: EventSender,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, error = %e, "WebSocket upgrade failed");
            return;
        }
    };
    let peer = shared.next_peer_id();
    let (mut sink, mut stream) = ws.split();

    let payload = match tokio::time::timeout(PAYLOAD_TIMEOUT, stream.next()).await {
        Ok(Some(Ok(Message::Binary(data)))) => Some(data.to_vec()),
        Ok(Some(Ok(Message::Text(text)))) => Some(text.as_bytes().to_vec()),
        Ok(Some(Ok(_))) => None,
        Ok(Some(Err(_))) | Ok(None) => return,
        Err(_) => {
            debug!(%peer, %addr, "no connect payload before timeout");
            None
        }
    };

    let (pending, decision) = PendingApproval::new(peer, payload);
    if events.send(TransportEvent::ApprovalRequested(pending)).is_err() {
        return;
    }
    match decision.await {
        Ok(Admission::Accept) => {}
        Ok(Admission::Reject { reason }) => {
            debug!(%peer, %reason, "peer rejected");
            let _ = sink.send(close_message(&reason)).await;
            return;
        }
        Err(_) => {
            let _ = sink.send(close_message("")).await;
            return;
        }
    }

    if sink.send(Message::Text(WELCOME.into())).await.is_err() {
        return;
    }
    let (outbox, inbox) = mpsc::unbounded_channel();
    lock(&shared.peers).insert(peer, outbox);
    debug!(%peer, %addr, "peer admitted");
    let _ = events.send(TransportEvent::PeerConnected(peer));

    let reason = pump(sink, stream, inbox).await;
    lock(&shared.peers).remove(&peer);
    let _ = events.send(TransportEvent::PeerDisconnected { peer, reason });
}

/// Client side: wait for the host's verdict, then watch the socket.
async fn client_session<S>(
    local: PeerId,
    sink: SplitSink<WebSocketStream<S>, Message>,
    mut stream: SplitStream<WebSocketStream<S>>,
    shared: Arc<Shared>,
    events: EventSender,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let verdict = stream.next().await;
    let reason = match verdict {
        Some(Ok(Message::Text(text))) if text.as_str() == WELCOME => {
            let (outbox, inbox) = mpsc::unbounded_channel();
            lock(&shared.peers).insert(local, outbox);
            let _ = events.send(TransportEvent::PeerConnected(local));

            let reason = pump(sink, stream, inbox).await;
            lock(&shared.peers).remove(&local);
            reason
        }
        Some(Ok(Message::Close(frame))) => {
            frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default()
        }
        _ => String::new(),
    };

    // The socket is gone, so the next start_client may claim the transport.
    shared.release();
    let _ = events.send(TransportEvent::PeerDisconnected { peer: local, reason });
}

/// Forwards queued outbound frames and watches for the socket to close.
/// Returns the disconnect reason: the close frame's reason from the remote
/// side, the reason we sent when closing locally, or empty.
async fn pump<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut stream: SplitStream<WebSocketStream<S>>,
    mut inbox: mpsc::UnboundedReceiver<Message>,
) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            outbound = inbox.recv() => {
                let Some(msg) = outbound else {
                    return String::new();
                };
                let closing = match &msg {
                    Message::Close(frame) => Some(
                        frame.as_ref().map(|f| f.reason.as_str().to_owned()).unwrap_or_default(),
                    ),
                    _ => None,
                };
                let sent = sink.send(msg).await;
                if let Some(reason) = closing {
                    return reason;
                }
                if sent.is_err() {
                    return String::new();
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(frame))) => {
                    return frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default();
                }
                Some(Ok(_)) => continue, // game traffic isn't ours
                Some(Err(_)) | None => return String::new(),
            },
        }
    }
}
