use std::sync::Arc;

use tether_protocol::ConnectStatus;
use tether_session::SessionDirectory;
use tether_timer::RetryTimer;
use tether_transport::{PeerId, Transport};
use tracing::{debug, info, warn};

use super::{ClientConnected, ConnectionState, Flow, StateHooks, StateKind, online};
use crate::ConnectionMethod;
use crate::context::{Context, InternalEvent};

/// Handshaking with the host, bounded by the connect timeout.
pub(crate) struct ClientConnecting {
    method: ConnectionMethod,
    timeout: RetryTimer,
}

impl ClientConnecting {
    pub(crate) fn new(method: ConnectionMethod) -> Self {
        Self {
            method,
            timeout: RetryTimer::new(),
        }
    }
}

impl StateHooks for ClientConnecting {
    const KIND: StateKind = StateKind::ClientConnecting;

    fn enter<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) -> Flow {
        let after = cx.config.connect_timeout;
        cx.schedule(&mut self.timeout, after, InternalEvent::ConnectTimeout);

        let method = self.method.clone();
        let transport = Arc::clone(&cx.transport);
        cx.spawn(async move { InternalEvent::ClientStarted(method.setup_client(&*transport).await) });
        Flow::Stay
    }

    fn exit<T: Transport, D: SessionDirectory>(&mut self, _cx: &mut Context<T, D>) {
        self.timeout.cancel();
    }

    fn on_internal<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        event: InternalEvent,
    ) -> Flow {
        match event {
            InternalEvent::ClientStarted(Ok(())) => {
                debug!("connect payload sent, waiting for host");
                Flow::Stay
            }
            InternalEvent::ClientStarted(Err(e)) => {
                warn!(error = %e, "client setup failed");
                online::fail(cx, ConnectStatus::StartClientFailed)
            }
            InternalEvent::ConnectTimeout => {
                warn!(timeout = ?cx.config.connect_timeout, "connect timed out");
                online::fail(cx, ConnectStatus::StartClientFailed)
            }
            _ => Flow::Stay,
        }
    }

    fn on_peer_connected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
    ) -> Flow {
        if !cx.is_local(peer) {
            return Flow::Stay;
        }
        info!(%peer, "connected to host");
        cx.publish(ConnectStatus::Success);
        Flow::Goto(ConnectionState::ClientConnected(ClientConnected::new(
            self.method.clone(),
        )))
    }

    /// Turned away or dropped mid-handshake. A structured reason from the
    /// host is passed on as-is; anything else is a generic failure.
    fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
        reason: &str,
    ) -> Flow {
        if !cx.is_local(peer) {
            return Flow::Stay;
        }
        let status = ConnectStatus::from_reason(reason).unwrap_or(ConnectStatus::StartClientFailed);
        warn!(%peer, reason, %status, "disconnected while connecting");
        online::fail(cx, status)
    }

    fn on_transport_failure<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        online::on_transport_failure(cx)
    }

    fn on_user_requested_shutdown<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        online::on_user_requested_shutdown(cx)
    }
}
