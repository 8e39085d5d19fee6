use std::sync::Arc;

use tether_protocol::{ApprovalRequest, ApprovalResponse, ConnectStatus};
use tether_session::SessionDirectory;
use tether_transport::{PeerId, Transport};
use tracing::{debug, info, warn};

use super::{ConnectionState, Flow, Hosting, StateHooks, StateKind, hosting, online};
use crate::ConnectionMethod;
use crate::context::{Context, InternalEvent};

/// Waiting for the transport to start listening.
pub(crate) struct StartingHost {
    method: ConnectionMethod,
}

impl StartingHost {
    pub(crate) fn new(method: ConnectionMethod) -> Self {
        Self { method }
    }
}

impl StateHooks for StartingHost {
    const KIND: StateKind = StateKind::StartingHost;

    fn enter<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) -> Flow {
        let method = self.method.clone();
        let transport = Arc::clone(&cx.transport);
        cx.spawn(async move { InternalEvent::HostStarted(method.setup_host(&*transport).await) });
        Flow::Stay
    }

    fn on_internal<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        event: InternalEvent,
    ) -> Flow {
        match event {
            InternalEvent::HostStarted(Ok(())) => {
                debug!("host setup done, waiting for listen");
                Flow::Stay
            }
            InternalEvent::HostStarted(Err(e)) => {
                warn!(error = %e, "host setup failed");
                online::fail(cx, ConnectStatus::StartHostFailed)
            }
            _ => Flow::Stay,
        }
    }

    /// The host is a player too: it registers its own record before anyone
    /// else can be counted.
    fn on_listen_started<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        let peer = cx.transport.local_peer_id().unwrap_or(PeerId::HOST);
        let display_name = self.method.payload().display_name.clone();
        cx.registry.admit(cx.player_id, peer, display_name);

        info!(coordinates = %self.method.coordinates(), "listening");
        cx.publish(ConnectStatus::Success);
        Flow::Goto(ConnectionState::Hosting(Hosting::new(self.method.clone())))
    }

    fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
        reason: &str,
    ) -> Flow {
        hosting::release_peer(cx, peer, reason);
        Flow::Stay
    }

    fn on_listen_stopped<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        warn!("listening stopped before the host came up");
        online::fail(cx, ConnectStatus::StartHostFailed)
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

    fn approval_check<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        request: &ApprovalRequest,
    ) -> ApprovalResponse {
        hosting::approve(cx, request)
    }
}
