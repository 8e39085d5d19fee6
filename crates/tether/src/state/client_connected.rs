use tether_protocol::ConnectStatus;
use tether_session::SessionDirectory;
use tether_transport::{PeerId, Transport};
use tracing::info;

use super::{ClientReconnecting, ConnectionState, Flow, StateHooks, StateKind, online};
use crate::ConnectionMethod;
use crate::context::Context;

/// In the session as a client. No timers; this state only waits for the
/// connection to end.
pub(crate) struct ClientConnected {
    method: ConnectionMethod,
}

impl ClientConnected {
    pub(crate) fn new(method: ConnectionMethod) -> Self {
        Self { method }
    }
}

impl StateHooks for ClientConnected {
    const KIND: StateKind = StateKind::ClientConnected;

    fn enter<T: Transport, D: SessionDirectory>(&mut self, _cx: &mut Context<T, D>) -> Flow {
        info!(coordinates = %self.method.coordinates(), "client session active");
        Flow::Stay
    }

    /// A structured reason (kicked, host ended the session) is final. An
    /// unexplained drop is treated as network trouble and retried.
    fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
        reason: &str,
    ) -> Flow {
        if !cx.is_local(peer) {
            return Flow::Stay;
        }
        match ConnectStatus::from_reason(reason) {
            Some(status) => {
                info!(%status, "disconnected by host");
                online::fail(cx, status)
            }
            None => {
                info!(reason, "connection lost, reconnecting");
                cx.publish(ConnectStatus::Reconnecting);
                Flow::Goto(ConnectionState::ClientReconnecting(ClientReconnecting::new(
                    self.method.clone(),
                )))
            }
        }
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
