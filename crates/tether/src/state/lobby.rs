use std::sync::Arc;

use tether_protocol::ConnectStatus;
use tether_session::SessionDirectory;
use tether_transport::Transport;
use tracing::{info, warn};

use super::{ClientConnecting, ConnectionState, Flow, StartingHost, StateHooks, StateKind, online};
use crate::context::{Context, InternalEvent};
use crate::{ConnectionMethod, Role};

/// Asking the session directory for somewhere to host or join.
///
/// One request, no retries: a failure ends in `Offline` with
/// `StartHostFailed` or `StartClientFailed`.
pub(crate) struct LobbyConnecting {
    role: Role,
    display_name: String,
}

impl LobbyConnecting {
    pub(crate) fn new(role: Role, display_name: String) -> Self {
        Self { role, display_name }
    }

    fn failed_status(&self) -> ConnectStatus {
        match self.role {
            Role::Host => ConnectStatus::StartHostFailed,
            Role::Client => ConnectStatus::StartClientFailed,
        }
    }
}

impl StateHooks for LobbyConnecting {
    const KIND: StateKind = StateKind::LobbyConnecting;

    fn enter<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) -> Flow {
        cx.publish(ConnectStatus::Connecting);

        let directory = Arc::clone(&cx.directory);
        match self.role {
            Role::Host => {
                let name = cx.config.session_name.clone();
                let capacity = cx.config.max_players;
                info!(%name, capacity, "creating session");
                cx.spawn(async move {
                    InternalEvent::SessionCreated(directory.create_session(&name, capacity).await)
                });
            }
            Role::Client => {
                info!("looking for a session to join");
                cx.spawn(async move {
                    InternalEvent::SessionFound(directory.find_and_join_session().await)
                });
            }
        }
        Flow::Stay
    }

    fn on_internal<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        event: InternalEvent,
    ) -> Flow {
        let ticket = match event {
            InternalEvent::SessionCreated(Ok(ticket))
            | InternalEvent::SessionFound(Ok(Some(ticket))) => ticket,
            InternalEvent::SessionFound(Ok(None)) => {
                warn!("directory has no session to join");
                return online::fail(cx, self.failed_status());
            }
            InternalEvent::SessionCreated(Err(e)) | InternalEvent::SessionFound(Err(e)) => {
                warn!(role = %self.role, error = %e, "session directory failed");
                return online::fail(cx, self.failed_status());
            }
            _ => return Flow::Stay,
        };

        info!(session_id = %ticket.session_id, coordinates = %ticket.coordinates, "session ready");
        let payload = cx.local_payload(&self.display_name);
        let next = match self.role {
            Role::Host => ConnectionState::StartingHost(StartingHost::new(
                ConnectionMethod::host(ticket, payload),
            )),
            Role::Client => ConnectionState::ClientConnecting(ClientConnecting::new(
                ConnectionMethod::client(ticket, payload),
            )),
        };
        Flow::Goto(next)
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
