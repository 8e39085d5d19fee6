use tether_protocol::{ApprovalRequest, ApprovalResponse, ConnectStatus, PeerEvent};
use tether_session::SessionDirectory;
use tether_transport::{PeerId, Transport};
use tracing::{debug, info, warn};

use super::{Flow, StateHooks, StateKind, online};
use crate::ConnectionMethod;
use crate::context::Context;

/// Runs the approval check against the registry. Shared by both host
/// states.
pub(super) fn approve<T, D>(cx: &mut Context<T, D>, request: &ApprovalRequest) -> ApprovalResponse {
    cx.registry.approve(request)
}

/// Marks the player on `peer` as gone. The record stays (so it can come
/// back) but no longer counts as connected. Shared by both host states,
/// since a peer approved before listening started can also drop then.
pub(super) fn release_peer<T, D>(cx: &mut Context<T, D>, peer: PeerId, reason: &str) {
    let event = cx.registry.disconnect_peer(peer).map(|record| PeerEvent {
        peer,
        player_id: Some(record.player_id),
        display_name: Some(record.display_name.clone()),
        status: ConnectStatus::GenericDisconnect,
    });
    match event {
        Ok(event) => {
            info!(%peer, reason, "peer left");
            cx.publish_peer(event);
        }
        Err(e) => debug!(%peer, error = %e, "untracked peer dropped"),
    }
}

/// Listening and admitting players.
pub(crate) struct Hosting {
    method: ConnectionMethod,
}

impl Hosting {
    pub(crate) fn new(method: ConnectionMethod) -> Self {
        Self { method }
    }
}

impl StateHooks for Hosting {
    const KIND: StateKind = StateKind::Hosting;

    fn enter<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) -> Flow {
        info!(
            coordinates = %self.method.coordinates(),
            capacity = cx.registry.rules().capacity,
            "hosting session"
        );
        Flow::Stay
    }

    /// The record was written during approval, so a connected peer is
    /// always known here.
    fn on_peer_connected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
    ) -> Flow {
        if cx.transport.local_peer_id() == Some(peer) {
            return Flow::Stay;
        }
        let event = cx.registry.by_peer(peer).map(|record| PeerEvent {
            peer,
            player_id: Some(record.player_id),
            display_name: Some(record.display_name.clone()),
            status: ConnectStatus::Success,
        });
        match event {
            Some(event) => {
                info!(%peer, connected = cx.registry.connected_count(), "peer joined");
                cx.publish_peer(event);
            }
            None => warn!(%peer, "peer connected without an approval record"),
        }
        Flow::Stay
    }

    fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
        reason: &str,
    ) -> Flow {
        release_peer(cx, peer, reason);
        Flow::Stay
    }

    fn on_listen_stopped<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        warn!("host stopped listening");
        online::fail(cx, ConnectStatus::GenericDisconnect)
    }

    fn on_transport_failure<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        online::on_transport_failure(cx)
    }

    /// Tells every remote player the session is over before going offline.
    fn on_user_requested_shutdown<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        let peers: Vec<PeerId> = cx
            .registry
            .connected()
            .filter(|record| record.player_id != cx.player_id)
            .map(|record| record.peer)
            .collect();
        if !peers.is_empty() {
            info!(count = peers.len(), "ending session for connected peers");
            cx.kick(peers, ConnectStatus::HostEndedSession.to_reason());
        }
        online::on_user_requested_shutdown(cx)
    }

    fn approval_check<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        request: &ApprovalRequest,
    ) -> ApprovalResponse {
        approve(cx, request)
    }
}
