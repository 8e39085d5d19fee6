//! Connection methods: how one handshake is performed.
//!
//! A [`ConnectionMethod`] bundles what a connecting state needs to talk to
//! the transport: which side we're on, where to connect, and what to
//! present to the host. It's built from the directory's answer in
//! `LobbyConnecting` and carried through every later state so a client
//! that drops can find its way back.

use tether_protocol::{Codec, ConnectionPayload, JsonCodec};
use tether_session::{SessionDirectory, SessionId, SessionTicket};
use tether_transport::{Coordinates, Transport};
use tracing::{debug, info, warn};

use crate::TetherError;

/// Which side of the session this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Role {
    Host,
    Client,
}

/// Outcome of asking the directory where a dropped session went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconnection {
    /// Try connecting here.
    Ready(Coordinates),
    /// Nothing usable this time; wait and ask again.
    Retry,
    /// Asking again won't help.
    Abandon,
}

/// Coordinates, payload, and role for one handshake.
#[derive(Debug, Clone)]
pub struct ConnectionMethod {
    role: Role,
    session_id: Option<SessionId>,
    coordinates: Coordinates,
    payload: ConnectionPayload,
}

impl ConnectionMethod {
    /// A method for hosting the session described by `ticket`.
    pub fn host(ticket: SessionTicket, payload: ConnectionPayload) -> Self {
        Self::from_ticket(Role::Host, ticket, payload)
    }

    /// A method for joining the session described by `ticket`.
    pub fn client(ticket: SessionTicket, payload: ConnectionPayload) -> Self {
        Self::from_ticket(Role::Client, ticket, payload)
    }

    /// A client method with no directory behind it. It can connect, but a
    /// dropped connection can't be re-located.
    pub fn direct(coordinates: Coordinates, payload: ConnectionPayload) -> Self {
        Self {
            role: Role::Client,
            session_id: None,
            coordinates,
            payload,
        }
    }

    fn from_ticket(role: Role, ticket: SessionTicket, payload: ConnectionPayload) -> Self {
        Self {
            role,
            session_id: Some(ticket.session_id),
            coordinates: ticket.coordinates,
            payload,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    pub fn payload(&self) -> &ConnectionPayload {
        &self.payload
    }

    pub(crate) fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.coordinates = coordinates;
    }

    /// Starts listening at this method's coordinates.
    pub async fn setup_host<T: Transport>(&self, transport: &T) -> Result<(), TetherError> {
        info!(coordinates = %self.coordinates, "starting host");
        transport.start_host(&self.coordinates).await?;
        Ok(())
    }

    /// Connects to this method's coordinates, presenting the payload.
    pub async fn setup_client<T: Transport>(&self, transport: &T) -> Result<(), TetherError> {
        let payload = JsonCodec.encode(&self.payload)?;
        info!(
            coordinates = %self.coordinates,
            player_id = %self.payload.player_id,
            "connecting as client"
        );
        transport.start_client(&self.coordinates, payload).await?;
        Ok(())
    }

    /// Asks the directory where this method's session lives now.
    pub async fn resolve_reconnection<D: SessionDirectory>(&self, directory: &D) -> Reconnection {
        let Some(session_id) = &self.session_id else {
            warn!("no session id to reconnect to");
            return Reconnection::Abandon;
        };
        match directory.reconnect(session_id).await {
            Ok(Some(coordinates)) => Reconnection::Ready(coordinates),
            Ok(None) => {
                debug!(%session_id, "session not located this attempt");
                Reconnection::Retry
            }
            Err(e) if e.is_transient() => {
                debug!(%session_id, error = %e, "directory unavailable, will retry");
                Reconnection::Retry
            }
            Err(e) => {
                warn!(%session_id, error = %e, "directory refused reconnect");
                Reconnection::Abandon
            }
        }
    }
}
