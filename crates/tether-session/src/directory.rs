//! Session directory hook for finding where a session lives.
//!
//! Tether doesn't do matchmaking. Creating a session, picking one to join,
//! and tracking where a session moved to are the job of whatever lobby or
//! relay service you use. Tether defines the [`SessionDirectory`] trait and
//! calls it at the right moments of the connection lifecycle.
//!
//! [`DirectAddressDirectory`] is the trivial implementation: every session
//! is a fixed `host:port`. Useful on a LAN and in tests.

use std::fmt;
use std::future::Future;

use tether_transport::Coordinates;
use tracing::debug;

use crate::DirectoryError;

/// Identifier of a session in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A session the directory created or found, and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub session_id: SessionId,
    pub coordinates: Coordinates,
}

/// Creates, finds, and re-locates sessions.
///
/// `Send + Sync + 'static` because the connection manager shares the
/// directory with the short-lived tasks it spawns for each lookup.
///
/// # Example
///
/// ```rust
/// use tether_session::{DirectoryError, SessionDirectory, SessionId, SessionTicket};
/// use tether_transport::Coordinates;
///
/// /// Always hands out the same relay code.
/// struct FixedRelay;
///
/// impl SessionDirectory for FixedRelay {
///     async fn create_session(
///         &self,
///         name: &str,
///         _capacity: usize,
///     ) -> Result<SessionTicket, DirectoryError> {
///         Ok(SessionTicket {
///             session_id: SessionId(name.to_owned()),
///             coordinates: Coordinates::Relay { code: "JOINME".into() },
///         })
///     }
///
///     async fn find_and_join_session(&self) -> Result<Option<SessionTicket>, DirectoryError> {
///         Ok(None)
///     }
///
///     async fn reconnect(
///         &self,
///         _session_id: &SessionId,
///     ) -> Result<Option<Coordinates>, DirectoryError> {
///         Ok(None)
///     }
/// }
/// ```
pub trait SessionDirectory: Send + Sync + 'static {
    /// Registers a new session hosted by the caller.
    fn create_session(
        &self,
        name: &str,
        capacity: usize,
    ) -> impl Future<Output = Result<SessionTicket, DirectoryError>> + Send;

    /// Picks a session for the caller to join.
    ///
    /// `Ok(None)` means the directory worked but had nothing to offer.
    fn find_and_join_session(
        &self,
    ) -> impl Future<Output = Result<Option<SessionTicket>, DirectoryError>> + Send;

    /// Looks up where a session lives now, for a client trying to get back
    /// in after a drop.
    ///
    /// `Ok(None)` means the session couldn't be located this time; the
    /// caller may try again later.
    fn reconnect(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<Coordinates>, DirectoryError>> + Send;
}

/// A directory where every session is one fixed address.
#[derive(Debug, Clone)]
pub struct DirectAddressDirectory {
    listen: String,
    connect: String,
}

impl DirectAddressDirectory {
    /// Hosts listen on `addr` and clients connect to it.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            listen: addr.clone(),
            connect: addr,
        }
    }

    /// Hosts listen on `listen` (e.g. `0.0.0.0:7777`) while clients connect
    /// to `connect` (e.g. `192.168.1.20:7777`).
    pub fn with_addresses(listen: impl Into<String>, connect: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            connect: connect.into(),
        }
    }

    fn session_id(&self) -> SessionId {
        SessionId(self.connect.clone())
    }
}

impl SessionDirectory for DirectAddressDirectory {
    async fn create_session(
        &self,
        name: &str,
        capacity: usize,
    ) -> Result<SessionTicket, DirectoryError> {
        if capacity == 0 {
            return Err(DirectoryError::Rejected(
                "capacity must be at least 1".into(),
            ));
        }
        debug!(name, capacity, listen = %self.listen, "direct session created");
        Ok(SessionTicket {
            session_id: self.session_id(),
            coordinates: Coordinates::Address(self.listen.clone()),
        })
    }

    async fn find_and_join_session(&self) -> Result<Option<SessionTicket>, DirectoryError> {
        Ok(Some(SessionTicket {
            session_id: self.session_id(),
            coordinates: Coordinates::Address(self.connect.clone()),
        }))
    }

    async fn reconnect(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Coordinates>, DirectoryError> {
        if *session_id != self.session_id() {
            return Ok(None);
        }
        Ok(Some(Coordinates::Address(self.connect.clone())))
    }
}
