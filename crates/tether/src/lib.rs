//! # Tether
//!
//! Host/client connection lifecycle for real-time sessions.
//!
//! Tether takes a peer from "not connected" to hosting or joining a session
//! and back again, over a transport and a session directory you supply. It
//! owns the parts that are easy to get subtly wrong:
//!
//! - a state machine where exactly one state is active and every timer a
//!   state starts dies with it
//! - connect timeouts and a bounded client reconnect loop
//! - host-side approval: capacity, protocol version, and duplicate-identity
//!   checks, keyed on a durable player identifier
//! - a status stream ([`ConnectStatus`](tether_protocol::ConnectStatus))
//!   for the gameplay and UI layers
//!
//! ## How it fits together
//!
//! ```text
//! your game / UI  ←── status, reconnect progress, peer events
//!       │
//!       ↓ start_as_host / start_as_client / request_shutdown
//! ConnectionManager (this crate) ──→ SessionDirectory (tether-session)
//!       ↕
//! Transport (tether-transport)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! let (events_tx, events_rx) = event_channel();
//! let transport = Arc::new(WebSocketTransport::new(events_tx));
//! let directory = Arc::new(DirectAddressDirectory::new("127.0.0.1:7777"));
//!
//! let handle = ConnectionManagerBuilder::new()
//!     .build(transport, directory, events_rx)
//!     .spawn();
//! let mut status = handle.subscribe_status();
//!
//! handle.start_as_client("Alice").await?;
//! while let Ok(s) = status.recv().await {
//!     println!("status: {s}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod error;
mod handle;
mod manager;
mod method;
mod state;

pub use config::ConnectionConfig;
pub use error::TetherError;
pub use handle::ConnectionHandle;
pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use method::{ConnectionMethod, Reconnection, Role};
pub use state::StateKind;

/// Everything needed to wire up a connection manager.
pub mod prelude {
    pub use crate::{
        ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionManagerBuilder,
        StateKind, TetherError,
    };
    pub use tether_protocol::{
        ApprovalRequest, ApprovalResponse, ConnectStatus, ConnectionPayload, PeerEvent, PlayerId,
        ReconnectProgress, RejectReason,
    };
    pub use tether_session::{
        DirectAddressDirectory, DirectoryError, SessionDirectory, SessionId, SessionPlayerRecord,
        SessionTicket,
    };
    pub use tether_timer::RetryPolicy;
    pub use tether_transport::{
        Coordinates, PeerId, Transport, TransportError, TransportEvent, event_channel,
    };
    #[cfg(feature = "websocket")]
    pub use tether_transport::WebSocketTransport;
}
