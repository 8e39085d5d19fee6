//! Protocol vocabulary for Tether.
//!
//! This crate defines what the connection state machine and its peers say
//! to each other, independent of any transport:
//!
//! - **Status** ([`ConnectStatus`]): what listeners are told, and the
//!   structured disconnect reason a host attaches when turning a client away.
//! - **Identity and payload** ([`PlayerId`], [`ConnectionPayload`]): who a
//!   client claims to be when it connects.
//! - **Approval** ([`ApprovalRequest`], [`ApprovalResponse`],
//!   [`RejectReason`]): the host's admit/reject protocol.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how the payload becomes bytes.
//!
//! ```text
//! Transport (opaque bytes + reason strings) → Protocol (typed) → State machine
//! ```

mod codec;
mod error;
mod status;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use status::ConnectStatus;
pub use types::{
    ApprovalRequest, ApprovalResponse, ConnectionPayload, PROTOCOL_VERSION, PeerEvent,
    PlayerId, ReconnectProgress, RejectReason,
};
