//! Codec trait and implementations for the connect payload.
//!
//! The connect payload is the only structured data this layer puts on the
//! wire: a client sends it once, the host decodes it during approval. The
//! state machine doesn't care how it's serialized, only that something
//! implements [`Codec`].

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside the connection
/// manager, which runs as its own Tokio task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Like [`decode`](Self::decode), but refuses inputs over `limit` bytes
    /// before looking at them. Hosts use this on untrusted connect payloads.
    fn decode_bounded<T: DeserializeOwned>(
        &self,
        data: &[u8],
        limit: usize,
    ) -> Result<T, ProtocolError> {
        if data.len() > limit {
            return Err(ProtocolError::PayloadTooLarge {
                size: data.len(),
                limit,
            });
        }
        self.decode(data)
    }
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use tether_protocol::{Codec, ConnectionPayload, JsonCodec, PlayerId};
///
/// let payload = ConnectionPayload::new(PlayerId::random(), "Alice");
/// let bytes = JsonCodec.encode(&payload).unwrap();
/// let decoded: ConnectionPayload = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(payload, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
