/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is already running as a host or client.
    #[error("transport already started")]
    AlreadyStarted,

    /// The coordinates can't be used by this transport
    /// (e.g. a relay code handed to a direct-address transport).
    #[error("unsupported coordinates: {0}")]
    UnsupportedCoordinates(String),

    /// Binding the listen socket failed.
    #[error("listen failed: {0}")]
    ListenFailed(#[source] std::io::Error),

    /// Opening the outbound connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The peer isn't known to this transport.
    #[error("unknown peer {0}")]
    UnknownPeer(crate::PeerId),

    /// The event receiver was dropped; nobody is listening any more.
    #[error("event channel closed")]
    EventsClosed,
}
