//! Connect status and the disconnect-reason encoding.
//!
//! [`ConnectStatus`] is what the connection state machine tells the outside
//! world ("you're connected", "the server is full", ...). The same value
//! doubles as a structured disconnect reason: a host that turns a client
//! away attaches the status as a short string to the disconnect, and the
//! client parses it back.
//!
//! The transport never sees the enum. It carries an opaque `String`, and
//! this module is the only place that string is produced or interpreted.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Connection status published to listeners on every meaningful change.
///
/// The string form of each variant is its name (`"ServerFull"`), which is
/// also the wire form used as a disconnect reason.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
pub enum ConnectStatus {
    /// Nothing has happened yet.
    #[default]
    Undefined,
    /// A start request was accepted and the session lookup is underway.
    Connecting,
    /// Connected (client) or listening (host).
    Success,
    /// The connection dropped and the client is trying to get back in.
    Reconnecting,
    /// The host is at capacity.
    ServerFull,
    /// Client and host speak different protocol versions.
    IncompatibleVersion,
    /// The same player is already connected from somewhere else.
    LoggedInAgain,
    /// The local user asked to leave.
    UserRequestedDisconnect,
    /// Connection lost with nothing more specific to say.
    GenericDisconnect,
    /// The host could not be started.
    StartHostFailed,
    /// The client could not connect.
    StartClientFailed,
    /// The host closed the session on purpose.
    HostEndedSession,
}

impl ConnectStatus {
    /// Encodes this status as a disconnect reason string.
    pub fn to_reason(self) -> &'static str {
        self.into()
    }

    /// Parses a disconnect reason received from the transport.
    ///
    /// Returns `None` for an empty reason and for anything that isn't one of
    /// our statuses (transports produce free-form reasons of their own, e.g.
    /// "connection reset"). `None` means "unstructured disconnect".
    /// `Undefined` is never a meaningful reason and also maps to `None`.
    pub fn from_reason(reason: &str) -> Option<Self> {
        let reason = reason.trim();
        if reason.is_empty() {
            return None;
        }
        match reason.parse::<Self>() {
            Ok(Self::Undefined) | Err(_) => None,
            Ok(status) => Some(status),
        }
    }

    /// Returns `true` for statuses that end a connection attempt or session.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::Undefined | Self::Connecting | Self::Success | Self::Reconnecting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_reason_is_variant_name() {
        assert_eq!(ConnectStatus::ServerFull.to_reason(), "ServerFull");
        assert_eq!(
            ConnectStatus::HostEndedSession.to_reason(),
            "HostEndedSession"
        );
        assert_eq!(ConnectStatus::LoggedInAgain.to_string(), "LoggedInAgain");
    }

    #[test]
    fn test_from_reason_parses_every_structured_status() {
        let all = [
            ConnectStatus::Connecting,
            ConnectStatus::Success,
            ConnectStatus::Reconnecting,
            ConnectStatus::ServerFull,
            ConnectStatus::IncompatibleVersion,
            ConnectStatus::LoggedInAgain,
            ConnectStatus::UserRequestedDisconnect,
            ConnectStatus::GenericDisconnect,
            ConnectStatus::StartHostFailed,
            ConnectStatus::StartClientFailed,
            ConnectStatus::HostEndedSession,
        ];
        for status in all {
            assert_eq!(
                ConnectStatus::from_reason(status.to_reason()),
                Some(status),
                "{status} should survive the reason boundary"
            );
        }
    }

    #[test]
    fn test_from_reason_empty_is_unstructured() {
        assert_eq!(ConnectStatus::from_reason(""), None);
        assert_eq!(ConnectStatus::from_reason("   "), None);
    }

    #[test]
    fn test_from_reason_transport_text_is_unstructured() {
        assert_eq!(
            ConnectStatus::from_reason("Disconnected due to host shutting down."),
            None
        );
        assert_eq!(ConnectStatus::from_reason("serverfull"), None);
    }

    #[test]
    fn test_from_reason_undefined_is_unstructured() {
        assert_eq!(ConnectStatus::from_reason("Undefined"), None);
    }

    #[test]
    fn test_is_terminal() {
        assert!(!ConnectStatus::Success.is_terminal());
        assert!(!ConnectStatus::Reconnecting.is_terminal());
        assert!(ConnectStatus::ServerFull.is_terminal());
        assert!(ConnectStatus::UserRequestedDisconnect.is_terminal());
    }

    #[test]
    fn test_default_is_undefined() {
        assert_eq!(ConnectStatus::default(), ConnectStatus::Undefined);
    }
}
