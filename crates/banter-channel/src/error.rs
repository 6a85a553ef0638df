//! Transport errors.

use thiserror::Error;

/// Failures surfaced by an [`EventChannels`](crate::EventChannels) transport.
///
/// None of these are fatal to the engine: subscription state degrades to
/// "push updates stopped" and the connectivity watch tells the rest of the
/// system. Transports never retry on their own.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport handshake was rejected or could not be established.
    #[error("channel handshake failed: {0}")]
    Handshake(String),

    /// The transport is not connected; subscribe/unsubscribe cannot reach
    /// the wire.
    #[error("channel transport disconnected")]
    Disconnected,

    /// The transport was shut down for good.
    #[error("channel transport closed")]
    Closed,
}

impl ChannelError {
    /// Stable lowercase tag for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            ChannelError::Handshake("401".to_owned()).to_string(),
            "channel handshake failed: 401"
        );
        assert_eq!(ChannelError::Disconnected.to_string(), "channel transport disconnected");
    }

    #[test]
    fn kinds_are_distinct() {
        assert_eq!(ChannelError::Handshake(String::new()).kind(), "handshake");
        assert_eq!(ChannelError::Disconnected.kind(), "disconnected");
        assert_eq!(ChannelError::Closed.kind(), "closed");
    }
}
