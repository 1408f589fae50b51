//! Error types for the pub/sub layer.

use peril_protocol::ProtocolError;
use peril_transport::TransportError;

/// Errors that can occur while talking to the broker.
///
/// The broker-refusal variants carry the broker's reply code and text so
/// a log line is enough to tell a misnamed exchange (404) from a
/// conflicting declaration (406).
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Declaring or binding a queue failed. Indicates misconfiguration, so
    /// it is never retried.
    #[error("topology error ({code}): {message}")]
    Topology { code: u16, message: String },

    /// The broker refused a publish.
    #[error("publish refused ({code}): {message}")]
    Publish { code: u16, message: String },

    /// The broker refused to start a consumer.
    #[error("consume refused ({code}): {message}")]
    Consume { code: u16, message: String },

    /// The broker refused an ack or nack.
    #[error("acknowledgment refused ({code}): {message}")]
    Acknowledge { code: u16, message: String },

    /// Opening or closing a channel was refused.
    #[error("channel refused ({code}): {message}")]
    Channel { code: u16, message: String },

    /// The broker did not accept the connection.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The broker answered with a frame that does not fit the request.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The connection is gone; nothing more can be sent or received on it.
    #[error("connection closed")]
    ConnectionClosed,

    /// A payload or frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PubSubError {
    /// `true` for a declare/bind failure.
    pub fn is_topology(&self) -> bool {
        matches!(self, Self::Topology { .. })
    }

    /// The broker's reply code, for refusals.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Topology { code, .. }
            | Self::Publish { code, .. }
            | Self::Consume { code, .. }
            | Self::Acknowledge { code, .. }
            | Self::Channel { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Builds the refusal variant that fits a given kind of request.
pub(crate) type Refusal = fn(u16, String) -> PubSubError;

pub(crate) fn topology(code: u16, message: String) -> PubSubError {
    PubSubError::Topology { code, message }
}

pub(crate) fn publish(code: u16, message: String) -> PubSubError {
    PubSubError::Publish { code, message }
}

pub(crate) fn consume(code: u16, message: String) -> PubSubError {
    PubSubError::Consume { code, message }
}

pub(crate) fn acknowledge(code: u16, message: String) -> PubSubError {
    PubSubError::Acknowledge { code, message }
}

pub(crate) fn channel(code: u16, message: String) -> PubSubError {
    PubSubError::Channel { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_only_for_refusals() {
        assert_eq!(topology(406, "x".into()).reply_code(), Some(406));
        assert_eq!(PubSubError::ConnectionClosed.reply_code(), None);
    }

    #[test]
    fn test_is_topology() {
        assert!(topology(404, "no exchange".into()).is_topology());
        assert!(!publish(404, "no exchange".into()).is_topology());
    }
}
