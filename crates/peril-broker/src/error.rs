//! Error types for the broker.

use peril_protocol::{ChannelId, DeliveryTag, ProtocolError, reply_code};
use peril_transport::TransportError;

/// Errors the broker reports for a client request, plus the I/O failures
/// that end a client connection.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Publishing or binding to an exchange that was never provisioned.
    #[error("exchange '{0}' not found")]
    ExchangeNotFound(String),

    /// Binding or consuming from a queue that was never declared (or was
    /// auto-deleted).
    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    /// A transient queue is exclusive to the connection that declared it.
    #[error("queue '{0}' is locked by another connection")]
    ResourceLocked(String),

    /// A declaration disagrees with what already exists.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The tag was never issued, was already settled, or belongs to a
    /// different channel.
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(DeliveryTag),

    #[error("channel {0} is not open")]
    ChannelNotOpen(ChannelId),

    #[error("channel {0} is already open")]
    ChannelAlreadyOpen(ChannelId),

    /// The client announced a protocol version this broker does not speak.
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u32),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BrokerError {
    /// The reply code sent to the client for this error.
    pub fn reply_code(&self) -> u16 {
        match self {
            Self::ExchangeNotFound(_) | Self::QueueNotFound(_) | Self::UnknownDeliveryTag(_) => {
                reply_code::NOT_FOUND
            }
            Self::ResourceLocked(_) => reply_code::RESOURCE_LOCKED,
            Self::PreconditionFailed(_) => reply_code::PRECONDITION_FAILED,
            Self::ChannelNotOpen(_) | Self::ChannelAlreadyOpen(_) => reply_code::CHANNEL_ERROR,
            Self::VersionMismatch(_) => reply_code::NOT_ALLOWED,
            Self::Transport(_) | Self::Protocol(_) => reply_code::SYNTAX_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_codes() {
        assert_eq!(BrokerError::QueueNotFound("q".into()).reply_code(), 404);
        assert_eq!(BrokerError::ResourceLocked("q".into()).reply_code(), 405);
        assert_eq!(BrokerError::PreconditionFailed("x".into()).reply_code(), 406);
        assert_eq!(BrokerError::ChannelNotOpen(ChannelId(1)).reply_code(), 504);
        assert_eq!(BrokerError::VersionMismatch(9).reply_code(), 530);
    }

    #[test]
    fn test_messages_name_the_resource() {
        let err = BrokerError::ExchangeNotFound("peril_topic".into());
        assert!(err.to_string().contains("peril_topic"));
    }
}
