//! Unified error type for Peril.

use peril_broker::BrokerError;
use peril_game::{CommandError, GameError};
use peril_protocol::ProtocolError;
use peril_pubsub::PubSubError;
use peril_transport::TransportError;

/// Top-level error wrapping every layer's error.
///
/// `?` converts each layer's error through the generated `From` impls.
#[derive(Debug, thiserror::Error)]
pub enum PerilError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Topology, publish or connection trouble talking to the broker.
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    #[error(transparent)]
    Game(#[from] GameError),
}

impl From<CommandError> for PerilError {
    fn from(err: CommandError) -> Self {
        Self::Game(GameError::Command(err))
    }
}

impl PerilError {
    /// The rejected command, if this error is just bad user input.
    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            Self::Game(GameError::Command(e)) => Some(e),
            _ => None,
        }
    }
}
