//! Outbound game traffic.

use std::sync::Arc;

use peril_game::{ArmyMove, GameLog, PlayingState, RecognitionOfWar};
use peril_protocol::routing::EventCategory;
use peril_pubsub::{Channel, Connection, PubSubError, publish};
use serde::Serialize;

/// One channel used for every publish a process makes, tagged with the
/// publishing player's name.
///
/// Clones share the channel; concurrent publishes are serialized by the
/// connection's write lock.
#[derive(Clone)]
pub struct Publisher {
    channel: Arc<Channel>,
    username: Arc<str>,
}

impl Publisher {
    pub async fn open(connection: &Connection, username: &str) -> Result<Self, PubSubError> {
        let channel = connection.open_channel().await?;
        Ok(Self {
            channel: Arc::new(channel),
            username: Arc::from(username),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    async fn send<T: Serialize>(&self, category: EventCategory, value: &T) -> Result<(), PubSubError> {
        let routing_key = category.routing_key(&self.username);
        publish(
            &self.channel,
            category.exchange(),
            &routing_key,
            value,
            category.encoding(),
        )
        .await
    }

    pub async fn playing_state(&self, is_paused: bool) -> Result<(), PubSubError> {
        self.send(EventCategory::Pause, &PlayingState { is_paused })
            .await
    }

    pub async fn army_move(&self, mv: &ArmyMove) -> Result<(), PubSubError> {
        self.send(EventCategory::ArmyMove, mv).await
    }

    pub async fn war(&self, war: &RecognitionOfWar) -> Result<(), PubSubError> {
        self.send(EventCategory::War, war).await
    }

    /// Publishes `message` to the game log under this publisher's name.
    pub async fn game_log(&self, message: impl Into<String>) -> Result<(), PubSubError> {
        self.send(EventCategory::GameLog, &GameLog::now(&*self.username, message))
            .await
    }
}
