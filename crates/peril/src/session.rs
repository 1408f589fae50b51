//! A player's process: one broker connection, one game actor, and the
//! three subscriptions that keep the actor in sync with everyone else.

use peril_game::{
    ArmyMove, GameHandle, GameState, Location, PlayingState, Rank, RecognitionOfWar, Unit, spawn_game,
    validate_username,
};
use peril_protocol::routing::EventCategory;
use peril_pubsub::{Connection, Handler, Subscription, subscribe};
use rand::Rng;
use serde::de::DeserializeOwned;

use crate::handlers::{MoveHandler, PauseHandler, WarHandler};
use crate::{PerilError, Publisher};

const GAME_CHANNEL_SIZE: usize = 64;

const SPAM_LINES: [&str; 8] = [
    "never interrupt your enemy when he is making a mistake",
    "the hardest thing of all for a soldier is to retreat",
    "a soldier will fight long and hard for a bit of colored ribbon",
    "it is well that war is so terrible, otherwise we should grow too fond of it",
    "the art of war is simple enough",
    "all warfare is based on deception",
    "in war, truth is the first casualty",
    "supplies are running low in the capital",
];

/// How a `spam` run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamReport {
    pub sent: usize,
    pub failed: usize,
}

/// A joined player.
pub struct PlayerSession {
    connection: Connection,
    game: GameHandle,
    publisher: Publisher,
    subscriptions: Vec<Subscription>,
}

impl PlayerSession {
    /// Starts the game actor and subscribes to pause, move and war traffic
    /// as `username`.
    ///
    /// Fails with [`CommandError::InvalidUsername`](peril_game::CommandError::InvalidUsername)
    /// before touching the broker when the name cannot be routed.
    pub async fn join(connection: Connection, username: &str) -> Result<Self, PerilError> {
        validate_username(username)?;
        let game = spawn_game(GameState::new(username), GAME_CHANNEL_SIZE);
        let publisher = Publisher::open(&connection, username).await?;

        let subscriptions = vec![
            subscribe_category::<PlayingState, _>(
                &connection,
                EventCategory::Pause,
                username,
                PauseHandler::new(game.clone()),
            )
            .await?,
            subscribe_category::<ArmyMove, _>(
                &connection,
                EventCategory::ArmyMove,
                username,
                MoveHandler::new(game.clone(), publisher.clone()),
            )
            .await?,
            subscribe_category::<RecognitionOfWar, _>(
                &connection,
                EventCategory::War,
                username,
                WarHandler::new(game.clone(), publisher.clone()),
            )
            .await?,
        ];

        tracing::info!(player = %username, "joined the game");
        Ok(Self {
            connection,
            game,
            publisher,
            subscriptions,
        })
    }

    pub fn username(&self) -> &str {
        self.game.username()
    }

    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub async fn spawn(&self, location: Location, rank: Rank) -> Result<Unit, PerilError> {
        let unit = self.game.issue_spawn(location, rank).await?;
        tracing::debug!(id = unit.id, %rank, %location, "spawned unit");
        Ok(unit)
    }

    /// Moves units locally, then tells everyone else.
    pub async fn move_units(&self, to: Location, unit_ids: Vec<u32>) -> Result<ArmyMove, PerilError> {
        let mv = self.game.issue_move(to, unit_ids).await?;
        self.publisher.army_move(&mv).await?;
        Ok(mv)
    }

    pub async fn status(&self) -> Result<String, PerilError> {
        Ok(self.game.snapshot().await?.status())
    }

    /// Publishes `count` junk log entries, carrying on past failures.
    pub async fn spam(&self, count: usize) -> SpamReport {
        let lines: Vec<&'static str> = {
            let mut rng = rand::rng();
            (0..count)
                .map(|_| SPAM_LINES[rng.random_range(0..SPAM_LINES.len())])
                .collect()
        };

        let mut report = SpamReport { sent: 0, failed: 0 };
        for line in lines {
            match self.publisher.game_log(line).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "spam publish failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Stops the workers and the actor, then closes the connection.
    pub async fn leave(self) -> Result<(), PerilError> {
        for sub in &self.subscriptions {
            sub.abort();
        }
        if let Err(e) = self.game.shutdown().await {
            tracing::debug!(error = %e, "game actor already stopped");
        }
        self.connection.close().await?;
        tracing::info!(player = %self.game.username(), "left the game");
        Ok(())
    }
}

/// Subscribes `handler` to `category` on the queue reserved for `owner`.
pub(crate) async fn subscribe_category<T, H>(
    connection: &Connection,
    category: EventCategory,
    owner: &str,
    handler: H,
) -> Result<Subscription, PerilError>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    let subscription = subscribe(
        connection,
        category.exchange(),
        &category.queue_name(owner),
        &category.binding_key(),
        category.durability(),
        handler,
    )
    .await?;
    Ok(subscription)
}
