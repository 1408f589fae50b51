//! The coordinator process: controls pausing and collects the game log.

use peril_game::GameLog;
use peril_protocol::routing::EventCategory;
use peril_pubsub::{Connection, Handler, Subscription};

use crate::session::subscribe_category;
use crate::{PerilError, Publisher};

/// Name the coordinator publishes under. Only appears in logs; pause
/// traffic is not attributed to a player.
const COORDINATOR: &str = "coordinator";

pub struct Coordinator {
    connection: Connection,
    publisher: Publisher,
    logs: Subscription,
}

impl Coordinator {
    /// Pauses the game, then starts draining the shared game-log queue into
    /// `on_log`.
    ///
    /// The game log queue is durable, so entries published while no
    /// coordinator was running are handed over on start.
    pub async fn start<H>(connection: Connection, on_log: H) -> Result<Self, PerilError>
    where
        H: Handler<GameLog>,
    {
        let publisher = Publisher::open(&connection, COORDINATOR).await?;
        publisher.playing_state(true).await?;

        let logs =
            subscribe_category::<GameLog, _>(&connection, EventCategory::GameLog, COORDINATOR, on_log)
                .await?;

        tracing::info!(queue = logs.queue(), "coordinator started");
        Ok(Self {
            connection,
            publisher,
            logs,
        })
    }

    pub async fn pause(&self) -> Result<(), PerilError> {
        self.publisher.playing_state(true).await?;
        tracing::info!("game paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), PerilError> {
        self.publisher.playing_state(false).await?;
        tracing::info!("game resumed");
        Ok(())
    }

    pub fn log_subscription(&self) -> &Subscription {
        &self.logs
    }

    pub async fn shutdown(self) -> Result<(), PerilError> {
        self.logs.abort();
        self.connection.close().await?;
        Ok(())
    }
}
