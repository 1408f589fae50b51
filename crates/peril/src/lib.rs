//! # Peril
//!
//! A strategy game played over a message broker. Every player process keeps
//! its own view of the board and learns about everyone else only through
//! published messages; a coordinator process pauses and resumes play and
//! collects the game log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peril::prelude::*;
//!
//! # async fn run() -> Result<(), PerilError> {
//! let connection = Connection::connect("ws://127.0.0.1:5672").await?;
//! let player = PlayerSession::join(connection, "alice").await?;
//! player.spawn(Location::Europe, Rank::Infantry).await?;
//! player.move_units(Location::Asia, vec![1]).await?;
//! # Ok(())
//! # }
//! ```

mod commands;
mod coordinator;
mod error;
pub mod handlers;
mod publisher;
mod session;

pub use commands::{COORDINATOR_HELP, CoordinatorCommand, PLAYER_HELP, PlayerCommand};
pub use coordinator::Coordinator;
pub use error::PerilError;
pub use publisher::Publisher;
pub use session::{PlayerSession, SpamReport};

pub use peril_broker as broker;
pub use peril_game as game;
pub use peril_protocol as protocol;
pub use peril_pubsub as pubsub;

pub mod prelude {
    pub use crate::{
        Coordinator, CoordinatorCommand, PerilError, PlayerCommand, PlayerSession, Publisher,
    };
    pub use peril_broker::{BrokerConfig, BrokerServer};
    pub use peril_game::{
        ArmyMove, CommandError, GameLog, Location, PlayingState, Rank, RecognitionOfWar,
    };
    pub use peril_pubsub::{Connection, Disposition};
}
