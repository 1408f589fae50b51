//! Peril game rules.
//!
//! [`GameState`] holds one player's view of the board and exposes the
//! transitions driven by incoming messages (`apply_*`) and by the local
//! player (`issue_*`). [`spawn_game`] wraps a state in an actor so concurrent
//! subscription workers can share it.

mod actor;
mod error;
mod messages;
mod model;
mod state;

pub use actor::{GameHandle, spawn_game};
pub use error::{CommandError, GameError};
pub use messages::{ArmyMove, GameLog, PlayingState, RecognitionOfWar};
pub use model::{Location, Player, Rank, Unit, validate_username};
pub use state::{Battle, GameState, MoveOutcome, WarOutcome};
