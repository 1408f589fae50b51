//! Values that travel between processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Location, Player, Unit};

/// Coordinator → players: whether play is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    pub is_paused: bool,
}

/// A player moved units from one territory to another.
///
/// `player` is the mover's snapshot taken after the move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMove {
    pub player: Player,
    pub from: Location,
    pub to: Location,
    pub units: Vec<Unit>,
}

/// The occupant of a territory saw a move into it and declared war.
///
/// `attacker` is the occupant (the declaring side) and `defender` is the
/// mover, each as a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOfWar {
    pub attacker: Player,
    pub defender: Player,
}

/// One line in the append-only game log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    pub current_time: DateTime<Utc>,
    pub message: String,
    pub username: String,
}

impl GameLog {
    /// A log entry stamped with the current time.
    pub fn now(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            current_time: Utc::now(),
            message: message.into(),
            username: username.into(),
        }
    }
}
