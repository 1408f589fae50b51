//! Error types for the game layer.

use crate::Location;

/// A player command that cannot be carried out against the current state.
///
/// Reported to the person at the keyboard; never published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Moves and spawns are refused while the coordinator has paused play.
    #[error("the game is paused")]
    Paused,

    /// Names must be a single routing-key segment.
    #[error("invalid username '{0}': use one word without '.', '*' or '#'")]
    InvalidUsername(String),

    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown location '{0}'")]
    UnknownLocation(String),

    #[error("unknown rank '{0}' (expected infantry, cavalry or artillery)")]
    UnknownRank(String),

    #[error("'{0}' is not a unit id")]
    InvalidUnitId(String),

    /// The unit does not exist or belongs to someone else.
    #[error("you do not own unit {0}")]
    UnknownUnit(u32),

    /// One move carries units out of one territory.
    #[error("units in one move must start in the same territory")]
    MixedOrigins,

    #[error("units are already in {0}")]
    AlreadyThere(Location),

    /// Spawning into a territory an opponent is known to occupy.
    #[error("{location} is held by {owner}")]
    TerritoryHeld { location: Location, owner: String },
}

/// Errors talking to a game actor.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The actor task has stopped; the handle is useless.
    #[error("game for {0} is no longer running")]
    Unavailable(String),
}
