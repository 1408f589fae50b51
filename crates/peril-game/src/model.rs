//! Territories, units and players.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CommandError;

/// A territory on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Americas,
    Europe,
    Africa,
    Asia,
    Antarctica,
    Australia,
}

impl Location {
    pub const ALL: [Location; 6] = [
        Self::Americas,
        Self::Europe,
        Self::Africa,
        Self::Asia,
        Self::Antarctica,
        Self::Australia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Americas => "americas",
            Self::Europe => "europe",
            Self::Africa => "africa",
            Self::Asia => "asia",
            Self::Antarctica => "antarctica",
            Self::Australia => "australia",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|loc| loc.as_str() == wanted)
            .ok_or_else(|| CommandError::UnknownLocation(s.to_string()))
    }
}

/// A unit's rank. Higher ranks weigh more in a war.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Infantry,
    Cavalry,
    Artillery,
}

impl Rank {
    /// Combat weight of one unit of this rank.
    pub fn power(self) -> u32 {
        match self {
            Self::Infantry => 1,
            Self::Cavalry => 5,
            Self::Artillery => 10,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infantry => f.write_str("infantry"),
            Self::Cavalry => f.write_str("cavalry"),
            Self::Artillery => f.write_str("artillery"),
        }
    }
}

impl FromStr for Rank {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "infantry" => Ok(Self::Infantry),
            "cavalry" => Ok(Self::Cavalry),
            "artillery" => Ok(Self::Artillery),
            _ => Err(CommandError::UnknownRank(s.to_string())),
        }
    }
}

/// One unit on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique within its owner's army.
    pub id: u32,
    pub rank: Rank,
    pub location: Location,
}

/// A player and their army.
///
/// The local player's copy is authoritative. Copies of other players are
/// snapshots carried in messages and may be stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub username: String,
    pub units: BTreeMap<u32, Unit>,
}

impl Player {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            units: BTreeMap::new(),
        }
    }

    /// Territories with at least one of this player's units.
    pub fn territories(&self) -> BTreeSet<Location> {
        self.units.values().map(|u| u.location).collect()
    }

    pub fn units_at(&self, location: Location) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.location == location)
    }

    pub fn holds(&self, location: Location) -> bool {
        self.units_at(location).next().is_some()
    }

    /// Combined power of the units in `location`.
    pub fn power_at(&self, location: Location) -> u32 {
        self.units_at(location).map(|u| u.rank.power()).sum()
    }

    /// Removes every unit in `location` and returns how many went.
    pub(crate) fn remove_units_at(&mut self, location: Location) -> usize {
        let before = self.units.len();
        self.units.retain(|_, u| u.location != location);
        before - self.units.len()
    }
}

/// Checks that `name` can be used as one routing-key segment.
///
/// Player names end up in keys such as `army_moves.<name>`, which are
/// matched against `army_moves.*`. A name with a `.` spans two segments and
/// would never match; `*` and `#` are wildcards. Whitespace is refused so
/// the name survives the command line.
pub fn validate_username(name: &str) -> Result<(), CommandError> {
    let invalid = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '.' | '*' | '#'));
    if invalid {
        return Err(CommandError::InvalidUsername(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u32, rank: Rank, location: Location) -> Unit {
        Unit { id, rank, location }
    }

    #[test]
    fn test_location_parses_case_insensitively() {
        assert_eq!("Europe".parse::<Location>(), Ok(Location::Europe));
        assert_eq!(
            "atlantis".parse::<Location>(),
            Err(CommandError::UnknownLocation("atlantis".into()))
        );
    }

    #[test]
    fn test_location_display_round_trips() {
        for location in Location::ALL {
            assert_eq!(location.to_string().parse::<Location>(), Ok(location));
        }
    }

    #[test]
    fn test_rank_power() {
        assert_eq!(Rank::Infantry.power(), 1);
        assert_eq!(Rank::Cavalry.power(), 5);
        assert_eq!(Rank::Artillery.power(), 10);
        assert!("navy".parse::<Rank>().is_err());
    }

    #[test]
    fn test_power_and_territories() {
        let mut player = Player::new("alice");
        player.units.insert(1, unit(1, Rank::Infantry, Location::Asia));
        player.units.insert(2, unit(2, Rank::Artillery, Location::Asia));
        player.units.insert(3, unit(3, Rank::Cavalry, Location::Europe));

        assert_eq!(player.power_at(Location::Asia), 11);
        assert_eq!(player.power_at(Location::Africa), 0);
        assert!(player.holds(Location::Europe));
        assert_eq!(
            player.territories().into_iter().collect::<Vec<_>>(),
            vec![Location::Europe, Location::Asia]
        );

        assert_eq!(player.remove_units_at(Location::Asia), 2);
        assert!(!player.holds(Location::Asia));
    }

    #[test]
    fn test_username_must_be_one_routing_segment() {
        for name in ["alice", "Bob_2", "x-y"] {
            assert_eq!(validate_username(name), Ok(()), "{name}");
        }
        for name in ["", "al.ice", "a*", "#", "al ice", "\tbob"] {
            assert_eq!(
                validate_username(name),
                Err(CommandError::InvalidUsername(name.to_string())),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_location_serializes_lowercase() {
        let json = serde_json::to_string(&Location::Antarctica).unwrap();
        assert_eq!(json, "\"antarctica\"");
    }
}
