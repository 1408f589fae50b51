//! The per-player game state machine.
//!
//! Everything here is synchronous and total: each transition either mutates
//! the state as described or, for local commands, returns a [`CommandError`]
//! and leaves the state untouched. Serializing access is the job of the
//! actor in [`crate::actor`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

use crate::{ArmyMove, CommandError, Location, Player, PlayingState, Rank, RecognitionOfWar, Unit};

/// How many fought wars a player remembers for answering redeliveries.
const RESOLVED_WAR_MEMORY: usize = 32;

/// What a received move means for the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Someone else moved and nobody local is in the way.
    Safe,
    /// Our own move echoed back by the broker.
    SamePlayerIgnored,
    /// The mover walked into a territory we occupy.
    TriggersWar,
}

/// The numbers behind a resolved war.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Battle {
    pub attacker: String,
    pub defender: String,
    pub location: Location,
    pub attacker_power: u32,
    pub defender_power: u32,
}

/// What a war declaration means for the local player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarOutcome {
    NotInvolved,
    NoUnitsAtStake,
    AttackerWon(Battle),
    DefenderWon(Battle),
    Draw(Battle),
}

impl WarOutcome {
    /// The line both participants write to the game log, if the war was fought.
    pub fn log_message(&self) -> Option<String> {
        match self {
            Self::NotInvolved | Self::NoUnitsAtStake => None,
            Self::AttackerWon(b) => Some(format!("{} won a war against {}", b.attacker, b.defender)),
            Self::DefenderWon(b) => Some(format!("{} won a war against {}", b.defender, b.attacker)),
            Self::Draw(b) => Some(format!(
                "A war between {} and {} resulted in a draw",
                b.attacker, b.defender
            )),
        }
    }

    pub fn battle(&self) -> Option<&Battle> {
        match self {
            Self::AttackerWon(b) | Self::DefenderWon(b) | Self::Draw(b) => Some(b),
            Self::NotInvolved | Self::NoUnitsAtStake => None,
        }
    }
}

/// One player's view of the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    player: Player,
    paused: bool,
    /// Last snapshot seen for each other player.
    opponents: BTreeMap<String, Player>,
    next_unit_id: u32,
    /// Recently fought declarations with their outcomes, oldest first.
    resolved_wars: VecDeque<(RecognitionOfWar, WarOutcome)>,
}

impl GameState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            player: Player::new(username),
            paused: false,
            opponents: BTreeMap::new(),
            next_unit_id: 1,
            resolved_wars: VecDeque::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.player.username
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn opponent(&self, username: &str) -> Option<&Player> {
        self.opponents.get(username)
    }

    pub fn opponents(&self) -> impl Iterator<Item = &Player> {
        self.opponents.values()
    }

    pub fn apply_pause(&mut self, state: PlayingState) {
        self.paused = state.is_paused;
    }

    pub fn apply_move(&mut self, mv: &ArmyMove) -> MoveOutcome {
        if mv.player.username == self.player.username {
            return MoveOutcome::SamePlayerIgnored;
        }

        self.opponents
            .insert(mv.player.username.clone(), mv.player.clone());

        if self.player.holds(mv.to) {
            MoveOutcome::TriggersWar
        } else {
            MoveOutcome::Safe
        }
    }

    /// Resolves a war from the local player's side.
    ///
    /// The contested territory is the first one, in board order, where the
    /// local army and the other side's snapshot both stand. Local power comes
    /// from the authoritative local army; the other side's from its snapshot.
    ///
    /// A declaration that was already fought returns the recorded outcome
    /// without touching the board again, so a redelivered message can still
    /// have its result logged. Both snapshots carry unit ids, which are never
    /// reused, so a later war between the same players is a new declaration.
    pub fn apply_war(&mut self, war: &RecognitionOfWar) -> WarOutcome {
        let me = self.player.username.as_str();
        let local_attacks = war.attacker.username == me;
        if !local_attacks && war.defender.username != me {
            return WarOutcome::NotInvolved;
        }
        if let Some((_, outcome)) = self.resolved_wars.iter().find(|(seen, _)| seen == war) {
            return outcome.clone();
        }

        let other = if local_attacks {
            &war.defender
        } else {
            &war.attacker
        };
        let Some(location) = Location::ALL
            .into_iter()
            .find(|&loc| self.player.holds(loc) && other.holds(loc))
        else {
            return WarOutcome::NoUnitsAtStake;
        };

        let local_power = self.player.power_at(location);
        let other_power = other.power_at(location);
        let (attacker_power, defender_power) = if local_attacks {
            (local_power, other_power)
        } else {
            (other_power, local_power)
        };
        let battle = Battle {
            attacker: war.attacker.username.clone(),
            defender: war.defender.username.clone(),
            location,
            attacker_power,
            defender_power,
        };

        let mut other = other.clone();
        if local_power <= other_power {
            self.player.remove_units_at(location);
        }
        if other_power <= local_power {
            other.remove_units_at(location);
        }
        self.opponents.insert(other.username.clone(), other);

        let outcome = match attacker_power.cmp(&defender_power) {
            std::cmp::Ordering::Greater => WarOutcome::AttackerWon(battle),
            std::cmp::Ordering::Less => WarOutcome::DefenderWon(battle),
            std::cmp::Ordering::Equal => WarOutcome::Draw(battle),
        };

        if self.resolved_wars.len() == RESOLVED_WAR_MEMORY {
            self.resolved_wars.pop_front();
        }
        self.resolved_wars.push_back((war.clone(), outcome.clone()));
        outcome
    }

    /// Places a new unit. Ids are assigned in sequence starting at 1.
    pub fn issue_spawn(&mut self, location: Location, rank: Rank) -> Result<Unit, CommandError> {
        if self.paused {
            return Err(CommandError::Paused);
        }
        if let Some(owner) = self.opponents.values().find(|p| p.holds(location)) {
            return Err(CommandError::TerritoryHeld {
                location,
                owner: owner.username.clone(),
            });
        }

        let unit = Unit {
            id: self.next_unit_id,
            rank,
            location,
        };
        self.next_unit_id += 1;
        self.player.units.insert(unit.id, unit);
        Ok(unit)
    }

    /// Moves owned units that share one territory into `to`.
    pub fn issue_move(&mut self, to: Location, unit_ids: &[u32]) -> Result<ArmyMove, CommandError> {
        if self.paused {
            return Err(CommandError::Paused);
        }
        let Some((&first, rest)) = unit_ids.split_first() else {
            return Err(CommandError::Usage("move <location> <unit_id> [unit_id...]"));
        };

        let lookup = |id: u32| {
            self.player
                .units
                .get(&id)
                .ok_or(CommandError::UnknownUnit(id))
        };
        let from = lookup(first)?.location;
        for &id in rest {
            if lookup(id)?.location != from {
                return Err(CommandError::MixedOrigins);
            }
        }
        if from == to {
            return Err(CommandError::AlreadyThere(to));
        }

        let mut moved = Vec::with_capacity(unit_ids.len());
        for id in unit_ids {
            if let Some(unit) = self.player.units.get_mut(id) {
                if unit.location != to {
                    unit.location = to;
                    moved.push(*unit);
                }
            }
        }

        Ok(ArmyMove {
            player: self.player.clone(),
            from,
            to,
            units: moved,
        })
    }

    /// Human-readable summary for the `status` command.
    pub fn status(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "player: {}", self.player.username);
        let _ = writeln!(out, "paused: {}", self.paused);
        if self.player.units.is_empty() {
            let _ = writeln!(out, "no units");
        }
        for location in self.player.territories() {
            let _ = writeln!(
                out,
                "{location} (power {}):",
                self.player.power_at(location)
            );
            for unit in self.player.units_at(location) {
                let _ = writeln!(out, "  * {}: {}", unit.id, unit.rank);
            }
        }
        for opponent in self.opponents.values() {
            let held: Vec<String> = opponent
                .territories()
                .into_iter()
                .map(|l| l.to_string())
                .collect();
            let _ = writeln!(
                out,
                "opponent {} holds: {}",
                opponent.username,
                if held.is_empty() {
                    "nothing".to_string()
                } else {
                    held.join(", ")
                }
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn army(username: &str, units: &[(u32, Rank, Location)]) -> Player {
        let mut player = Player::new(username);
        for &(id, rank, location) in units {
            player.units.insert(id, Unit { id, rank, location });
        }
        player
    }

    fn state_with(username: &str, units: &[(Rank, Location)]) -> GameState {
        let mut state = GameState::new(username);
        for &(rank, location) in units {
            state.issue_spawn(location, rank).unwrap();
        }
        state
    }

    #[test]
    fn test_pause_overwrites_flag() {
        let mut state = GameState::new("alice");
        state.apply_pause(PlayingState { is_paused: true });
        state.apply_pause(PlayingState { is_paused: true });
        assert!(state.is_paused());
        state.apply_pause(PlayingState { is_paused: false });
        assert!(!state.is_paused());
    }

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut state = GameState::new("alice");
        let a = state.issue_spawn(Location::Asia, Rank::Infantry).unwrap();
        let b = state.issue_spawn(Location::Europe, Rank::Artillery).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(state.player().units.len(), 2);
    }

    #[test]
    fn test_commands_rejected_while_paused() {
        let mut state = state_with("alice", &[(Rank::Infantry, Location::Asia)]);
        state.apply_pause(PlayingState { is_paused: true });
        let before = state.clone();

        assert_eq!(
            state.issue_spawn(Location::Asia, Rank::Cavalry),
            Err(CommandError::Paused)
        );
        assert_eq!(
            state.issue_move(Location::Europe, &[1]),
            Err(CommandError::Paused)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_move_relocates_units_and_snapshots_player() {
        let mut state = state_with(
            "alice",
            &[
                (Rank::Infantry, Location::Americas),
                (Rank::Infantry, Location::Americas),
                (Rank::Infantry, Location::Americas),
            ],
        );

        let mv = state.issue_move(Location::Europe, &[1, 2]).unwrap();
        assert_eq!(mv.from, Location::Americas);
        assert_eq!(mv.to, Location::Europe);
        assert_eq!(mv.units.len(), 2);
        assert!(mv.units.iter().all(|u| u.location == Location::Europe));
        assert_eq!(mv.player, *state.player());
        assert_eq!(state.player().power_at(Location::Americas), 1);
        assert_eq!(state.player().power_at(Location::Europe), 2);
    }

    #[test]
    fn test_invalid_moves_leave_state_untouched() {
        let mut state = state_with(
            "alice",
            &[
                (Rank::Infantry, Location::Asia),
                (Rank::Cavalry, Location::Africa),
            ],
        );
        let before = state.clone();

        assert_eq!(
            state.issue_move(Location::Europe, &[]),
            Err(CommandError::Usage("move <location> <unit_id> [unit_id...]"))
        );
        assert_eq!(
            state.issue_move(Location::Europe, &[1, 9]),
            Err(CommandError::UnknownUnit(9))
        );
        assert_eq!(
            state.issue_move(Location::Europe, &[1, 2]),
            Err(CommandError::MixedOrigins)
        );
        assert_eq!(
            state.issue_move(Location::Asia, &[1]),
            Err(CommandError::AlreadyThere(Location::Asia))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_own_move_echo_is_ignored_without_mutation() {
        let mut state = state_with("alice", &[(Rank::Infantry, Location::Asia)]);
        let before = state.clone();
        let echo = ArmyMove {
            player: army("alice", &[(7, Rank::Artillery, Location::Europe)]),
            from: Location::Asia,
            to: Location::Europe,
            units: vec![],
        };

        assert_eq!(state.apply_move(&echo), MoveOutcome::SamePlayerIgnored);
        assert_eq!(state, before);
    }

    #[test]
    fn test_move_into_occupied_territory_triggers_war() {
        let mut state = state_with("bob", &[(Rank::Infantry, Location::Europe)]);
        let mover = army("alice", &[(1, Rank::Infantry, Location::Europe)]);
        let mv = ArmyMove {
            player: mover.clone(),
            from: Location::Americas,
            to: Location::Europe,
            units: mover.units.values().copied().collect(),
        };

        assert_eq!(state.apply_move(&mv), MoveOutcome::TriggersWar);
        assert_eq!(state.opponent("alice"), Some(&mover));
    }

    #[test]
    fn test_move_into_empty_territory_is_safe() {
        let mut state = state_with("bob", &[(Rank::Infantry, Location::Asia)]);
        let mv = ArmyMove {
            player: army("alice", &[(1, Rank::Infantry, Location::Europe)]),
            from: Location::Americas,
            to: Location::Europe,
            units: vec![],
        };

        assert_eq!(state.apply_move(&mv), MoveOutcome::Safe);
        assert!(state.opponent("alice").is_some());
        assert_eq!(
            state.issue_spawn(Location::Europe, Rank::Infantry),
            Err(CommandError::TerritoryHeld {
                location: Location::Europe,
                owner: "alice".into(),
            })
        );
    }

    #[test]
    fn test_uninvolved_war_changes_nothing() {
        let mut state = state_with("carol", &[(Rank::Artillery, Location::Europe)]);
        let before = state.clone();
        let war = RecognitionOfWar {
            attacker: army("bob", &[(1, Rank::Infantry, Location::Europe)]),
            defender: army("alice", &[(1, Rank::Infantry, Location::Europe)]),
        };

        assert_eq!(state.apply_war(&war), WarOutcome::NotInvolved);
        assert_eq!(state, before);
    }

    #[test]
    fn test_war_without_overlap_has_no_units_at_stake() {
        let mut state = state_with("alice", &[(Rank::Infantry, Location::Asia)]);
        let war = RecognitionOfWar {
            attacker: army("bob", &[(1, Rank::Infantry, Location::Europe)]),
            defender: state.player().clone(),
        };

        assert_eq!(state.apply_war(&war), WarOutcome::NoUnitsAtStake);
        assert_eq!(state.player().units.len(), 1);
    }

    #[test]
    fn test_defender_wins_and_attacker_units_fall() {
        // Bob occupies europe with one infantry; alice moved two in and bob declared.
        let mut alice = state_with(
            "alice",
            &[
                (Rank::Infantry, Location::Europe),
                (Rank::Infantry, Location::Europe),
            ],
        );
        let bob = army("bob", &[(1, Rank::Infantry, Location::Europe)]);
        let war = RecognitionOfWar {
            attacker: bob,
            defender: alice.player().clone(),
        };

        let outcome = alice.apply_war(&war);
        let WarOutcome::DefenderWon(ref battle) = outcome else {
            panic!("expected defender win, got {outcome:?}");
        };
        assert_eq!(battle.location, Location::Europe);
        assert_eq!((battle.attacker_power, battle.defender_power), (1, 2));
        assert_eq!(
            outcome.log_message().as_deref(),
            Some("alice won a war against bob")
        );
        assert_eq!(alice.player().power_at(Location::Europe), 2);
        assert!(!alice.opponent("bob").unwrap().holds(Location::Europe));
    }

    #[test]
    fn test_losing_attacker_loses_local_units() {
        let mut bob = state_with("bob", &[(Rank::Infantry, Location::Europe)]);
        let alice = army(
            "alice",
            &[
                (1, Rank::Infantry, Location::Europe),
                (2, Rank::Infantry, Location::Europe),
            ],
        );
        let war = RecognitionOfWar {
            attacker: bob.player().clone(),
            defender: alice,
        };

        let outcome = bob.apply_war(&war);
        assert!(matches!(outcome, WarOutcome::DefenderWon(_)));
        assert_eq!(
            outcome.log_message().as_deref(),
            Some("alice won a war against bob")
        );
        assert!(bob.player().units.is_empty());
    }

    #[test]
    fn test_redelivered_war_reports_the_same_outcome() {
        // Bob lost europe; the broker hands him the same declaration again.
        let mut bob = state_with("bob", &[(Rank::Infantry, Location::Europe)]);
        let war = RecognitionOfWar {
            attacker: bob.player().clone(),
            defender: army(
                "alice",
                &[
                    (1, Rank::Infantry, Location::Europe),
                    (2, Rank::Infantry, Location::Europe),
                ],
            ),
        };

        let first = bob.apply_war(&war);
        assert_eq!(
            first.log_message().as_deref(),
            Some("alice won a war against bob")
        );
        let after_first = bob.clone();

        let again = bob.apply_war(&war);
        assert_eq!(again, first);
        assert_eq!(bob, after_first);
    }

    #[test]
    fn test_winner_does_not_fight_a_redelivered_war_twice() {
        let mut alice = state_with("alice", &[(Rank::Artillery, Location::Asia)]);
        let war = RecognitionOfWar {
            attacker: army("bob", &[(1, Rank::Infantry, Location::Asia)]),
            defender: alice.player().clone(),
        };

        let first = alice.apply_war(&war);
        alice.issue_spawn(Location::Africa, Rank::Infantry).unwrap();
        assert_eq!(alice.apply_war(&war), first);
        assert_eq!(alice.player().units.len(), 2);
        assert!(!alice.opponent("bob").unwrap().holds(Location::Asia));
    }

    #[test]
    fn test_fresh_declaration_between_same_players_is_fought() {
        let mut bob = state_with("bob", &[(Rank::Artillery, Location::Asia)]);
        let first = RecognitionOfWar {
            attacker: bob.player().clone(),
            defender: army("alice", &[(1, Rank::Cavalry, Location::Asia)]),
        };
        assert!(matches!(bob.apply_war(&first), WarOutcome::AttackerWon(_)));

        // Alice comes back with a new unit; the snapshot differs.
        let second = RecognitionOfWar {
            attacker: bob.player().clone(),
            defender: army("alice", &[(2, Rank::Cavalry, Location::Asia)]),
        };
        assert!(matches!(bob.apply_war(&second), WarOutcome::AttackerWon(_)));
        assert_eq!(bob.resolved_wars.len(), 2);
    }

    #[test]
    fn test_attacker_win_message() {
        let mut bob = state_with("bob", &[(Rank::Artillery, Location::Asia)]);
        let war = RecognitionOfWar {
            attacker: bob.player().clone(),
            defender: army("alice", &[(1, Rank::Cavalry, Location::Asia)]),
        };

        let outcome = bob.apply_war(&war);
        assert!(matches!(outcome, WarOutcome::AttackerWon(_)));
        assert_eq!(
            outcome.log_message().as_deref(),
            Some("bob won a war against alice")
        );
        assert_eq!(bob.player().power_at(Location::Asia), 10);
    }

    #[test]
    fn test_draw_removes_both_sides() {
        let mut alice = state_with("alice", &[(Rank::Cavalry, Location::Africa)]);
        let war = RecognitionOfWar {
            attacker: army(
                "bob",
                &[
                    (1, Rank::Infantry, Location::Africa),
                    (2, Rank::Infantry, Location::Africa),
                    (3, Rank::Infantry, Location::Africa),
                    (4, Rank::Infantry, Location::Africa),
                    (5, Rank::Infantry, Location::Africa),
                ],
            ),
            defender: alice.player().clone(),
        };

        let outcome = alice.apply_war(&war);
        assert_eq!(
            outcome.log_message().as_deref(),
            Some("A war between bob and alice resulted in a draw")
        );
        assert!(alice.player().units.is_empty());
        assert!(alice.opponent("bob").unwrap().units.is_empty());
    }

    #[test]
    fn test_contested_territory_follows_board_order() {
        let mut alice = state_with(
            "alice",
            &[
                (Rank::Infantry, Location::Asia),
                (Rank::Artillery, Location::Europe),
            ],
        );
        let war = RecognitionOfWar {
            attacker: army(
                "bob",
                &[
                    (1, Rank::Cavalry, Location::Asia),
                    (2, Rank::Cavalry, Location::Europe),
                ],
            ),
            defender: alice.player().clone(),
        };

        let outcome = alice.apply_war(&war);
        assert_eq!(outcome.battle().map(|b| b.location), Some(Location::Europe));
        assert!(alice.player().holds(Location::Asia));
    }

    #[test]
    fn test_status_lists_units_and_opponents() {
        let mut state = state_with("alice", &[(Rank::Cavalry, Location::Asia)]);
        state.apply_move(&ArmyMove {
            player: army("bob", &[(1, Rank::Infantry, Location::Europe)]),
            from: Location::Africa,
            to: Location::Europe,
            units: vec![],
        });

        let status = state.status();
        assert!(status.contains("player: alice"));
        assert!(status.contains("asia (power 5):"));
        assert!(status.contains("  * 1: cavalry"));
        assert!(status.contains("opponent bob holds: europe"));
    }
}
