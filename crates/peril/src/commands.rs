//! Line commands typed at the player and coordinator prompts.

use peril_game::{CommandError, Location, Rank};

pub const PLAYER_HELP: &str = "\
Possible commands:
* move <location> <unit_id> [unit_id...]
    example: move asia 1 2
* spawn <location> <rank>
    example: spawn europe infantry
* status
* spam <n>
* help
* quit";

pub const COORDINATOR_HELP: &str = "\
Possible commands:
* pause
* resume
* help
* quit";

/// A parsed player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Move { to: Location, unit_ids: Vec<u32> },
    Spawn { location: Location, rank: Rank },
    Status,
    Help,
    /// Publish this many junk game-log entries.
    Spam(usize),
    Quit,
}

impl PlayerCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match word.to_ascii_lowercase().as_str() {
            "move" => {
                let [to, ids @ ..] = args.as_slice() else {
                    return Err(CommandError::Usage("move <location> <unit_id> [unit_id...]"));
                };
                if ids.is_empty() {
                    return Err(CommandError::Usage("move <location> <unit_id> [unit_id...]"));
                }
                let unit_ids = ids
                    .iter()
                    .map(|id| {
                        id.parse::<u32>()
                            .map_err(|_| CommandError::InvalidUnitId(id.to_string()))
                    })
                    .collect::<Result<_, _>>()?;
                Self::Move {
                    to: to.parse()?,
                    unit_ids,
                }
            }
            "spawn" => match args.as_slice() {
                [location, rank] => Self::Spawn {
                    location: location.parse()?,
                    rank: rank.parse()?,
                },
                _ => return Err(CommandError::Usage("spawn <location> <rank>")),
            },
            "status" => Self::Status,
            "help" => Self::Help,
            "spam" => match args.as_slice() {
                [n] => match n.parse::<usize>() {
                    Ok(n) if n > 0 => Self::Spam(n),
                    _ => return Err(CommandError::Usage("spam <n> (n > 0)")),
                },
                _ => return Err(CommandError::Usage("spam <n> (n > 0)")),
            },
            "quit" => Self::Quit,
            _ => return Err(CommandError::UnknownCommand(word.to_string())),
        };
        Ok(Some(command))
    }
}

/// A parsed coordinator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorCommand {
    Pause,
    Resume,
    Help,
    Quit,
}

impl CoordinatorCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let Some(word) = line.split_whitespace().next() else {
            return Ok(None);
        };
        match word.to_ascii_lowercase().as_str() {
            "pause" => Ok(Some(Self::Pause)),
            "resume" => Ok(Some(Self::Resume)),
            "help" => Ok(Some(Self::Help)),
            "quit" => Ok(Some(Self::Quit)),
            _ => Err(CommandError::UnknownCommand(word.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line_is_nothing() {
        assert_eq!(PlayerCommand::parse("   "), Ok(None));
        assert_eq!(CoordinatorCommand::parse(""), Ok(None));
    }

    #[test]
    fn test_parse_move() {
        assert_eq!(
            PlayerCommand::parse("move Asia 1 2"),
            Ok(Some(PlayerCommand::Move {
                to: Location::Asia,
                unit_ids: vec![1, 2],
            }))
        );
        assert!(matches!(
            PlayerCommand::parse("move asia"),
            Err(CommandError::Usage(_))
        ));
        assert_eq!(
            PlayerCommand::parse("move asia one"),
            Err(CommandError::InvalidUnitId("one".into()))
        );
        assert_eq!(
            PlayerCommand::parse("move mars 1"),
            Err(CommandError::UnknownLocation("mars".into()))
        );
    }

    #[test]
    fn test_parse_spawn() {
        assert_eq!(
            PlayerCommand::parse("spawn europe artillery"),
            Ok(Some(PlayerCommand::Spawn {
                location: Location::Europe,
                rank: Rank::Artillery,
            }))
        );
        assert_eq!(
            PlayerCommand::parse("spawn europe navy"),
            Err(CommandError::UnknownRank("navy".into()))
        );
        assert!(PlayerCommand::parse("spawn europe").is_err());
    }

    #[test]
    fn test_parse_spam() {
        assert_eq!(PlayerCommand::parse("spam 3"), Ok(Some(PlayerCommand::Spam(3))));
        assert!(PlayerCommand::parse("spam 0").is_err());
        assert!(PlayerCommand::parse("spam lots").is_err());
        assert!(PlayerCommand::parse("spam").is_err());
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(
            PlayerCommand::parse("dance"),
            Err(CommandError::UnknownCommand("dance".into()))
        );
        assert_eq!(
            CoordinatorCommand::parse("spawn asia infantry"),
            Err(CommandError::UnknownCommand("spawn".into()))
        );
        assert_eq!(
            CoordinatorCommand::parse("RESUME"),
            Ok(Some(CoordinatorCommand::Resume))
        );
    }
}
