//! The routing scheme: which exchange and routing key each kind of game
//! traffic uses.
//!
//! This is pure data, but every publisher and every subscriber reads it, so
//! it is the one place where the key templates are spelled out. A typo on
//! one side does not raise an error; the message just matches no binding
//! and disappears.
//!
//! | category  | exchange       | publish key           | binding key    | queue                 |
//! |-----------|----------------|-----------------------|----------------|-----------------------|
//! | pause     | `peril_direct` | `pause`               | `pause`        | `pause.<player>`      |
//! | army move | `peril_topic`  | `army_moves.<player>` | `army_moves.*` | `army_moves.<player>` |
//! | war       | `peril_topic`  | `war.<player>`        | `war.*`        | `war.<player>`        |
//! | game log  | `peril_topic`  | `game_logs.<player>`  | `game_logs.*`  | `game_logs`           |

use crate::{Durability, Encoding, ExchangeKind, QueueOptions};

pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const PAUSE_KEY: &str = "pause";
pub const GAME_LOG_SLUG: &str = "game_logs";

pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";
pub const EXCHANGE_PERIL_DEAD_LETTER: &str = "peril_dlx";
pub const DEAD_LETTER_QUEUE: &str = "peril_dlq";

/// Single-segment wildcard used in topic bindings.
pub const WILDCARD: &str = "*";

/// The exchanges every Peril broker must provide, with their kinds.
pub const EXCHANGES: [(&str, ExchangeKind); 3] = [
    (EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct),
    (EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic),
    (EXCHANGE_PERIL_DEAD_LETTER, ExchangeKind::Fanout),
];

/// A logical stream of game traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Coordinator → every player: pause/resume.
    Pause,
    /// Player → every other player: an army changed territory.
    ArmyMove,
    /// Player → both belligerents: a war was recognized.
    War,
    /// Player → coordinator: something worth recording happened.
    GameLog,
}

impl EventCategory {
    /// The exchange this category is published to.
    pub fn exchange(self) -> &'static str {
        match self {
            Self::Pause => EXCHANGE_PERIL_DIRECT,
            Self::ArmyMove | Self::War | Self::GameLog => EXCHANGE_PERIL_TOPIC,
        }
    }

    /// The literal first segment of every key in this category.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Pause => PAUSE_KEY,
            Self::ArmyMove => ARMY_MOVES_PREFIX,
            Self::War => WAR_RECOGNITIONS_PREFIX,
            Self::GameLog => GAME_LOG_SLUG,
        }
    }

    /// The key a message is published under.
    ///
    /// Pause traffic comes from the coordinator and is not attributed to a
    /// player, so `player` is ignored for it.
    pub fn routing_key(self, player: &str) -> String {
        match self {
            Self::Pause => PAUSE_KEY.to_string(),
            _ => format!("{}.{player}", self.prefix()),
        }
    }

    /// The pattern subscribers bind with to see every player's traffic.
    pub fn binding_key(self) -> String {
        match self {
            Self::Pause => PAUSE_KEY.to_string(),
            _ => format!("{}.{WILDCARD}", self.prefix()),
        }
    }

    /// The queue a given subscriber drains.
    ///
    /// Everything except the game log gets one queue per player so each
    /// player sees every message (fan-out). The game log is one shared
    /// queue that only the coordinator drains.
    pub fn queue_name(self, player: &str) -> String {
        match self {
            Self::GameLog => GAME_LOG_SLUG.to_string(),
            _ => format!("{}.{player}", self.prefix()),
        }
    }

    pub fn durability(self) -> Durability {
        match self {
            Self::Pause | Self::ArmyMove => Durability::Transient,
            Self::War | Self::GameLog => Durability::Durable,
        }
    }

    /// The payload encoding used for this category.
    pub fn encoding(self) -> Encoding {
        match self {
            Self::GameLog => Encoding::Bincode,
            _ => Encoding::Json,
        }
    }
}

/// Queue options every Peril queue is declared with: the given durability
/// and the shared dead-letter exchange.
pub fn queue_options(durability: Durability) -> QueueOptions {
    QueueOptions::new(durability).dead_letter_exchange(EXCHANGE_PERIL_DEAD_LETTER)
}

/// Returns `true` if `routing_key` matches the topic `pattern`.
///
/// `*` matches exactly one dot-separated segment, `#` matches zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_segments(&pattern, &key)
}

fn matches_segments(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            // Either `#` swallows nothing, or it swallows one more segment.
            matches_segments(&pattern[1..], key)
                || (!key.is_empty() && matches_segments(pattern, &key[1..]))
        }
        (Some(&"*"), Some(_)) => matches_segments(&pattern[1..], &key[1..]),
        (Some(p), Some(k)) if p == k => matches_segments(&pattern[1..], &key[1..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_keys_embed_the_player() {
        assert_eq!(EventCategory::ArmyMove.routing_key("alice"), "army_moves.alice");
        assert_eq!(EventCategory::War.routing_key("bob"), "war.bob");
        assert_eq!(EventCategory::GameLog.routing_key("bob"), "game_logs.bob");
        assert_eq!(EventCategory::Pause.routing_key("ignored"), "pause");
    }

    #[test]
    fn test_every_publish_key_matches_its_own_binding() {
        for category in [
            EventCategory::Pause,
            EventCategory::ArmyMove,
            EventCategory::War,
            EventCategory::GameLog,
        ] {
            let key = category.routing_key("carol");
            let binding = category.binding_key();
            let matched = match category.exchange() {
                EXCHANGE_PERIL_DIRECT => binding == key,
                _ => topic_matches(&binding, &key),
            };
            assert!(matched, "{category:?}: {key} should match {binding}");
        }
    }

    #[test]
    fn test_categories_do_not_cross_match() {
        let war = EventCategory::War.binding_key();
        assert!(!topic_matches(&war, &EventCategory::ArmyMove.routing_key("a")));
        assert!(!topic_matches(&war, &EventCategory::GameLog.routing_key("a")));
    }

    #[test]
    fn test_queue_names() {
        assert_eq!(EventCategory::Pause.queue_name("alice"), "pause.alice");
        assert_eq!(EventCategory::War.queue_name("alice"), "war.alice");
        assert_eq!(EventCategory::GameLog.queue_name("alice"), "game_logs");
    }

    #[test]
    fn test_durability_and_encoding_per_category() {
        assert_eq!(EventCategory::Pause.durability(), Durability::Transient);
        assert_eq!(EventCategory::War.durability(), Durability::Durable);
        assert_eq!(EventCategory::GameLog.encoding(), Encoding::Bincode);
        assert_eq!(EventCategory::ArmyMove.encoding(), Encoding::Json);
    }

    #[test]
    fn test_single_segment_wildcard() {
        assert!(topic_matches("war.*", "war.alice"));
        assert!(!topic_matches("war.*", "war"));
        assert!(!topic_matches("war.*", "war.alice.extra"));
    }

    #[test]
    fn test_multi_segment_wildcard() {
        assert!(topic_matches("war.#", "war"));
        assert!(topic_matches("war.#", "war.alice.extra"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("#.alice", "war.alice"));
        assert!(!topic_matches("#.alice", "war.bob"));
    }

    #[test]
    fn test_literal_patterns_need_exact_match() {
        assert!(topic_matches("pause", "pause"));
        assert!(!topic_matches("pause", "pause.alice"));
    }

    #[test]
    fn test_queue_options_carry_dead_letter_exchange() {
        let options = queue_options(Durability::Transient);
        assert_eq!(
            options.dead_letter_exchange.as_deref(),
            Some(EXCHANGE_PERIL_DEAD_LETTER)
        );
    }
}
