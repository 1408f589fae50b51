//! Broker configuration.

use peril_protocol::routing::{DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DEAD_LETTER, EXCHANGES};
use peril_protocol::ExchangeKind;

/// An exchange that exists from the moment the broker starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub name: String,
    pub kind: ExchangeKind,
}

impl ExchangeConfig {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Messages the default dead-letter queue keeps before dropping its oldest.
pub const DEFAULT_DEAD_LETTER_MAX_LENGTH: usize = 10_000;

/// A durable queue that collects everything routed to a dead-letter
/// exchange, so discarded messages stay inspectable instead of vanishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterConfig {
    pub exchange: String,
    pub queue: String,

    /// Nothing consumes this queue in a normal game. Once it holds this
    /// many messages the oldest is dropped for every new arrival. `None`
    /// keeps everything.
    pub max_length: Option<usize>,
}

/// Configuration for a broker instance.
///
/// `Default` provisions the Peril topology: the direct, topic and
/// dead-letter exchanges, and a durable dead-letter queue bound to the
/// dead-letter exchange.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Exchanges declared at startup. Clients cannot declare exchanges.
    pub exchanges: Vec<ExchangeConfig>,

    /// Optional catch-all queue for dead-lettered messages.
    pub dead_letter: Option<DeadLetterConfig>,

    /// Maximum unacknowledged deliveries per consumer. `0` means unlimited.
    ///
    /// With the default of 1 a consumer holds exactly one message at a
    /// time, so a requeued message really goes back to the head of the line.
    pub prefetch: usize,
}

impl BrokerConfig {
    /// A broker with no exchanges and no dead-letter queue.
    pub fn empty() -> Self {
        Self {
            exchanges: Vec::new(),
            dead_letter: None,
            prefetch: 1,
        }
    }

    /// Adds a pre-provisioned exchange.
    pub fn exchange(mut self, name: impl Into<String>, kind: ExchangeKind) -> Self {
        self.exchanges.push(ExchangeConfig::new(name, kind));
        self
    }

    /// Caps the dead-letter queue, if one is configured.
    pub fn dead_letter_max_length(mut self, max_length: Option<usize>) -> Self {
        if let Some(dead_letter) = self.dead_letter.as_mut() {
            dead_letter.max_length = max_length;
        }
        self
    }

    /// Sets the per-consumer prefetch window.
    pub fn prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            exchanges: EXCHANGES
                .iter()
                .map(|(name, kind)| ExchangeConfig::new(*name, *kind))
                .collect(),
            dead_letter: Some(DeadLetterConfig {
                exchange: EXCHANGE_PERIL_DEAD_LETTER.to_string(),
                queue: DEAD_LETTER_QUEUE.to_string(),
                max_length: Some(DEFAULT_DEAD_LETTER_MAX_LENGTH),
            }),
            prefetch: 1,
        }
    }
}
