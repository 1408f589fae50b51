//! Queue storage and consumer bookkeeping.

use std::collections::VecDeque;

use peril_protocol::{ChannelId, Delivery, Durability, Message, QueueDescriptor, QueueOptions};
use peril_transport::ConnectionId;
use tokio::sync::mpsc;

/// Where a consumer's deliveries are pushed.
///
/// Unbounded because the prefetch window already bounds how many
/// deliveries a consumer can have outstanding.
pub type DeliverySink = mpsc::UnboundedSender<Delivery>;

/// A consumer is identified by the channel it consumes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConsumerKey {
    pub(crate) connection: ConnectionId,
    pub(crate) channel: ChannelId,
}

/// A message waiting in (or handed out from) a queue.
#[derive(Debug, Clone)]
pub(crate) struct QueuedMessage {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) message: Message,
    pub(crate) redelivered: bool,
    pub(crate) requeues: u32,
}

impl QueuedMessage {
    pub(crate) fn new(exchange: &str, routing_key: &str, message: Message) -> Self {
        Self {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message,
            redelivered: false,
            requeues: 0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Consumer {
    pub(crate) key: ConsumerKey,
    pub(crate) sink: DeliverySink,
    pub(crate) in_flight: usize,
}

#[derive(Debug)]
pub(crate) struct Queue {
    pub(crate) name: String,
    pub(crate) options: QueueOptions,
    /// Declaring connection for transient queues; `None` for durable ones.
    pub(crate) owner: Option<ConnectionId>,
    pub(crate) messages: VecDeque<QueuedMessage>,
    /// Ready messages kept at most; the oldest go first.
    pub(crate) max_length: Option<usize>,
    pub(crate) consumers: Vec<Consumer>,
    /// Round-robin cursor into `consumers`.
    cursor: usize,
    /// Set once anyone has consumed; auto-delete only applies after that.
    had_consumer: bool,
}

impl Queue {
    pub(crate) fn new(name: &str, options: QueueOptions, declared_by: ConnectionId) -> Self {
        let owner = match options.durability {
            Durability::Transient => Some(declared_by),
            Durability::Durable => None,
        };
        Self {
            name: name.to_string(),
            options,
            owner,
            messages: VecDeque::new(),
            max_length: None,
            consumers: Vec::new(),
            cursor: 0,
            had_consumer: false,
        }
    }

    pub(crate) fn descriptor(&self) -> QueueDescriptor {
        QueueDescriptor {
            name: self.name.clone(),
            message_count: self.messages.len(),
            consumer_count: self.consumers.len(),
        }
    }

    /// Drops the oldest ready messages beyond `max_length`. Returns how
    /// many went.
    pub(crate) fn trim_to_max_length(&mut self) -> usize {
        let Some(limit) = self.max_length else {
            return 0;
        };
        let excess = self.messages.len().saturating_sub(limit);
        self.messages.drain(..excess);
        excess
    }

    /// Durable queues are shared; transient queues only serve their owner.
    pub(crate) fn accessible_by(&self, connection: ConnectionId) -> bool {
        self.owner.is_none_or(|owner| owner == connection)
    }

    pub(crate) fn add_consumer(&mut self, key: ConsumerKey, sink: DeliverySink) {
        self.consumers.push(Consumer {
            key,
            sink,
            in_flight: 0,
        });
        self.had_consumer = true;
    }

    /// Removes every consumer matching `pred`. Returns how many went away.
    pub(crate) fn remove_consumers(&mut self, pred: impl Fn(&ConsumerKey) -> bool) -> usize {
        let before = self.consumers.len();
        self.consumers.retain(|c| !pred(&c.key));
        if self.cursor >= self.consumers.len() {
            self.cursor = 0;
        }
        before - self.consumers.len()
    }

    /// `true` for a transient queue whose last consumer has gone.
    pub(crate) fn should_auto_delete(&self) -> bool {
        self.options.durability == Durability::Transient
            && self.had_consumer
            && self.consumers.is_empty()
    }

    /// Picks the next consumer with room in its prefetch window, rotating
    /// so consumers take turns.
    pub(crate) fn next_ready_consumer(&mut self, prefetch: usize) -> Option<usize> {
        let count = self.consumers.len();
        for offset in 0..count {
            let idx = (self.cursor + offset) % count;
            if prefetch == 0 || self.consumers[idx].in_flight < prefetch {
                self.cursor = (idx + 1) % count;
                return Some(idx);
            }
        }
        None
    }

    /// Frees one slot in the window of the consumer identified by `key`.
    pub(crate) fn settle(&mut self, key: ConsumerKey) {
        if let Some(consumer) = self.consumers.iter_mut().find(|c| c.key == key) {
            consumer.in_flight = consumer.in_flight.saturating_sub(1);
        }
    }
}
