//! The broker engine: exchanges, queues, deliveries and acknowledgments.
//!
//! [`Broker`] is a plain synchronous state machine. It never blocks and
//! never touches the network; deliveries leave through each consumer's
//! [`DeliverySink`]. The server wraps it in a mutex and feeds it frames.
//!
//! Lifecycle of one message:
//!
//! ```text
//! publish ─► exchange ─► queue(s) ─► consumer (unacked) ─┬─ ack ─────────► gone
//!                                        ▲               ├─ nack requeue ─► head of queue
//!                                        └───────────────┤  (over limit) ─► dead-letter
//!                                                        └─ nack discard ─► dead-letter
//! ```

use std::collections::HashMap;

use peril_protocol::{
    ChannelId, Delivery, DeliveryTag, Durability, ExchangeKind, Message, QueueDescriptor,
    QueueOptions,
};
use peril_transport::ConnectionId;

use crate::config::BrokerConfig;
use crate::exchange::Exchange;
use crate::queue::{ConsumerKey, DeliverySink, Queue, QueuedMessage};
use crate::BrokerError;

/// Owner recorded for queues the broker provisions itself.
const BROKER_CONNECTION: ConnectionId = ConnectionId::new(0);

/// A delivery that has been handed to a consumer and not yet settled.
#[derive(Debug)]
struct Unacked {
    queue: String,
    consumer: ConsumerKey,
    message: QueuedMessage,
}

/// In-memory broker state.
pub struct Broker {
    prefetch: usize,
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    unacked: HashMap<DeliveryTag, Unacked>,
    last_tag: u64,
}

impl Broker {
    /// Creates a broker with the exchanges and dead-letter queue from
    /// `config` already in place.
    pub fn new(config: BrokerConfig) -> Self {
        let mut broker = Self {
            prefetch: config.prefetch,
            exchanges: HashMap::new(),
            queues: HashMap::new(),
            unacked: HashMap::new(),
            last_tag: 0,
        };

        for exchange in config.exchanges {
            broker
                .exchanges
                .insert(exchange.name, Exchange::new(exchange.kind));
        }

        if let Some(dead_letter) = config.dead_letter {
            let exchange = broker
                .exchanges
                .entry(dead_letter.exchange.clone())
                .or_insert_with(|| Exchange::new(ExchangeKind::Fanout));
            exchange.bind(&dead_letter.queue, "#");
            let mut queue = Queue::new(
                &dead_letter.queue,
                QueueOptions::new(Durability::Durable),
                BROKER_CONNECTION,
            );
            queue.max_length = dead_letter.max_length;
            broker.queues.insert(dead_letter.queue.clone(), queue);
            tracing::debug!(
                exchange = %dead_letter.exchange,
                queue = %dead_letter.queue,
                max_length = ?dead_letter.max_length,
                "dead-letter queue provisioned"
            );
        }

        broker
    }

    // -----------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------

    /// Declares a queue, or confirms an existing one.
    ///
    /// Re-declaring with identical options is a no-op that reports the
    /// current counts. Different options fail with
    /// [`BrokerError::PreconditionFailed`]; someone else's transient queue
    /// fails with [`BrokerError::ResourceLocked`].
    pub fn declare_queue(
        &mut self,
        connection: ConnectionId,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueDescriptor, BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::PreconditionFailed(
                "queue name must not be empty".into(),
            ));
        }

        if let Some(queue) = self.queues.get(name) {
            if !queue.accessible_by(connection) {
                return Err(BrokerError::ResourceLocked(name.to_string()));
            }
            if queue.options != options {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue '{name}' already declared as {} with different arguments",
                    queue.options.durability
                )));
            }
            return Ok(queue.descriptor());
        }

        let queue = Queue::new(name, options, connection);
        let descriptor = queue.descriptor();
        tracing::debug!(
            %connection,
            queue = name,
            durability = %queue.options.durability,
            "queue declared"
        );
        self.queues.insert(name.to_string(), queue);
        Ok(descriptor)
    }

    /// Binds `queue` to `exchange` with `routing_key`. Idempotent.
    pub fn bind_queue(
        &mut self,
        connection: ConnectionId,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.queue_mut(connection, queue)?;
        let target = self
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;
        target.bind(queue, routing_key);
        tracing::debug!(%connection, queue, exchange, routing_key, "queue bound");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------

    /// Routes a message to every matching queue and returns how many
    /// queues it landed in.
    ///
    /// A message that matches no binding is dropped; that is not an error.
    pub fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        message: Message,
    ) -> Result<usize, BrokerError> {
        let targets = self
            .exchanges
            .get(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?
            .route(routing_key);

        if targets.is_empty() {
            tracing::debug!(exchange, routing_key, "unroutable message dropped");
            return Ok(0);
        }

        self.enqueue(&targets, exchange, routing_key, &message);
        Ok(targets.len())
    }

    /// Starts pushing `queue`'s messages to `sink`, tagged with `channel`.
    pub fn consume(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        queue: &str,
        sink: DeliverySink,
    ) -> Result<(), BrokerError> {
        let key = ConsumerKey {
            connection,
            channel,
        };
        let target = self.queue_mut(connection, queue)?;
        if target.consumers.iter().any(|c| c.key == key) {
            return Err(BrokerError::PreconditionFailed(format!(
                "channel {channel} is already consuming from '{queue}'"
            )));
        }
        target.add_consumer(key, sink);
        tracing::debug!(%connection, %channel, queue, "consumer attached");
        self.dispatch(queue);
        Ok(())
    }

    /// Acknowledges a delivery; the message is gone for good.
    pub fn ack(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        tag: DeliveryTag,
    ) -> Result<(), BrokerError> {
        let entry = self.take_unacked(connection, channel, tag)?;
        if let Some(queue) = self.queues.get_mut(&entry.queue) {
            queue.settle(entry.consumer);
        }
        self.dispatch(&entry.queue);
        Ok(())
    }

    /// Rejects a delivery.
    ///
    /// With `requeue` the message goes back to the head of its queue and is
    /// marked redelivered, unless that would exceed the queue's delivery
    /// limit. Otherwise it is routed to the queue's dead-letter exchange,
    /// or dropped if the queue has none.
    pub fn nack(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), BrokerError> {
        let Unacked {
            queue: name,
            consumer,
            mut message,
        } = self.take_unacked(connection, channel, tag)?;

        let Some(queue) = self.queues.get_mut(&name) else {
            return Ok(());
        };
        queue.settle(consumer);

        if requeue {
            message.requeues += 1;
            let over_limit = queue
                .options
                .delivery_limit
                .is_some_and(|limit| message.requeues > limit);
            if !over_limit {
                message.redelivered = true;
                queue.messages.push_front(message);
                self.dispatch(&name);
                return Ok(());
            }
            tracing::warn!(
                queue = %name,
                requeues = message.requeues,
                "delivery limit exceeded"
            );
        }

        let dead_letter_exchange = queue.options.dead_letter_exchange.clone();
        self.dead_letter(&name, dead_letter_exchange, message);
        self.dispatch(&name);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    /// Cancels the channel's consumers and requeues its unacked messages.
    pub fn close_channel(&mut self, connection: ConnectionId, channel: ChannelId) {
        self.release(|key| key.connection == connection && key.channel == channel);
    }

    /// Closes every channel of the connection and deletes the transient
    /// queues it declared.
    pub fn close_connection(&mut self, connection: ConnectionId) {
        self.release(|key| key.connection == connection);

        let owned: Vec<String> = self
            .queues
            .values()
            .filter(|q| q.owner == Some(connection))
            .map(|q| q.name.clone())
            .collect();
        for name in owned {
            self.delete_queue(&name);
        }
        tracing::debug!(%connection, "connection released");
    }

    // -----------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------

    /// Current counts for `name`, if it exists.
    pub fn queue(&self, name: &str) -> Option<QueueDescriptor> {
        self.queues.get(name).map(Queue::descriptor)
    }

    /// Number of deliveries handed out and not yet settled.
    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn queue_mut(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Result<&mut Queue, BrokerError> {
        let queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        if !queue.accessible_by(connection) {
            return Err(BrokerError::ResourceLocked(name.to_string()));
        }
        Ok(queue)
    }

    fn take_unacked(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        tag: DeliveryTag,
    ) -> Result<Unacked, BrokerError> {
        let key = ConsumerKey {
            connection,
            channel,
        };
        let issued_here = self
            .unacked
            .get(&tag)
            .is_some_and(|entry| entry.consumer == key);
        if !issued_here {
            return Err(BrokerError::UnknownDeliveryTag(tag));
        }
        self.unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag(tag))
    }

    fn enqueue(&mut self, targets: &[String], exchange: &str, routing_key: &str, message: &Message) {
        for name in targets {
            if let Some(queue) = self.queues.get_mut(name) {
                queue
                    .messages
                    .push_back(QueuedMessage::new(exchange, routing_key, message.clone()));
                let dropped = queue.trim_to_max_length();
                if dropped > 0 {
                    tracing::debug!(queue = %name, dropped, "queue full, oldest messages dropped");
                }
            }
        }
        for name in targets {
            self.dispatch(name);
        }
    }

    fn dead_letter(&mut self, queue: &str, exchange: Option<String>, message: QueuedMessage) {
        let Some(exchange) = exchange else {
            tracing::debug!(queue, "message discarded");
            return;
        };
        let Some(router) = self.exchanges.get(&exchange) else {
            tracing::warn!(queue, %exchange, "dead-letter exchange missing, message dropped");
            return;
        };

        let targets = router.route(&message.routing_key);
        tracing::debug!(
            queue,
            %exchange,
            routing_key = %message.routing_key,
            targets = targets.len(),
            "message dead-lettered"
        );
        self.enqueue(&targets, &exchange, &message.routing_key, &message.message);
    }

    /// Hands queued messages to consumers until the queue is empty or every
    /// consumer's prefetch window is full.
    fn dispatch(&mut self, name: &str) {
        let Some(queue) = self.queues.get_mut(name) else {
            return;
        };

        while !queue.messages.is_empty() {
            let Some(idx) = queue.next_ready_consumer(self.prefetch) else {
                break;
            };
            let Some(message) = queue.messages.pop_front() else {
                break;
            };

            self.last_tag += 1;
            let tag = DeliveryTag(self.last_tag);
            let consumer = &mut queue.consumers[idx];
            let delivery = Delivery {
                channel: consumer.key.channel,
                delivery_tag: tag,
                redelivered: message.redelivered,
                exchange: message.exchange.clone(),
                routing_key: message.routing_key.clone(),
                message: message.message.clone(),
            };

            if consumer.sink.send(delivery).is_err() {
                // The connection is on its way out; its cleanup is queued.
                let key = consumer.key;
                queue.messages.push_front(message);
                queue.remove_consumers(|k| *k == key);
                continue;
            }

            consumer.in_flight += 1;
            let key = consumer.key;
            self.unacked.insert(
                tag,
                Unacked {
                    queue: name.to_string(),
                    consumer: key,
                    message,
                },
            );
        }
    }

    /// Detaches the matching consumers, requeues their unacked messages in
    /// original order, and auto-deletes transient queues left without
    /// consumers.
    fn release(&mut self, matches: impl Fn(&ConsumerKey) -> bool) {
        for queue in self.queues.values_mut() {
            queue.remove_consumers(&matches);
        }

        let mut tags: Vec<DeliveryTag> = self
            .unacked
            .iter()
            .filter(|(_, entry)| matches(&entry.consumer))
            .map(|(tag, _)| *tag)
            .collect();
        // Newest first, so pushing each to the front restores publish order.
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(entry) = self.unacked.remove(&tag) {
                if let Some(queue) = self.queues.get_mut(&entry.queue) {
                    let mut message = entry.message;
                    message.redelivered = true;
                    queue.messages.push_front(message);
                }
            }
        }

        let abandoned: Vec<String> = self
            .queues
            .values()
            .filter(|q| q.should_auto_delete())
            .map(|q| q.name.clone())
            .collect();
        for name in abandoned {
            self.delete_queue(&name);
        }

        let names: Vec<String> = self.queues.keys().cloned().collect();
        for name in names {
            self.dispatch(&name);
        }
    }

    fn delete_queue(&mut self, name: &str) {
        let Some(queue) = self.queues.remove(name) else {
            return;
        };
        for exchange in self.exchanges.values_mut() {
            exchange.unbind_queue(name);
        }
        self.unacked.retain(|_, entry| entry.queue != name);
        tracing::debug!(
            queue = name,
            dropped = queue.messages.len(),
            "queue deleted"
        );
    }
}
