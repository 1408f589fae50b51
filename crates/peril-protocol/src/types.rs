//! Broker wire types: the frames a Peril process and the broker exchange.
//!
//! A client connection carries many logical *channels*. Every request a
//! client makes is a [`ClientFrame`] tagged with a `request_id`; the broker
//! answers each one with exactly one reply frame carrying the same id.
//! Deliveries flow the other way unprompted, tagged with the channel that
//! consumes them.
//!
//! ```text
//! client                                   broker
//!   │ Hello { version }                      │
//!   │ ─────────────────────────────────────► │
//!   │                 HelloAck { connection } │
//!   │ ◄───────────────────────────────────── │
//!   │ DeclareQueue { request_id: 7, .. }     │
//!   │ ─────────────────────────────────────► │
//!   │          QueueDeclared { request_id: 7 }│
//!   │ ◄───────────────────────────────────── │
//!   │                 Deliver { delivery }   │
//!   │ ◄───────────────────────────────────── │
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The broker protocol version. A client must announce it in `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Correlates a client request with the broker's reply.
pub type RequestId = u64;

/// Reply codes carried in [`ServerFrame::Error`].
///
/// The numbering follows the AMQP reply-code table so the meaning is
/// familiar to anyone who has operated a broker before.
pub mod reply_code {
    /// An exchange, queue, channel or delivery does not exist.
    pub const NOT_FOUND: u16 = 404;
    /// An exclusive queue belongs to a different connection.
    pub const RESOURCE_LOCKED: u16 = 405;
    /// A re-declaration disagrees with the existing queue.
    pub const PRECONDITION_FAILED: u16 = 406;
    /// A frame could not be parsed or arrived out of order.
    pub const SYNTAX_ERROR: u16 = 502;
    /// The client's channel is unusable.
    pub const CHANNEL_ERROR: u16 = 504;
    /// The handshake announced an unsupported version.
    pub const NOT_ALLOWED: u16 = 530;
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A logical channel multiplexed over one connection.
///
/// Channel ids are chosen by the client and only need to be unique within
/// that client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Identifies one delivery so it can be acknowledged.
///
/// Assigned by the broker; unique for the broker's lifetime. A message
/// that is redelivered gets a fresh tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// How long a queue lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Durability {
    /// Exclusive to the declaring connection, deleted when that connection
    /// closes or when the last consumer goes away. Good for per-session
    /// queues such as one player's pause notifications.
    Transient,

    /// Outlives consumers and connections. Good for shared streams that must
    /// not lose messages between sessions (war declarations, game logs).
    Durable,
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Durable => f.write_str("durable"),
        }
    }
}

/// How an exchange picks the queues for a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExchangeKind {
    /// Binding key must equal the routing key.
    Direct,
    /// Binding key is a dot-separated pattern; `*` matches exactly one
    /// segment and `#` matches zero or more.
    Topic,
    /// Every bound queue gets every message.
    Fanout,
}

/// Parameters of a queue declaration.
///
/// Two declarations of the same queue must agree on every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    pub durability: Durability,

    /// Where negatively-acknowledged (non-requeued) messages are routed.
    #[serde(default)]
    pub dead_letter_exchange: Option<String>,

    /// Requeue budget per message. A message requeued more often than this
    /// is dead-lettered instead. `None` means unlimited.
    #[serde(default)]
    pub delivery_limit: Option<u32>,
}

impl QueueOptions {
    /// Options with the given durability and no dead-letter policy.
    pub fn new(durability: Durability) -> Self {
        Self {
            durability,
            dead_letter_exchange: None,
            delivery_limit: None,
        }
    }

    /// Routes discarded messages to `exchange`.
    pub fn dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }

    /// Caps the number of times one message may be requeued.
    pub fn delivery_limit(mut self, limit: u32) -> Self {
        self.delivery_limit = Some(limit);
        self
    }
}

/// What the broker reports back after a successful declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub name: String,
    pub message_count: usize,
    pub consumer_count: usize,
}

// ---------------------------------------------------------------------------
// Messages and deliveries
// ---------------------------------------------------------------------------

/// A published message as the broker stores it: marker plus opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Encoding marker, e.g. `application/json`. Optional on the wire
    /// because publishers outside Peril may omit it.
    #[serde(default)]
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A message pushed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub channel: ChannelId,
    pub delivery_tag: DeliveryTag,
    /// `true` if this message was handed out before and requeued.
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message: Message,
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Client → broker.
///
/// `#[serde(tag = "type")]` gives internally tagged JSON, e.g.
/// `{ "type": "Ack", "request_id": 3, "channel": 1, "delivery_tag": 12 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// First frame on every connection.
    Hello { version: u32 },

    OpenChannel {
        request_id: RequestId,
        channel: ChannelId,
    },

    /// Cancels the channel's consumers and requeues whatever it had not
    /// acknowledged yet.
    CloseChannel {
        request_id: RequestId,
        channel: ChannelId,
    },

    DeclareQueue {
        request_id: RequestId,
        channel: ChannelId,
        queue: String,
        options: QueueOptions,
    },

    BindQueue {
        request_id: RequestId,
        channel: ChannelId,
        queue: String,
        exchange: String,
        routing_key: String,
    },

    Publish {
        request_id: RequestId,
        channel: ChannelId,
        exchange: String,
        routing_key: String,
        message: Message,
    },

    /// Starts pushing the queue's messages to this channel.
    Consume {
        request_id: RequestId,
        channel: ChannelId,
        queue: String,
    },

    Ack {
        request_id: RequestId,
        channel: ChannelId,
        delivery_tag: DeliveryTag,
    },

    Nack {
        request_id: RequestId,
        channel: ChannelId,
        delivery_tag: DeliveryTag,
        requeue: bool,
    },
}

impl ClientFrame {
    /// The request id this frame expects a reply for. `Hello` has none.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Hello { .. } => None,
            Self::OpenChannel { request_id, .. }
            | Self::CloseChannel { request_id, .. }
            | Self::DeclareQueue { request_id, .. }
            | Self::BindQueue { request_id, .. }
            | Self::Publish { request_id, .. }
            | Self::Consume { request_id, .. }
            | Self::Ack { request_id, .. }
            | Self::Nack { request_id, .. } => Some(*request_id),
        }
    }
}

/// Broker → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Handshake accepted. `connection` is the broker's id for this client,
    /// useful when reading broker logs.
    HelloAck { version: u32, connection: u64 },

    /// The request succeeded and has no payload.
    Ok { request_id: RequestId },

    /// Reply to `DeclareQueue`.
    QueueDeclared {
        request_id: RequestId,
        queue: QueueDescriptor,
    },

    /// The request failed. `request_id` is `None` for connection-level
    /// failures that cannot be pinned on one request.
    Error {
        request_id: Option<RequestId>,
        code: u16,
        message: String,
    },

    Deliver { delivery: Delivery },
}
