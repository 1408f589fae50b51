//! In-memory message broker for Peril.
//!
//! Game processes never talk to each other directly. They publish to named
//! exchanges, and the broker copies each message into every queue whose
//! binding matches the routing key. Consumers drain queues and settle each
//! delivery with an ack or a nack.
//!
//! - [`Broker`]: the synchronous engine (exchanges, queues, unacked
//!   deliveries, dead-lettering).
//! - [`BrokerServer`]: serves the engine over the WebSocket transport,
//!   speaking the frames from `peril-protocol`.
//! - [`BrokerConfig`]: pre-provisioned topology and prefetch.
//!
//! Durable queues survive their consumers and connections, but not a
//! broker restart: all state lives in memory.

mod broker;
mod config;
mod error;
mod exchange;
mod handler;
mod queue;
mod server;

pub use broker::Broker;
pub use config::{BrokerConfig, DEFAULT_DEAD_LETTER_MAX_LENGTH, DeadLetterConfig, ExchangeConfig};
pub use error::BrokerError;
pub use peril_transport::ConnectionId;
pub use queue::DeliverySink;
pub use server::{BrokerServer, BrokerServerBuilder};
