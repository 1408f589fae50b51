//! Typed publish/subscribe over the Peril broker.
//!
//! - [`Connection`] / [`Channel`]: the broker client.
//! - [`declare_and_bind`]: queue topology with dead-lettering attached.
//! - [`publish`], [`publish_json`], [`publish_bincode`]: encode and send.
//! - [`subscribe`]: a worker per subscription, driven by a [`Handler`]
//!   that answers each message with a [`Disposition`].

mod connection;
mod error;
mod publish;
mod subscribe;
mod topology;

pub use connection::{Channel, Connection};
pub use error::PubSubError;
pub use publish::{publish, publish_bincode, publish_json};
pub use subscribe::{Disposition, Handler, Subscription, subscribe};
pub use topology::declare_and_bind;
