//! Wire protocol for Peril.
//!
//! This crate defines the "language" game processes and the broker speak:
//!
//! - **Codec** ([`Codec`], [`JsonCodec`], [`BincodeCodec`], [`Encoding`]) -
//!   how typed payloads become tagged bytes and back.
//! - **Routing** ([`routing`]): which exchange and key each kind of game
//!   traffic travels on.
//! - **Types** ([`ClientFrame`], [`ServerFrame`], [`Delivery`], etc.) -
//!   the broker frames themselves.
//! - **Errors** ([`ProtocolError`]): what can go wrong with the bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and pub/sub
//! (typed publish/subscribe). It knows nothing about sockets or game rules.
//!
//! ```text
//! Transport (bytes) → Protocol (frames, payloads) → PubSub (queues, handlers)
//! ```

mod codec;
mod error;
pub mod routing;
mod types;

pub use codec::{BincodeCodec, Codec, EncodedMessage, Encoding, JsonCodec, decode};
pub use error::{CodecSource, ProtocolError};
pub use types::{
    ChannelId, ClientFrame, Delivery, DeliveryTag, Durability, ExchangeKind, Message,
    PROTOCOL_VERSION, QueueDescriptor, QueueOptions, RequestId, ServerFrame, reply_code,
};
