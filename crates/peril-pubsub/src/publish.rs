//! Typed publishing.

use peril_protocol::{Encoding, Message};
use serde::Serialize;

use crate::{Channel, PubSubError};

/// Encodes `value` with `encoding` and publishes it.
///
/// Returns once the broker has accepted the message. Whether any consumer
/// ever sees it is not part of the contract; an unroutable message is
/// dropped by the broker without an error. Failures are reported to the
/// caller and never retried here.
pub async fn publish<T: Serialize>(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    value: &T,
    encoding: Encoding,
) -> Result<(), PubSubError> {
    let encoded = encoding.encode(value)?;
    let message = Message {
        content_type: Some(encoded.content_type.to_string()),
        body: encoded.body,
    };
    channel.publish(exchange, routing_key, message).await?;
    tracing::trace!(exchange, routing_key, content_type = encoded.content_type, "published");
    Ok(())
}

/// [`publish`] with the structured-text encoding.
pub async fn publish_json<T: Serialize>(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PubSubError> {
    publish(channel, exchange, routing_key, value, Encoding::Json).await
}

/// [`publish`] with the compact positional encoding.
pub async fn publish_bincode<T: Serialize>(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PubSubError> {
    publish(channel, exchange, routing_key, value, Encoding::Bincode).await
}
