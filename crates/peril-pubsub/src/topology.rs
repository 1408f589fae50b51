//! Queue declaration and binding.

use peril_protocol::routing::queue_options;
use peril_protocol::{Durability, QueueDescriptor};

use crate::{Channel, Connection, PubSubError};

/// Opens a channel, declares `queue` with the given durability and the
/// shared dead-letter exchange, and binds it to `exchange` with
/// `routing_key`.
///
/// On failure the channel is closed again and the error is returned
/// as-is. Topology errors are misconfiguration; nothing here retries.
pub async fn declare_and_bind(
    conn: &Connection,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: Durability,
) -> Result<(Channel, QueueDescriptor), PubSubError> {
    let channel = conn.open_channel().await?;

    let declared = async {
        let descriptor = channel
            .declare_queue(queue, queue_options(durability))
            .await?;
        channel.bind_queue(queue, exchange, routing_key).await?;
        Ok::<_, PubSubError>(descriptor)
    }
    .await;

    match declared {
        Ok(descriptor) => {
            tracing::debug!(
                queue,
                exchange,
                routing_key,
                %durability,
                messages = descriptor.message_count,
                "queue declared and bound"
            );
            Ok((channel, descriptor))
        }
        Err(e) => {
            tracing::error!(queue, exchange, routing_key, error = %e, "topology setup failed");
            if let Err(close_err) = channel.close().await {
                tracing::debug!(error = %close_err, "closing channel after topology failure");
            }
            Err(e)
        }
    }
}
