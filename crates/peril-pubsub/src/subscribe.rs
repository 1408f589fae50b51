//! Subscription workers.
//!
//! [`subscribe`] sets up the queue, starts consuming, and spawns one worker
//! task that owns the channel. The worker pulls one delivery at a time,
//! decodes it, hands it to the [`Handler`], and turns the returned
//! [`Disposition`] into an ack or nack:
//!
//! | outcome                    | broker action                    |
//! |----------------------------|----------------------------------|
//! | `Accept`                   | ack, message removed             |
//! | `RetryLater`               | nack + requeue, back to the head |
//! | `Discard`                  | nack, dead-lettered              |
//! | undecodable / no marker    | nack, dead-lettered, handler skipped |
//! | handler panicked           | nack, dead-lettered              |

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use peril_protocol::{DeliveryTag, Durability, decode};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::topology::declare_and_bind;
use crate::{Channel, Connection, PubSubError};

/// What a handler wants done with the message it just saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove it.
    Accept,
    /// Could not finish (e.g. a dependent publish failed); put it back.
    RetryLater,
    /// Not relevant to this consumer; remove it and dead-letter it.
    Discard,
}

/// Business logic invoked for every decoded message.
///
/// Implemented for any `Fn(T) -> impl Future<Output = Disposition>`, so a
/// closure returning an `async move` block works as a handler.
pub trait Handler<T>: Send + Sync + 'static {
    fn handle(&self, message: T) -> impl Future<Output = Disposition> + Send;
}

impl<T, F, Fut> Handler<T> for F
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Disposition> + Send,
{
    fn handle(&self, message: T) -> impl Future<Output = Disposition> + Send {
        self(message)
    }
}

/// A running subscription worker.
///
/// Dropping the handle leaves the worker running; it stops when the
/// connection closes or [`abort`](Self::abort) is called.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    worker: JoinHandle<()>,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stops the worker. Its unsettled delivery is requeued by the broker
    /// once the channel goes away.
    pub fn abort(&self) {
        self.worker.abort();
    }

    /// Waits for the worker to exit.
    pub async fn join(self) {
        let _ = self.worker.await;
    }
}

/// Declares and binds `queue`, starts consuming, and spawns a worker that
/// feeds every message to `handler`.
///
/// Returns as soon as the broker has registered the consumer. Setup
/// failures are returned; nothing is spawned in that case.
pub async fn subscribe<T, H>(
    conn: &Connection,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: Durability,
    handler: H,
) -> Result<Subscription, PubSubError>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    let (channel, _descriptor) =
        declare_and_bind(conn, exchange, queue, routing_key, durability).await?;

    if let Err(e) = channel.consume(queue).await {
        tracing::error!(queue, error = %e, "consume failed");
        if let Err(close_err) = channel.close().await {
            tracing::debug!(error = %close_err, "closing channel after consume failure");
        }
        return Err(e);
    }

    let worker = tokio::spawn(run_worker::<T, H>(channel, queue.to_string(), handler));
    tracing::info!(queue, exchange, routing_key, "subscribed");
    Ok(Subscription {
        queue: queue.to_string(),
        worker,
    })
}

async fn run_worker<T, H>(mut channel: Channel, queue: String, handler: H)
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    while let Some(delivery) = channel.next_delivery().await {
        let tag = delivery.delivery_tag;
        let content_type = delivery.message.content_type.as_deref();

        let disposition = match decode::<T>(&delivery.message.body, content_type) {
            Ok(message) => match AssertUnwindSafe(async { handler.handle(message).await })
                .catch_unwind()
                .await
            {
                Ok(disposition) => disposition,
                Err(_) => {
                    tracing::error!(%queue, delivery_tag = %tag, "handler panicked, discarding message");
                    Disposition::Discard
                }
            },
            Err(e) => {
                tracing::warn!(
                    %queue,
                    delivery_tag = %tag,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "dropping undecodable message"
                );
                Disposition::Discard
            }
        };

        tracing::debug!(
            %queue,
            delivery_tag = %tag,
            redelivered = delivery.redelivered,
            ?disposition,
            "message handled"
        );

        if let Err(e) = settle(&channel, tag, disposition).await {
            match e {
                PubSubError::ConnectionClosed | PubSubError::Transport(_) => {
                    tracing::warn!(%queue, error = %e, "lost broker while settling");
                    break;
                }
                _ => tracing::warn!(%queue, delivery_tag = %tag, error = %e, "settle refused"),
            }
        }
    }

    tracing::info!(%queue, "subscription worker stopped");
}

async fn settle(
    channel: &Channel,
    tag: DeliveryTag,
    disposition: Disposition,
) -> Result<(), PubSubError> {
    match disposition {
        Disposition::Accept => channel.ack(tag).await,
        Disposition::RetryLater => channel.nack(tag, true).await,
        Disposition::Discard => channel.nack(tag, false).await,
    }
}
