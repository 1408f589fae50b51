//! Client side of the broker protocol: one connection, many channels.
//!
//! A [`Connection`] owns the socket and a background reader task. The
//! reader routes each reply to the request waiting for it and each
//! delivery to the [`Channel`] that consumes it. Sends go straight to the
//! transport, which serializes concurrent writers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use peril_protocol::{
    ChannelId, ClientFrame, Codec, Delivery, DeliveryTag, JsonCodec, Message, PROTOCOL_VERSION,
    QueueDescriptor, QueueOptions, RequestId, ServerFrame,
};
use peril_transport::{Connection as _, WebSocketConnection};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::PubSubError;
use crate::error::{self, Refusal};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    transport: WebSocketConnection,
    broker_id: u64,
    next_request: AtomicU64,
    next_channel: AtomicU64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ServerFrame>>>,
    consumers: Mutex<HashMap<ChannelId, mpsc::UnboundedSender<Delivery>>>,
    closed: AtomicBool,
}

impl Shared {
    fn next_request_id(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends `frame` and waits for its reply. A broker `Error` reply is
    /// turned into an error by `refused`.
    async fn request(&self, frame: ClientFrame, refused: Refusal) -> Result<ServerFrame, PubSubError> {
        let request_id = frame
            .request_id()
            .ok_or_else(|| PubSubError::UnexpectedReply("request without id".into()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);
        if self.closed.load(Ordering::Acquire) {
            self.pending.lock().await.remove(&request_id);
            return Err(PubSubError::ConnectionClosed);
        }

        let bytes = JsonCodec.encode(&frame)?;
        if let Err(e) = self.transport.send(&bytes).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e.into());
        }

        match rx.await.map_err(|_| PubSubError::ConnectionClosed)? {
            ServerFrame::Error { code, message, .. } => Err(refused(code, message)),
            reply => Ok(reply),
        }
    }

    /// Sends a request whose only success reply is `Ok`.
    async fn request_ok(&self, frame: ClientFrame, refused: Refusal) -> Result<(), PubSubError> {
        match self.request(frame, refused).await? {
            ServerFrame::Ok { .. } => Ok(()),
            other => Err(PubSubError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

/// A handle to one broker connection. Cheap to clone; every clone talks
/// over the same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Dials the broker at `url` (e.g. `ws://127.0.0.1:5672`) and performs
    /// the version handshake.
    pub async fn connect(url: &str) -> Result<Self, PubSubError> {
        let transport = WebSocketConnection::connect(url).await?;
        let hello = JsonCodec.encode(&ClientFrame::Hello {
            version: PROTOCOL_VERSION,
        })?;
        transport.send(&hello).await?;

        let data = tokio::time::timeout(HANDSHAKE_TIMEOUT, transport.recv())
            .await
            .map_err(|_| PubSubError::Handshake("timed out waiting for HelloAck".into()))??
            .ok_or(PubSubError::ConnectionClosed)?;

        let broker_id = match JsonCodec.decode::<ServerFrame>(&data)? {
            ServerFrame::HelloAck { connection, .. } => connection,
            ServerFrame::Error { code, message, .. } => {
                return Err(PubSubError::Handshake(format!("{message} ({code})")));
            }
            other => {
                return Err(PubSubError::Handshake(format!("unexpected frame {other:?}")));
            }
        };

        let shared = Arc::new(Shared {
            transport,
            broker_id,
            next_request: AtomicU64::new(1),
            next_channel: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            consumers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(read_frames(Arc::clone(&shared)));

        tracing::info!(url, connection = broker_id, "connected to broker");
        Ok(Self { shared })
    }

    /// The id the broker assigned to this connection (matches its logs).
    pub fn broker_id(&self) -> u64 {
        self.shared.broker_id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Opens a fresh logical channel.
    pub async fn open_channel(&self) -> Result<Channel, PubSubError> {
        let id = ChannelId(self.shared.next_channel.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.consumers.lock().await.insert(id, tx);

        let frame = ClientFrame::OpenChannel {
            request_id: self.shared.next_request_id(),
            channel: id,
        };
        if let Err(e) = self.shared.request_ok(frame, error::channel).await {
            self.shared.consumers.lock().await.remove(&id);
            return Err(e);
        }

        tracing::debug!(channel = %id, "channel opened");
        Ok(Channel {
            shared: Arc::clone(&self.shared),
            id,
            deliveries: rx,
        })
    }

    /// Closes the socket. Pending requests fail and every channel's
    /// delivery stream ends.
    pub async fn close(&self) -> Result<(), PubSubError> {
        self.shared.transport.close().await?;
        Ok(())
    }
}

/// One logical channel on a [`Connection`].
///
/// Deliveries for a consumer started on this channel are read with
/// [`next_delivery`](Self::next_delivery) and settled with
/// [`ack`](Self::ack) or [`nack`](Self::nack) on the same channel.
pub struct Channel {
    shared: Arc<Shared>,
    id: ChannelId,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Channel {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub async fn declare_queue(
        &self,
        queue: &str,
        options: QueueOptions,
    ) -> Result<QueueDescriptor, PubSubError> {
        let frame = ClientFrame::DeclareQueue {
            request_id: self.shared.next_request_id(),
            channel: self.id,
            queue: queue.to_string(),
            options,
        };
        match self.shared.request(frame, error::topology).await? {
            ServerFrame::QueueDeclared { queue, .. } => Ok(queue),
            other => Err(PubSubError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), PubSubError> {
        let frame = ClientFrame::BindQueue {
            request_id: self.shared.next_request_id(),
            channel: self.id,
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        self.shared.request_ok(frame, error::topology).await
    }

    /// Hands an already-encoded message to the broker.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: Message,
    ) -> Result<(), PubSubError> {
        let frame = ClientFrame::Publish {
            request_id: self.shared.next_request_id(),
            channel: self.id,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message,
        };
        self.shared.request_ok(frame, error::publish).await
    }

    /// Starts consuming `queue` on this channel.
    pub async fn consume(&self, queue: &str) -> Result<(), PubSubError> {
        let frame = ClientFrame::Consume {
            request_id: self.shared.next_request_id(),
            channel: self.id,
            queue: queue.to_string(),
        };
        self.shared.request_ok(frame, error::consume).await
    }

    /// Waits for the next delivery. `None` once the connection is gone.
    pub async fn next_delivery(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    pub async fn ack(&self, delivery_tag: DeliveryTag) -> Result<(), PubSubError> {
        let frame = ClientFrame::Ack {
            request_id: self.shared.next_request_id(),
            channel: self.id,
            delivery_tag,
        };
        self.shared.request_ok(frame, error::acknowledge).await
    }

    pub async fn nack(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<(), PubSubError> {
        let frame = ClientFrame::Nack {
            request_id: self.shared.next_request_id(),
            channel: self.id,
            delivery_tag,
            requeue,
        };
        self.shared.request_ok(frame, error::acknowledge).await
    }

    /// Closes the channel. The broker requeues whatever it had not
    /// acknowledged.
    pub async fn close(self) -> Result<(), PubSubError> {
        self.shared.consumers.lock().await.remove(&self.id);
        let frame = ClientFrame::CloseChannel {
            request_id: self.shared.next_request_id(),
            channel: self.id,
        };
        self.shared.request_ok(frame, error::channel).await
    }
}

/// Background reader: routes replies and deliveries until the socket closes.
async fn read_frames(shared: Arc<Shared>) {
    loop {
        let data = match shared.transport.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(connection = shared.broker_id, "broker closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(connection = shared.broker_id, error = %e, "broker connection lost");
                break;
            }
        };

        let frame: ServerFrame = match JsonCodec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable frame from broker");
                continue;
            }
        };

        match frame {
            ServerFrame::Deliver { delivery } => {
                let consumers = shared.consumers.lock().await;
                match consumers.get(&delivery.channel) {
                    Some(tx) => {
                        let _ = tx.send(delivery);
                    }
                    None => {
                        // The broker requeues it once the channel close lands.
                        tracing::debug!(channel = %delivery.channel, "delivery for closed channel");
                    }
                }
            }
            ServerFrame::Error {
                request_id: None,
                code,
                message,
            } => {
                tracing::warn!(code, %message, "broker reported a connection error");
            }
            reply => {
                let Some(request_id) = reply_request_id(&reply) else {
                    continue;
                };
                match shared.pending.lock().await.remove(&request_id) {
                    Some(waiter) => {
                        let _ = waiter.send(reply);
                    }
                    None => tracing::debug!(request_id, "reply for unknown request"),
                }
            }
        }
    }

    shared.closed.store(true, Ordering::Release);
    // Dropping the senders wakes every waiter with ConnectionClosed and
    // ends every channel's delivery stream.
    shared.pending.lock().await.clear();
    shared.consumers.lock().await.clear();
}

fn reply_request_id(frame: &ServerFrame) -> Option<RequestId> {
    match frame {
        ServerFrame::Ok { request_id } | ServerFrame::QueueDeclared { request_id, .. } => {
            Some(*request_id)
        }
        ServerFrame::Error { request_id, .. } => *request_id,
        ServerFrame::HelloAck { .. } | ServerFrame::Deliver { .. } => None,
    }
}
