//! Per-connection handler: handshake, frame dispatch, delivery forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler:
//!   1. Receive `Hello` → validate version → send `HelloAck`
//!   2. Spawn a writer task that forwards deliveries as `Deliver` frames
//!   3. Loop: receive client frames → apply to the broker → reply
//!
//! Replies are written by the handler task itself, deliveries by the writer
//! task. The transport serializes the two.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use peril_protocol::{
    ChannelId, ClientFrame, Codec, Delivery, JsonCodec, PROTOCOL_VERSION, ProtocolError,
    ServerFrame, reply_code,
};
use peril_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::queue::DeliverySink;
use crate::server::ServerState;
use crate::BrokerError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Releases everything the connection held when the handler exits,
/// including on panic. `Drop` is synchronous, so the async lock is taken
/// in a spawned task.
struct ConnectionGuard {
    connection: ConnectionId,
    state: Arc<ServerState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.broker.lock().await.close_connection(connection);
        });
    }
}

/// Per-connection bookkeeping the broker itself does not need.
struct Session {
    connection: ConnectionId,
    channels: HashSet<ChannelId>,
    deliveries: DeliverySink,
}

impl Session {
    fn require_open(&self, channel: ChannelId) -> Result<(), BrokerError> {
        if self.channels.contains(&channel) {
            Ok(())
        } else {
            Err(BrokerError::ChannelNotOpen(channel))
        }
    }
}

/// Handles a single client from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), BrokerError> {
    let conn = Arc::new(conn);
    let connection = conn.id();
    tracing::debug!(%connection, "handling new connection");

    perform_handshake(&conn).await?;
    tracing::info!(%connection, "client connected");

    let _guard = ConnectionGuard {
        connection,
        state: Arc::clone(&state),
    };

    let (deliveries, delivery_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_deliveries(Arc::clone(&conn), delivery_rx));

    let mut session = Session {
        connection,
        channels: HashSet::new(),
        deliveries,
    };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%connection, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%connection, error = %e, "recv error");
                break;
            }
        };

        let frame: ClientFrame = match JsonCodec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%connection, error = %e, "failed to decode frame");
                send_error(&conn, None, reply_code::SYNTAX_ERROR, &e.to_string()).await?;
                continue;
            }
        };

        let request_id = frame.request_id();
        let reply = match apply_frame(&state, &mut session, frame).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(%connection, ?request_id, error = %e, "request failed");
                ServerFrame::Error {
                    request_id,
                    code: e.reply_code(),
                    message: e.to_string(),
                }
            }
        };
        send_frame(&conn, &reply).await?;
    }

    writer.abort();
    // _guard drops here → broker releases the connection.
    Ok(())
}

async fn perform_handshake(conn: &WebSocketConnection) -> Result<(), BrokerError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(BrokerError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let version = match JsonCodec.decode::<ClientFrame>(&data)? {
        ClientFrame::Hello { version } => version,
        _ => {
            send_error(conn, None, reply_code::SYNTAX_ERROR, "expected Hello").await?;
            return Err(
                ProtocolError::InvalidMessage("first frame must be Hello".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        let err = BrokerError::VersionMismatch(version);
        send_error(conn, None, err.reply_code(), &err.to_string()).await?;
        return Err(err);
    }

    send_frame(
        conn,
        &ServerFrame::HelloAck {
            version: PROTOCOL_VERSION,
            connection: conn.id().into_inner(),
        },
    )
    .await
}

/// Applies one request to the broker and builds the success reply.
async fn apply_frame(
    state: &ServerState,
    session: &mut Session,
    frame: ClientFrame,
) -> Result<ServerFrame, BrokerError> {
    let connection = session.connection;
    match frame {
        ClientFrame::Hello { .. } => {
            Err(ProtocolError::InvalidMessage("already connected".into()).into())
        }

        ClientFrame::OpenChannel {
            request_id,
            channel,
        } => {
            if !session.channels.insert(channel) {
                return Err(BrokerError::ChannelAlreadyOpen(channel));
            }
            tracing::debug!(%connection, %channel, "channel opened");
            Ok(ServerFrame::Ok { request_id })
        }

        ClientFrame::CloseChannel {
            request_id,
            channel,
        } => {
            if !session.channels.remove(&channel) {
                return Err(BrokerError::ChannelNotOpen(channel));
            }
            state.broker.lock().await.close_channel(connection, channel);
            tracing::debug!(%connection, %channel, "channel closed");
            Ok(ServerFrame::Ok { request_id })
        }

        ClientFrame::DeclareQueue {
            request_id,
            channel,
            queue,
            options,
        } => {
            session.require_open(channel)?;
            let queue = state
                .broker
                .lock()
                .await
                .declare_queue(connection, &queue, options)?;
            Ok(ServerFrame::QueueDeclared { request_id, queue })
        }

        ClientFrame::BindQueue {
            request_id,
            channel,
            queue,
            exchange,
            routing_key,
        } => {
            session.require_open(channel)?;
            state
                .broker
                .lock()
                .await
                .bind_queue(connection, &queue, &exchange, &routing_key)?;
            Ok(ServerFrame::Ok { request_id })
        }

        ClientFrame::Publish {
            request_id,
            channel,
            exchange,
            routing_key,
            message,
        } => {
            session.require_open(channel)?;
            state
                .broker
                .lock()
                .await
                .publish(&exchange, &routing_key, message)?;
            Ok(ServerFrame::Ok { request_id })
        }

        ClientFrame::Consume {
            request_id,
            channel,
            queue,
        } => {
            session.require_open(channel)?;
            state.broker.lock().await.consume(
                connection,
                channel,
                &queue,
                session.deliveries.clone(),
            )?;
            Ok(ServerFrame::Ok { request_id })
        }

        ClientFrame::Ack {
            request_id,
            channel,
            delivery_tag,
        } => {
            session.require_open(channel)?;
            state
                .broker
                .lock()
                .await
                .ack(connection, channel, delivery_tag)?;
            Ok(ServerFrame::Ok { request_id })
        }

        ClientFrame::Nack {
            request_id,
            channel,
            delivery_tag,
            requeue,
        } => {
            session.require_open(channel)?;
            state
                .broker
                .lock()
                .await
                .nack(connection, channel, delivery_tag, requeue)?;
            Ok(ServerFrame::Ok { request_id })
        }
    }
}

async fn forward_deliveries(
    conn: Arc<WebSocketConnection>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = deliveries.recv().await {
        if let Err(e) = send_frame(&conn, &ServerFrame::Deliver { delivery }).await {
            // Whatever is left unacked is requeued when the connection is released.
            tracing::debug!(connection = %conn.id(), error = %e, "delivery write failed");
            break;
        }
    }
}

async fn send_frame(conn: &WebSocketConnection, frame: &ServerFrame) -> Result<(), BrokerError> {
    let bytes = JsonCodec.encode(frame)?;
    conn.send(&bytes).await?;
    Ok(())
}

async fn send_error(
    conn: &WebSocketConnection,
    request_id: Option<u64>,
    code: u16,
    message: &str,
) -> Result<(), BrokerError> {
    send_frame(
        conn,
        &ServerFrame::Error {
            request_id,
            code,
            message: message.to_string(),
        },
    )
    .await
}
