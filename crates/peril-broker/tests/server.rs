//! Integration tests for the broker server over a real WebSocket.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use peril_broker::BrokerServer;
use peril_protocol::routing::queue_options;
use peril_protocol::{
    ChannelId, ClientFrame, Delivery, Durability, Message, PROTOCOL_VERSION, RequestId,
    ServerFrame,
};
use tokio_tungstenite::tungstenite::Message as WsMessage;

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =========================================================================
// Helpers
// =========================================================================

async fn start_broker() -> String {
    let server = BrokerServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("broker should build");
    let addr = server.local_addr().expect("local addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

/// A bare-frames client: no pub/sub conveniences, just the wire.
struct RawClient {
    ws: ClientWs,
    next_request: RequestId,
    deliveries: VecDeque<Delivery>,
}

impl RawClient {
    async fn connect(addr: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("should connect");
        Self {
            ws,
            next_request: 1,
            deliveries: VecDeque::new(),
        }
    }

    async fn connect_and_hello(addr: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(&ClientFrame::Hello {
                version: PROTOCOL_VERSION,
            })
            .await;
        match client.recv().await {
            ServerFrame::HelloAck { version, .. } => assert_eq!(version, PROTOCOL_VERSION),
            other => panic!("expected HelloAck, got {other:?}"),
        }
        client
    }

    async fn send(&mut self, frame: &ClientFrame) {
        let bytes = serde_json::to_vec(frame).expect("encode");
        self.ws
            .send(WsMessage::Binary(bytes.into()))
            .await
            .expect("send");
    }

    async fn recv(&mut self) -> ServerFrame {
        let msg = tokio::time::timeout(Duration::from_secs(2), self.ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("recv");
        serde_json::from_slice(&msg.into_data()).expect("decode")
    }

    fn request_id(&mut self) -> RequestId {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    /// Sends `frame` and waits for its reply, stashing deliveries that
    /// arrive in between.
    async fn call(&mut self, frame: ClientFrame) -> ServerFrame {
        let expected = frame.request_id();
        self.send(&frame).await;
        loop {
            match self.recv().await {
                ServerFrame::Deliver { delivery } => self.deliveries.push_back(delivery),
                ServerFrame::Ok { request_id } if Some(request_id) == expected => {
                    return ServerFrame::Ok { request_id };
                }
                reply @ ServerFrame::QueueDeclared { request_id, .. }
                    if Some(request_id) == expected =>
                {
                    return reply;
                }
                reply @ ServerFrame::Error { request_id, .. } if request_id == expected => {
                    return reply;
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    async fn next_delivery(&mut self) -> Delivery {
        if let Some(delivery) = self.deliveries.pop_front() {
            return delivery;
        }
        match self.recv().await {
            ServerFrame::Deliver { delivery } => delivery,
            other => panic!("expected Deliver, got {other:?}"),
        }
    }

    async fn open(&mut self, channel: u64) {
        let request_id = self.request_id();
        let reply = self
            .call(ClientFrame::OpenChannel {
                request_id,
                channel: ChannelId(channel),
            })
            .await;
        assert!(matches!(reply, ServerFrame::Ok { .. }), "{reply:?}");
    }

    async fn declare(&mut self, channel: u64, queue: &str, durability: Durability) -> ServerFrame {
        let request_id = self.request_id();
        self.call(ClientFrame::DeclareQueue {
            request_id,
            channel: ChannelId(channel),
            queue: queue.into(),
            options: queue_options(durability),
        })
        .await
    }

    async fn bind(&mut self, channel: u64, queue: &str, exchange: &str, key: &str) -> ServerFrame {
        let request_id = self.request_id();
        self.call(ClientFrame::BindQueue {
            request_id,
            channel: ChannelId(channel),
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: key.into(),
        })
        .await
    }

    async fn publish(&mut self, channel: u64, exchange: &str, key: &str, body: &str) -> ServerFrame {
        let request_id = self.request_id();
        self.call(ClientFrame::Publish {
            request_id,
            channel: ChannelId(channel),
            exchange: exchange.into(),
            routing_key: key.into(),
            message: Message {
                content_type: Some("application/json".into()),
                body: body.as_bytes().to_vec(),
            },
        })
        .await
    }

    async fn consume(&mut self, channel: u64, queue: &str) -> ServerFrame {
        let request_id = self.request_id();
        self.call(ClientFrame::Consume {
            request_id,
            channel: ChannelId(channel),
            queue: queue.into(),
        })
        .await
    }
}

fn error_code(frame: &ServerFrame) -> u16 {
    match frame {
        ServerFrame::Error { code, .. } => *code,
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_hello_ack() {
    let addr = start_broker().await;
    RawClient::connect_and_hello(&addr).await;
}

#[tokio::test]
async fn test_version_mismatch_rejected() {
    let addr = start_broker().await;
    let mut client = RawClient::connect(&addr).await;
    client.send(&ClientFrame::Hello { version: 99 }).await;
    assert_eq!(error_code(&client.recv().await), 530);
}

#[tokio::test]
async fn test_first_frame_must_be_hello() {
    let addr = start_broker().await;
    let mut client = RawClient::connect(&addr).await;
    client
        .send(&ClientFrame::OpenChannel {
            request_id: 1,
            channel: ChannelId(1),
        })
        .await;
    assert_eq!(error_code(&client.recv().await), 502);
}

#[tokio::test]
async fn test_requests_on_unopened_channel_fail() {
    let addr = start_broker().await;
    let mut client = RawClient::connect_and_hello(&addr).await;
    let reply = client.declare(7, "war.alice", Durability::Durable).await;
    assert_eq!(error_code(&reply), 504);
}

#[tokio::test]
async fn test_publish_consume_ack() {
    let addr = start_broker().await;
    let mut client = RawClient::connect_and_hello(&addr).await;
    client.open(1).await;

    let reply = client.declare(1, "war.alice", Durability::Durable).await;
    assert!(matches!(reply, ServerFrame::QueueDeclared { .. }));
    client.bind(1, "war.alice", "peril_topic", "war.*").await;
    client.publish(1, "peril_topic", "war.bob", r#"{"n":1}"#).await;

    client.consume(1, "war.alice").await;
    let delivery = client.next_delivery().await;
    assert_eq!(delivery.routing_key, "war.bob");
    assert_eq!(delivery.message.body, br#"{"n":1}"#);

    let request_id = client.request_id();
    let reply = client
        .call(ClientFrame::Ack {
            request_id,
            channel: ChannelId(1),
            delivery_tag: delivery.delivery_tag,
        })
        .await;
    assert!(matches!(reply, ServerFrame::Ok { .. }));
}

#[tokio::test]
async fn test_conflicting_declare_is_precondition_failed() {
    let addr = start_broker().await;
    let mut client = RawClient::connect_and_hello(&addr).await;
    client.open(1).await;
    client.declare(1, "war.alice", Durability::Durable).await;
    let reply = client.declare(1, "war.alice", Durability::Transient).await;
    assert_eq!(error_code(&reply), 406);
}

#[tokio::test]
async fn test_transient_queue_locked_to_declaring_connection() {
    let addr = start_broker().await;
    let mut owner = RawClient::connect_and_hello(&addr).await;
    owner.open(1).await;
    owner.declare(1, "pause.alice", Durability::Transient).await;

    let mut other = RawClient::connect_and_hello(&addr).await;
    other.open(1).await;
    let reply = other.declare(1, "pause.alice", Durability::Transient).await;
    assert_eq!(error_code(&reply), 405);
}

#[tokio::test]
async fn test_bind_unknown_exchange_is_not_found() {
    let addr = start_broker().await;
    let mut client = RawClient::connect_and_hello(&addr).await;
    client.open(1).await;
    client.declare(1, "q", Durability::Durable).await;
    let reply = client.bind(1, "q", "no_such_exchange", "k").await;
    assert_eq!(error_code(&reply), 404);
}

#[tokio::test]
async fn test_disconnect_requeues_unacked_for_next_consumer() {
    let addr = start_broker().await;

    let mut first = RawClient::connect_and_hello(&addr).await;
    first.open(1).await;
    first.declare(1, "game_logs", Durability::Durable).await;
    first.bind(1, "game_logs", "peril_topic", "game_logs.*").await;
    first.publish(1, "peril_topic", "game_logs.alice", "\"hi\"").await;
    first.consume(1, "game_logs").await;
    let delivery = first.next_delivery().await;
    assert!(!delivery.redelivered);
    drop(first);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = RawClient::connect_and_hello(&addr).await;
    second.open(1).await;
    second.consume(1, "game_logs").await;
    let again = second.next_delivery().await;
    assert!(again.redelivered);
    assert_eq!(again.message.body, b"\"hi\"");
}

#[tokio::test]
async fn test_nack_discard_lands_in_dead_letter_queue() {
    let addr = start_broker().await;
    let mut client = RawClient::connect_and_hello(&addr).await;
    client.open(1).await;
    client.declare(1, "war.alice", Durability::Durable).await;
    client.bind(1, "war.alice", "peril_topic", "war.*").await;
    client.publish(1, "peril_topic", "war.bob", "{}").await;
    client.consume(1, "war.alice").await;
    let delivery = client.next_delivery().await;

    let request_id = client.request_id();
    client
        .call(ClientFrame::Nack {
            request_id,
            channel: ChannelId(1),
            delivery_tag: delivery.delivery_tag,
            requeue: false,
        })
        .await;

    client.open(2).await;
    client.consume(2, "peril_dlq").await;
    let dead = client.next_delivery().await;
    assert_eq!(dead.channel, ChannelId(2));
    assert_eq!(dead.routing_key, "war.bob");
}
