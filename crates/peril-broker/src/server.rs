//! `BrokerServer` builder and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use peril_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{Broker, BrokerConfig, BrokerError};

/// Shared state handed to every connection task.
pub(crate) struct ServerState {
    pub(crate) broker: Mutex<Broker>,
}

/// Builder for a [`BrokerServer`].
///
/// # Example
///
/// ```rust,ignore
/// let server = BrokerServer::builder()
///     .bind("127.0.0.1:5672")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct BrokerServerBuilder {
    bind_addr: String,
    config: BrokerConfig,
}

impl BrokerServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:5672".to_string(),
            config: BrokerConfig::default(),
        }
    }

    /// Sets the listen address. Port `0` picks a free port.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and provisions the configured topology.
    pub async fn build(self) -> Result<BrokerServer, BrokerError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let state = Arc::new(ServerState {
            broker: Mutex::new(Broker::new(self.config)),
        });
        Ok(BrokerServer { transport, state })
    }
}

impl Default for BrokerServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A broker listening for client connections.
pub struct BrokerServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl BrokerServer {
    pub fn builder() -> BrokerServerBuilder {
        BrokerServerBuilder::new()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BrokerError> {
        Ok(self.transport.local_addr()?)
    }

    /// Accepts connections forever, one task per client.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "broker running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
