//! Runs the reference Peril broker.

use clap::Parser;
use peril::broker::{BrokerConfig, BrokerServer, DEFAULT_DEAD_LETTER_MAX_LENGTH};
use peril_cli::{LogArgs, init_tracing};

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Peril message broker", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5672", env = "PERIL_BROKER_BIND")]
    bind: String,

    /// Unacknowledged deliveries allowed per consumer
    #[arg(long, default_value_t = 1)]
    prefetch: usize,

    /// Dead-lettered messages kept before the oldest are dropped; 0 keeps all
    #[arg(long, default_value_t = DEFAULT_DEAD_LETTER_MAX_LENGTH)]
    dead_letter_max_length: usize,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let server = BrokerServer::builder()
        .bind(&cli.bind)
        .config(
            BrokerConfig::default()
                .prefetch(cli.prefetch)
                .dead_letter_max_length(Some(cli.dead_letter_max_length).filter(|&n| n > 0)),
        )
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "broker listening");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
    }
    Ok(())
}
