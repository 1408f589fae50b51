//! Pieces shared by the `peril-broker`, `peril-server` and `peril-client`
//! binaries.

use std::io::Write as _;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:5672";

/// Where the broker lives.
#[derive(Clone, Debug, Args)]
pub struct BrokerArgs {
    /// Broker connection string
    #[arg(long, default_value = DEFAULT_BROKER_URL, env = "PERIL_BROKER_URL")]
    pub broker_url: String,
}

/// Logging switches common to every binary.
#[derive(Clone, Debug, Args)]
pub struct LogArgs {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(args: &LogArgs) {
    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Line-oriented reader over stdin.
pub struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Prints `> ` and waits for the next line. `None` at end of input.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        print!("> ");
        std::io::stdout().flush()?;
        self.lines.next_line().await
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self::new()
    }
}
