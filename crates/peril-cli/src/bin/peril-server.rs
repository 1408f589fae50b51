//! The Peril coordinator: pauses and resumes play and prints the game log.

use std::path::{Path, PathBuf};

use clap::Parser;
use peril::COORDINATOR_HELP;
use peril::prelude::*;
use peril_cli::{BrokerArgs, LogArgs, Prompt, init_tracing};
use tokio::io::AsyncWriteExt;

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Peril game coordinator", long_about = None)]
struct Cli {
    #[command(flatten)]
    broker: BrokerArgs,

    /// Also append every game log entry to this file
    #[arg(long, env = "PERIL_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    log: LogArgs,
}

fn format_entry(entry: &GameLog) -> String {
    format!(
        "{} {}: {}",
        entry.current_time.format("%Y-%m-%d %H:%M:%S"),
        entry.username,
        entry.message
    )
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    println!("Starting Peril server...");
    let connection = Connection::connect(&cli.broker.broker_url).await?;

    let log_file = cli.log_file.clone();
    let coordinator = Coordinator::start(connection, move |entry: GameLog| {
        let log_file = log_file.clone();
        async move {
            let line = format_entry(&entry);
            println!("{line}");
            if let Some(path) = log_file {
                if let Err(e) = append_line(&path, &line).await {
                    tracing::warn!(path = %path.display(), error = %e, "writing game log failed");
                    return Disposition::RetryLater;
                }
            }
            Disposition::Accept
        }
    })
    .await?;

    println!("{COORDINATOR_HELP}");
    let mut prompt = Prompt::new();
    loop {
        let line = tokio::select! {
            line = prompt.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else { break };

        match CoordinatorCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(CoordinatorCommand::Pause)) => match coordinator.pause().await {
                Ok(()) => println!("Game paused"),
                Err(e) => tracing::error!(error = %e, "pause failed"),
            },
            Ok(Some(CoordinatorCommand::Resume)) => match coordinator.resume().await {
                Ok(()) => println!("Game resumed"),
                Err(e) => tracing::error!(error = %e, "resume failed"),
            },
            Ok(Some(CoordinatorCommand::Help)) => println!("{COORDINATOR_HELP}"),
            Ok(Some(CoordinatorCommand::Quit)) => break,
            Err(e) => println!("{e}"),
        }
    }

    println!("Exiting...");
    coordinator.shutdown().await?;
    Ok(())
}
