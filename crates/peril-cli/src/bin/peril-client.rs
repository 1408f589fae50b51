//! A Peril player.

use clap::Parser;
use peril::prelude::*;
use peril::game::validate_username;
use peril::{PLAYER_HELP, SpamReport};
use peril_cli::{BrokerArgs, LogArgs, Prompt, init_tracing};

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Play Peril", long_about = None)]
struct Cli {
    #[command(flatten)]
    broker: BrokerArgs,

    /// Player name; asked for interactively when omitted
    #[arg(long, short, value_parser = parse_username)]
    username: Option<String>,

    #[command(flatten)]
    log: LogArgs,
}

fn parse_username(name: &str) -> Result<String, CommandError> {
    validate_username(name)?;
    Ok(name.to_string())
}

async fn ask_username(prompt: &mut Prompt) -> std::io::Result<Option<String>> {
    println!("Welcome to Peril! Please enter your username:");
    loop {
        match prompt.next_line().await? {
            None => return Ok(None),
            Some(line) => {
                match parse_username(line.trim()) {
                    Ok(name) => return Ok(Some(name)),
                    Err(e) => println!("{e}"),
                }
            }
        }
    }
}

/// Runs one command. Returns `false` when the player wants to quit.
async fn execute(player: &PlayerSession, command: PlayerCommand) -> bool {
    match command {
        PlayerCommand::Spawn { location, rank } => match player.spawn(location, rank).await {
            Ok(unit) => println!("Spawned a(n) {rank} in {location} with id {}", unit.id),
            Err(e) => report(&e),
        },
        PlayerCommand::Move { to, unit_ids } => match player.move_units(to, unit_ids).await {
            Ok(mv) => println!("Moved {} unit(s) from {} to {}", mv.units.len(), mv.from, mv.to),
            Err(e) => report(&e),
        },
        PlayerCommand::Status => match player.status().await {
            Ok(status) => print!("{status}"),
            Err(e) => report(&e),
        },
        PlayerCommand::Spam(count) => {
            let SpamReport { sent, failed } = player.spam(count).await;
            println!("Published {sent} log entries ({failed} failed)");
        }
        PlayerCommand::Help => println!("{PLAYER_HELP}"),
        PlayerCommand::Quit => return false,
    }
    true
}

fn report(err: &PerilError) {
    match err.as_command_error() {
        Some(e) => println!("{e}"),
        None => tracing::error!(error = %err, "command failed"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    println!("Starting Peril client...");
    let connection = Connection::connect(&cli.broker.broker_url).await?;

    let mut prompt = Prompt::new();
    let username = match cli.username {
        Some(name) => name,
        None => match ask_username(&mut prompt).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let player = PlayerSession::join(connection, &username).await?;
    println!("Welcome, {username}!");
    println!("{PLAYER_HELP}");

    loop {
        let line = tokio::select! {
            line = prompt.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else { break };

        match PlayerCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if !execute(&player, command).await {
                    break;
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    println!("Leaving the game...");
    player.leave().await?;
    Ok(())
}
