//! Reads and changes the log level of a running Ephemeral Roles bot over NATS.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ephemeral_nats::{Level, LogLevelClient, MessageSubscriber, NatsConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NATS server URL(s), comma-separated
    #[arg(long, env = "NATS_URL", default_value = "localhost:4222")]
    nats_url: String,

    /// Subject prefix of the target deployment
    #[arg(long, env = "EPHEMERAL_PREFIX", default_value = "prod")]
    prefix: String,

    /// Seconds to wait for the bot
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the level the bot is running at
    Get,
    /// Change the bot's level
    Set { level: Level },
    /// Print every level the bot publishes
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = NatsConfig::from_url(&args.nats_url, args.prefix.clone())
        .with_client_name("ephemeral-roles-ctl");
    let client = ephemeral_nats::connect(&config).await?;
    let ctl = LogLevelClient::new(MessageSubscriber::new(client, args.prefix));
    let timeout = Duration::from_secs(args.timeout_secs);

    match args.command {
        Command::Get => {
            let level = ctl.get(timeout).await.context("No level published")?;
            println!("{}", level);
        }
        Command::Set { level } => {
            let level = ctl.set(level, timeout).await.context("Level change failed")?;
            println!("{}", level);
        }
        Command::Watch => {
            let mut levels = ctl.watch().await?;
            while let Some(level) = levels.next().await {
                println!("{}", level?.level);
            }
        }
    }
    Ok(())
}
