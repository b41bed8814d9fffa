//! Ephemeral Roles
//!
//! Gives every member in a voice channel a role named after that channel and
//! takes it away when they leave.

mod alert;
mod config;
mod directory;
mod errors;
mod handlers;
mod health;
mod logging;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use ephemeral_gateway::{Gateway, VoiceStateReducer};
use ephemeral_nats::{LogLevelService, MessagePublisher, MessageSubscriber, NatsConfig, SystemClock};
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::*;
use tracing::{error, info, warn};

use crate::alert::AlertLayer;
use crate::config::Config;
use crate::directory::SerenityDirectory;
use crate::handlers::{Handler, RoleSync};
use crate::health::AppState;
use crate::logging::ReloadLevel;

/// Queued alerts beyond this are dropped.
const ALERT_QUEUE: usize = 64;

/// Ephemeral Roles bot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/ephemeral-roles.toml")]
    config: String,

    /// Discord bot token (overrides config file)
    #[arg(long, env = "DISCORD_BOT_TOKEN")]
    bot_token: Option<String>,

    /// NATS URL for the log level side channel (overrides config file)
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// NATS subject prefix (overrides config file)
    #[arg(long, env = "EPHEMERAL_PREFIX")]
    prefix: Option<String>,

    /// Health check server port
    #[arg(long, env = "PORT", default_value = "8081")]
    health_port: u16,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::from_env()?
    };

    if let Some(bot_token) = &args.bot_token {
        config.discord.bot_token = bot_token.clone();
    }
    if let Some(nats_url) = &args.nats_url {
        let prefix = config
            .nats
            .as_ref()
            .map_or_else(|| "prod".to_string(), |n| n.prefix.clone());
        config.nats = Some(NatsConfig::from_url(nats_url, prefix));
    }
    if let (Some(prefix), Some(nats)) = (&args.prefix, config.nats.as_mut()) {
        nats.prefix = prefix.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Publish the current level and answer set requests until NATS goes away.
async fn start_log_level_channel(nats: NatsConfig, control: ReloadLevel) -> Result<()> {
    let client = ephemeral_nats::connect(&nats).await?;
    let service = Arc::new(LogLevelService::new(control));

    let publisher = MessagePublisher::new(client.clone(), nats.prefix.clone());
    let emitter = service.clone();
    tokio::spawn(async move { emitter.emit_every(&publisher, &SystemClock).await });

    let subscriber = MessageSubscriber::new(client, nats.prefix);
    tokio::spawn(async move {
        if let Err(e) = service.serve_requests(&subscriber).await {
            warn!(error = %e, "Stopped serving log level requests");
        }
    });
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for SIGTERM, waiting for Ctrl+C only");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let (alerts, alert_rx) = match &config.logging.webhook_url {
        Some(_) => {
            let (layer, rx) = AlertLayer::new(ALERT_QUEUE);
            (Some(layer), Some(rx))
        }
        None => (None, None),
    };
    let level = logging::init(config.log_level()?, config.log_timezone()?, alerts)?;

    info!(
        prefix = %config.roles.prefix,
        ignored_guilds = ?config.roles.ignored_guilds,
        "Starting Ephemeral Roles"
    );

    if let (Some(rx), Some(url)) = (alert_rx, config.logging.webhook_url.clone()) {
        let username = config.discord.bot_name.clone();
        tokio::spawn(async move {
            if let Err(e) = alert::run(rx, url, username).await {
                warn!(error = %e, "Webhook alerts disabled");
            }
        });
    }

    match config.nats.clone() {
        Some(nats) => {
            let prefix = nats.prefix.clone();
            match start_log_level_channel(nats, level).await {
                Ok(()) => info!(prefix = %prefix, "Log level side channel enabled"),
                Err(e) => warn!(error = %e, "Log level side channel disabled"),
            }
        }
        None => info!("NATS not configured, log level side channel disabled"),
    }

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES | GatewayIntents::GUILD_MEMBERS;

    let mut client = Client::builder(&config.discord.bot_token, intents)
        .event_handler(Handler)
        .await
        .context("Failed to create Discord client")?;

    let gateway = Gateway::with_config(
        SerenityDirectory::new(client.http.clone()),
        config.gateway_config(),
    );
    let health_state = AppState::new().with_gateway(gateway.clone());
    let reducer = Arc::new(VoiceStateReducer::new(gateway, config.reducer_config()));

    {
        let mut data = client.data.write().await;
        data.insert::<RoleSync>(reducer);
        data.insert::<AppState>(health_state.clone());
    }

    let health_port = args.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::start_health_server(health_state, health_port).await {
            error!("Health server error: {}", e);
        }
    });

    // Graceful shutdown: close all shards on SIGTERM or Ctrl+C.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received, stopping Discord client...");
        shard_manager.shutdown_all().await;
    });

    info!("Starting Discord gateway connection...");

    // Blocks until all shards are stopped.
    client.start().await.context("Discord client error")?;

    info!("Ephemeral Roles stopped");
    Ok(())
}
