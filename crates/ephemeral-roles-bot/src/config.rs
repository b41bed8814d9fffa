//! Configuration management for the ephemeral roles bot

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ephemeral_gateway::{GatewayConfig, ReducerConfig, MAX_MEMBER_PAGE};
use ephemeral_nats::{Level, NatsConfig};
use serde::{Deserialize, Serialize};

use crate::logging::LogTimezone;

/// Source of environment variables.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordBotConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Log level side channel; disabled when absent.
    #[serde(default)]
    pub nats: Option<NatsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordBotConfig {
    /// Bot token from the Discord developer portal
    #[serde(default)]
    pub bot_token: String,
    /// Name used for webhook alerts
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_color")]
    pub color: u32,
    #[serde(default = "default_ignored_guilds")]
    pub ignored_guilds: Vec<String>,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    #[serde(default = "default_member_page_limit")]
    pub member_page_limit: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `UTC`, `local` or a fixed offset such as `+02:00`
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Discord webhook receiving ERROR events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

fn default_bot_name() -> String {
    "ephemeral-roles".to_string()
}

fn default_prefix() -> String {
    ephemeral_gateway::reducer::DEFAULT_ROLE_PREFIX.to_string()
}

fn default_color() -> u32 {
    ephemeral_gateway::reducer::DEFAULT_ROLE_COLOR
}

fn default_ignored_guilds() -> Vec<String> {
    vec![ephemeral_gateway::reducer::DEFAULT_IGNORED_GUILD.to_string()]
}

fn default_operation_timeout_secs() -> u64 {
    10
}

fn default_member_page_limit() -> u16 {
    MAX_MEMBER_PAGE
}

fn default_level() -> String {
    "info".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            color: default_color(),
            ignored_guilds: default_ignored_guilds(),
            operation_timeout_secs: default_operation_timeout_secs(),
            member_page_limit: default_member_page_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            timezone: default_timezone(),
            webhook_url: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&SystemEnv)
    }

    pub fn from_env_with(env: &impl ReadEnv) -> Result<Self> {
        let bot_token = env
            .var("DISCORD_BOT_TOKEN")
            .context("DISCORD_BOT_TOKEN not set")?;

        let mut roles = RolesConfig::default();
        if let Some(prefix) = env.var("ROLE_PREFIX") {
            roles.prefix = prefix;
        }
        if let Some(color) = env.var("ROLE_COLOR_HEX2DEC") {
            roles.color = color
                .trim()
                .parse()
                .with_context(|| format!("ROLE_COLOR_HEX2DEC is not a number: {}", color))?;
        }
        if let Some(guilds) = env.var("IGNORED_GUILDS") {
            roles.ignored_guilds = parse_list(&guilds);
        }
        if let Some(secs) = env.var("OPERATION_TIMEOUT_SECS") {
            roles.operation_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("OPERATION_TIMEOUT_SECS is not a number: {}", secs))?;
        }

        let logging = LoggingConfig {
            level: env.var("LOG_LEVEL").unwrap_or_else(default_level),
            timezone: env
                .var("LOG_TIMEZONE_LOCATION")
                .unwrap_or_else(default_timezone),
            webhook_url: env
                .var("DISCORDRUS_WEBHOOK_URL")
                .filter(|url| !url.trim().is_empty()),
        };

        let nats = env.var("NATS_URL").map(|url| {
            let prefix = env
                .var("EPHEMERAL_PREFIX")
                .unwrap_or_else(|| "prod".to_string());
            NatsConfig::from_url(url, prefix)
        });

        Ok(Config {
            discord: DiscordBotConfig {
                bot_token,
                bot_name: env.var("BOT_NAME").unwrap_or_else(default_bot_name),
            },
            roles,
            logging,
            nats,
        })
    }

    /// Reject configurations the bot cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.discord.bot_token.trim().is_empty() {
            bail!("Discord bot token is empty");
        }
        if self.roles.prefix.trim().is_empty() {
            bail!("Role prefix is empty");
        }
        if self.roles.color > 0xFF_FF_FF {
            bail!("Role color {} is not a 24-bit RGB value", self.roles.color);
        }
        if self.roles.operation_timeout_secs == 0 {
            bail!("Operation timeout must be at least one second");
        }
        if !(1..=MAX_MEMBER_PAGE).contains(&self.roles.member_page_limit) {
            bail!(
                "Member page limit {} is outside 1..={}",
                self.roles.member_page_limit,
                MAX_MEMBER_PAGE
            );
        }
        self.log_level()?;
        self.log_timezone()?;
        if let Some(nats) = &self.nats {
            if nats.servers.is_empty() {
                bail!("NATS is configured without servers");
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level> {
        self.logging
            .level
            .parse()
            .with_context(|| format!("Invalid log level: {}", self.logging.level))
    }

    pub fn log_timezone(&self) -> Result<LogTimezone> {
        self.logging
            .timezone
            .parse()
            .with_context(|| format!("Invalid log timezone: {}", self.logging.timezone))
    }

    pub fn reducer_config(&self) -> ReducerConfig {
        ReducerConfig {
            role_prefix: self.roles.prefix.clone(),
            role_color: self.roles.color,
            ignored_guilds: self.roles.ignored_guilds.clone(),
            timeout: Duration::from_secs(self.roles.operation_timeout_secs),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            member_page_limit: self.roles.member_page_limit,
        }
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(String::from)
        .collect()
}
