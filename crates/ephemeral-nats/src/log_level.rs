//! Runtime log level side channel
//!
//! The running bot publishes its current level on
//! `ephemeral-roles.{prefix}.log_level.current` every interval, changed or
//! not, and answers level changes on `ephemeral-roles.{prefix}.log_level.set`.
//!
//! Wire format (JSON):
//! - current: `{"level": "info"}`
//! - set request: `{"level": "debug"}`
//! - set reply: `{"level": "debug"}` or `{"error": "..."}`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::messaging::{MessageStream, MessageSubscriber, Publish};
use crate::subjects;

/// Interval between `current` publications.
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "fatal" | "panic" => Ok(Self::Error),
            _ => Err(Error::InvalidLevel(s.to_string())),
        }
    }
}

/// `{"level": "..."}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLevel {
    pub level: Level,
}

/// Reply to a set request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetLogLevelReply {
    Ack(LogLevel),
    Rejected { error: String },
}

/// Reads and changes the process log level.
pub trait LogLevelControl: Send + Sync + 'static {
    fn current(&self) -> Level;

    fn apply(&self, level: Level) -> Result<()>;
}

/// Bot side of the side channel.
pub struct LogLevelService<L> {
    control: L,
    interval: Duration,
}

impl<L: LogLevelControl> LogLevelService<L> {
    pub fn new(control: L) -> Self {
        Self {
            control,
            interval: DEFAULT_EMIT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn current(&self) -> LogLevel {
        LogLevel {
            level: self.control.current(),
        }
    }

    pub async fn emit_once<P: Publish>(&self, publisher: &P) -> Result<()> {
        let subject = subjects::log_level::current(publisher.prefix());
        publisher.publish(&subject, &self.current()).await
    }

    /// Publish the current level, then again after every interval. Never
    /// returns; a failed publish is logged and the next tick tries again.
    pub async fn emit_every<P: Publish, C: Clock>(&self, publisher: &P, clock: &C) {
        loop {
            if let Err(e) = self.emit_once(publisher).await {
                warn!(error = %e, "Failed to publish log level");
            }
            clock.sleep(self.interval).await;
        }
    }

    /// Handle one set request payload. Applying the level already in effect
    /// is a no-op that still acknowledges.
    pub fn handle_set(&self, payload: &[u8]) -> SetLogLevelReply {
        let requested = match serde_json::from_slice::<LogLevel>(payload) {
            Ok(request) => request.level,
            Err(e) => {
                debug!(error = %e, "Malformed log level request");
                return SetLogLevelReply::Rejected {
                    error: format!("malformed request: {}", e),
                };
            }
        };

        let current = self.control.current();
        if requested == current {
            debug!(level = %current, "Log level unchanged");
            return SetLogLevelReply::Ack(LogLevel { level: current });
        }

        match self.control.apply(requested) {
            Ok(()) => {
                info!(from = %current, to = %requested, "Log level changed");
                SetLogLevelReply::Ack(self.current())
            }
            Err(e) => {
                warn!(error = %e, level = %requested, "Failed to apply log level");
                SetLogLevelReply::Rejected {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Answer set requests until the subscription closes.
    pub async fn serve_requests(&self, subscriber: &MessageSubscriber) -> Result<()> {
        let subject = subjects::log_level::set(subscriber.prefix());
        let mut requests: MessageStream<LogLevel> = subscriber.subscribe(&subject).await?;
        info!(subject, "Serving log level requests");

        while let Some(msg) = requests.next_raw().await {
            let reply = self.handle_set(&msg.payload);
            if let Err(e) = subscriber.reply(&msg, &reply).await {
                warn!(error = %e, "Failed to answer log level request");
            }
        }
        Ok(())
    }
}

/// Companion-process side of the side channel.
pub struct LogLevelClient {
    subscriber: MessageSubscriber,
}

impl LogLevelClient {
    pub fn new(subscriber: MessageSubscriber) -> Self {
        Self { subscriber }
    }

    /// Stream of the levels the bot publishes.
    pub async fn watch(&self) -> Result<MessageStream<LogLevel>> {
        let subject = subjects::log_level::current(self.subscriber.prefix());
        self.subscriber.subscribe(&subject).await
    }

    /// Wait for the next published level.
    pub async fn get(&self, timeout: Duration) -> Result<Level> {
        let subject = subjects::log_level::current(self.subscriber.prefix());
        let mut stream = self.watch().await?;
        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(level)) => Ok(level?.level),
            Ok(None) => Err(Error::Subscribe(format!("{} closed", subject))),
            Err(_) => Err(Error::Timeout { subject, timeout }),
        }
    }

    /// Ask the bot to change level. The reply carries the level now in effect.
    pub async fn set(&self, level: Level, timeout: Duration) -> Result<Level> {
        let subject = subjects::log_level::set(self.subscriber.prefix());
        let reply: SetLogLevelReply = self
            .subscriber
            .request(&subject, &LogLevel { level }, timeout)
            .await?;
        match reply {
            SetLogLevelReply::Ack(ack) => Ok(ack.level),
            SetLogLevelReply::Rejected { error } => Err(Error::Rejected(error)),
        }
    }
}

#[cfg(test)]
#[path = "log_level_tests.rs"]
mod log_level_tests;
