//! Tracing setup
//!
//! The filter sits behind a reload handle so the NATS side channel can change
//! verbosity while the bot runs.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use ephemeral_nats::{Level, LogLevelControl};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::alert::AlertLayer;

/// Crates whose chatter stays at `warn` or quieter.
const DEPENDENCIES: &[&str] = &["serenity", "tungstenite", "hyper", "h2", "rustls", "async_nats"];

/// Timezone for log timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTimezone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl FromStr for LogTimezone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::Utc);
        }
        if s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        parse_offset(s).map(Self::Fixed)
    }
}

/// `+HH:MM`, `-HHMM` or `+HH`.
fn parse_offset(s: &str) -> Result<FixedOffset> {
    let (sign, rest) = match s.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => bail!("expected UTC, local or an offset like +02:00, got {:?}", s),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !matches!(digits.len(), 2 | 4) {
        bail!("malformed offset {:?}", s);
    }
    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = if digits.len() == 4 { digits[2..].parse()? } else { 0 };
    if hours > 23 || minutes > 59 {
        bail!("offset {:?} out of range", s);
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("offset {:?} out of range", s))
}

/// RFC 3339 timestamps in the configured timezone.
#[derive(Debug, Clone, Copy)]
pub struct LogTimer(pub LogTimezone);

impl LogTimer {
    fn format_at(&self, now: DateTime<Utc>) -> String {
        const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";
        match self.0 {
            LogTimezone::Utc => now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            LogTimezone::Local => now.with_timezone(&Local).format(FORMAT).to_string(),
            LogTimezone::Fixed(offset) => now.with_timezone(&offset).format(FORMAT).to_string(),
        }
    }
}

impl FormatTime for LogTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&self.format_at(Utc::now()))
    }
}

fn directives(level: Level) -> String {
    let quiet = level.max(Level::Warn);
    let mut directives = level.to_string();
    for krate in DEPENDENCIES {
        directives.push_str(&format!(",{}={}", krate, quiet));
    }
    directives
}

/// Runtime handle on the installed filter.
#[derive(Clone)]
pub struct ReloadLevel {
    handle: reload::Handle<EnvFilter, Registry>,
    level: Arc<Mutex<Level>>,
}

impl LogLevelControl for ReloadLevel {
    fn current(&self) -> Level {
        *self.level.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, level: Level) -> ephemeral_nats::Result<()> {
        self.handle
            .reload(EnvFilter::new(directives(level)))
            .map_err(|e| ephemeral_nats::Error::Control(e.to_string()))?;
        *self.level.lock().unwrap_or_else(|e| e.into_inner()) = level;
        Ok(())
    }
}

/// Install the global subscriber.
pub fn init(level: Level, timezone: LogTimezone, alerts: Option<AlertLayer>) -> Result<ReloadLevel> {
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LogTimer(timezone)))
        .with(alerts)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(ReloadLevel {
        handle,
        level: Arc::new(Mutex::new(level)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timezone() {
        assert_eq!("UTC".parse::<LogTimezone>().unwrap(), LogTimezone::Utc);
        assert_eq!("".parse::<LogTimezone>().unwrap(), LogTimezone::Utc);
        assert_eq!("Local".parse::<LogTimezone>().unwrap(), LogTimezone::Local);
        assert_eq!(
            "+05:30".parse::<LogTimezone>().unwrap(),
            LogTimezone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(
            "-0800".parse::<LogTimezone>().unwrap(),
            LogTimezone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap())
        );
        assert_eq!(
            "+02".parse::<LogTimezone>().unwrap(),
            LogTimezone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap())
        );
    }

    #[test]
    fn test_parse_timezone_rejects_garbage() {
        for input in ["America/New_York", "+25:00", "+02:60", "+2", "-ab:cd", "+"] {
            assert!(input.parse::<LogTimezone>().is_err(), "{input}");
        }
    }

    #[test]
    fn test_timer_formats_in_timezone() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();

        assert_eq!(
            LogTimer(LogTimezone::Utc).format_at(now),
            "2024-01-01T23:30:00.000Z"
        );
        let plus_two = LogTimezone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(
            LogTimer(plus_two).format_at(now),
            "2024-01-02T01:30:00.000+02:00"
        );
    }

    #[test]
    fn test_directives_keep_dependencies_quiet() {
        assert_eq!(
            directives(Level::Debug),
            "debug,serenity=warn,tungstenite=warn,hyper=warn,h2=warn,rustls=warn,async_nats=warn"
        );
        assert!(directives(Level::Error).contains("serenity=error"));
        assert!(EnvFilter::try_new(directives(Level::Trace)).is_ok());
    }
}
