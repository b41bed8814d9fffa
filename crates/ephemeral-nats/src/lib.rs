//! NATS side channel for the ephemeral roles bot
//!
//! Carries the runtime log level: the bot publishes its current level on a
//! fixed interval and answers change requests from `ephemeral-roles-ctl`.

pub mod clock;
pub mod config;
pub mod error;
pub mod log_level;
pub mod messaging;
pub mod nats;
pub mod subjects;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use clock::{Clock, SystemClock};
pub use config::NatsConfig;
pub use error::{Error, Result};
pub use log_level::{
    Level, LogLevel, LogLevelClient, LogLevelControl, LogLevelService, SetLogLevelReply,
};
pub use messaging::{MessagePublisher, MessageStream, MessageSubscriber, Publish};
pub use nats::connect;
