//! Operations gateway for ephemeral voice-channel roles
//!
//! Sits between concurrent event handlers and the rate-limited chat platform
//! directory:
//!
//! - concurrent identical reads share one in-flight lookup
//! - role creation is keyed by `(guild, role name)`, at most one per key
//! - every request resolves exactly once through a [`ResultHandle`]
//!
//! [`VoiceStateReducer`] turns voice state changes into gateway requests.

mod cache;
mod coalesce;
pub mod directory;
pub mod error;
pub mod gateway;
mod lookup;
mod mutate;
pub mod reducer;
pub mod request;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use directory::{Directory, DirectoryResult};
pub use error::{log_error, ErrorKind, GatewayError, Result};
pub use gateway::{Gateway, GatewayConfig, MAX_MEMBER_PAGE};
pub use reducer::{GrantOutcome, ReducerConfig, Revocation, Transition, VoiceStateReducer};
pub use request::{Request, ResourceKey, Response, ResultHandle};
