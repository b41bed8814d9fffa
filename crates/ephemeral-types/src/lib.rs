//! Shared types for the ephemeral roles bot

pub mod errors;
pub mod events;
pub mod naming;
pub mod permissions;
pub mod types;

pub use errors::{DirectoryError, DiscordErrorCode, ErrorCategory};
pub use events::{VoiceStateChange, VoiceTransition};
pub use naming::{is_managed, role_name};
pub use permissions::Permissions;
pub use types::*;
