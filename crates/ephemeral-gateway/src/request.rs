//! Request/result protocol
//!
//! Callers describe work as a [`Request`] and get back a [`ResultHandle`]
//! that resolves exactly once, either to a [`Response`] or to a
//! [`GatewayError`]. Requests serialize as `{"op": "...", ...}` so they can be
//! logged or forwarded; an `op` this build does not know deserializes to
//! [`Request::Unknown`].

use std::sync::Arc;
use std::time::Duration;

use ephemeral_types::{Guild, Permissions, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{GatewayError, Result};

/// Work the gateway can perform against the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Resolve the current guild snapshot (roles, channels, all members).
    LookupGuild { guild_id: u64 },
    /// Return the role named `name`, creating it if absent.
    CreateRole {
        guild_id: u64,
        name: String,
        color: u32,
    },
    AddRoleToMember {
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    },
    RemoveRoleFromMember {
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    },
    /// Effective permissions of a user in a channel.
    ChannelPermissions {
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    },
    /// A request kind this gateway does not recognize.
    #[serde(other)]
    Unknown,
}

/// Identity used to coalesce and serialize concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Guild(u64),
    Role {
        guild_id: u64,
        name: String,
    },
    Permissions {
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    },
}

impl Request {
    /// Stable operation name for logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::LookupGuild { .. } => "lookup_guild",
            Self::CreateRole { .. } => "create_role",
            Self::AddRoleToMember { .. } => "add_role_to_member",
            Self::RemoveRoleFromMember { .. } => "remove_role_from_member",
            Self::ChannelPermissions { .. } => "channel_permissions",
            Self::Unknown => "unknown",
        }
    }

    /// Key under which concurrent requests share one execution.
    ///
    /// Member add/remove have no key: they go straight to the directory.
    pub fn resource_key(&self) -> Option<ResourceKey> {
        match self {
            Self::LookupGuild { guild_id } => Some(ResourceKey::Guild(*guild_id)),
            Self::CreateRole { guild_id, name, .. } => Some(ResourceKey::Role {
                guild_id: *guild_id,
                name: name.clone(),
            }),
            Self::ChannelPermissions {
                guild_id,
                user_id,
                channel_id,
            } => Some(ResourceKey::Permissions {
                guild_id: *guild_id,
                user_id: *user_id,
                channel_id: *channel_id,
            }),
            Self::AddRoleToMember { .. } | Self::RemoveRoleFromMember { .. } | Self::Unknown => {
                None
            }
        }
    }
}

/// Successful result of a request.
#[derive(Debug, Clone)]
pub enum Response {
    Guild(Arc<Guild>),
    Role(Role),
    Permissions(Permissions),
    Done,
}

impl Response {
    fn kind(&self) -> &'static str {
        match self {
            Self::Guild(_) => "guild",
            Self::Role(_) => "role",
            Self::Permissions(_) => "permissions",
            Self::Done => "done",
        }
    }

    fn mismatch(self, expected: &str) -> GatewayError {
        GatewayError::Internal(format!("expected {} response, got {}", expected, self.kind()))
    }

    pub fn into_guild(self) -> Result<Arc<Guild>> {
        match self {
            Self::Guild(guild) => Ok(guild),
            other => Err(other.mismatch("guild")),
        }
    }

    pub fn into_role(self) -> Result<Role> {
        match self {
            Self::Role(role) => Ok(role),
            other => Err(other.mismatch("role")),
        }
    }

    pub fn into_permissions(self) -> Result<Permissions> {
        match self {
            Self::Permissions(perms) => Ok(perms),
            other => Err(other.mismatch("permissions")),
        }
    }

    pub fn into_done(self) -> Result<()> {
        match self {
            Self::Done => Ok(()),
            other => Err(other.mismatch("done")),
        }
    }
}

/// Single-use handle to the result of a submitted request.
///
/// Dropping the handle abandons the result; the work itself still runs.
#[must_use = "dropping a ResultHandle discards the result"]
pub struct ResultHandle {
    operation: &'static str,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Result<Response>>,
}

impl ResultHandle {
    pub(crate) fn new(
        operation: &'static str,
        timeout: Duration,
        rx: oneshot::Receiver<Result<Response>>,
    ) -> Self {
        Self {
            operation,
            timeout,
            deadline: Instant::now() + timeout,
            rx,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the result, or [`GatewayError::DeadlineExceeded`] once the
    /// deadline passes.
    pub async fn wait(self) -> Result<Response> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::Internal(format!(
                "{} result channel closed without a value",
                self.operation
            ))),
            Err(_) => Err(GatewayError::DeadlineExceeded {
                operation: self.operation,
                timeout: self.timeout,
            }),
        }
    }
}
