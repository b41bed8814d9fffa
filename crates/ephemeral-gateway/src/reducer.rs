//! Voice state reducer
//!
//! Turns a [`VoiceStateChange`] into gateway requests: revoke every managed
//! role the member holds other than the one for their new channel, then grant
//! that one if they don't already have it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ephemeral_types::{is_managed, role_name, Role, VoiceStateChange};
use futures::future::join_all;
use tracing::{debug, info};

use crate::directory::Directory;
use crate::error::{log_error, GatewayError, Result};
use crate::gateway::Gateway;

pub const DEFAULT_ROLE_PREFIX: &str = "{eph}";
/// Orange, `#FFA500`.
pub const DEFAULT_ROLE_COLOR: u32 = 16753920;
pub const DEFAULT_IGNORED_GUILD: &str = "Discord Bot List";

#[derive(Debug, Clone)]
pub struct ReducerConfig {
    pub role_prefix: String,
    pub role_color: u32,
    /// Guild names that never get managed roles.
    pub ignored_guilds: Vec<String>,
    /// Deadline applied to every gateway request.
    pub timeout: Duration,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            role_prefix: DEFAULT_ROLE_PREFIX.to_string(),
            role_color: DEFAULT_ROLE_COLOR,
            ignored_guilds: vec![DEFAULT_IGNORED_GUILD.to_string()],
            timeout: Duration::from_secs(10),
        }
    }
}

/// Result of removing one managed role.
#[derive(Debug, Clone)]
pub struct Revocation {
    pub role: Role,
    pub result: Result<()>,
}

/// What happened to the target role for the member's new channel.
#[derive(Debug, Clone)]
pub enum GrantOutcome {
    /// The member left voice entirely.
    NotRequested,
    /// The bot can't view the channel, so it gets no role.
    ChannelHidden { channel_id: u64 },
    AlreadyHeld(Role),
    Granted(Role),
    Failed { role_name: String, error: GatewayError },
}

/// Outcome of reducing one notification. Revocations and the grant succeed
/// or fail independently.
#[derive(Debug, Clone)]
pub struct Transition {
    pub guild_name: String,
    pub username: String,
    pub revoked: Vec<Revocation>,
    pub grant: GrantOutcome,
}

impl Transition {
    pub fn is_clean(&self) -> bool {
        self.revoked.iter().all(|r| r.result.is_ok())
            && !matches!(self.grant, GrantOutcome::Failed { .. })
    }

    /// Log each part of the transition at the level its outcome calls for.
    pub fn log(&self) {
        for revocation in &self.revoked {
            match &revocation.result {
                Ok(()) => debug!(
                    guild = %self.guild_name,
                    member = %self.username,
                    role = %revocation.role.name,
                    "Revoked ephemeral role"
                ),
                Err(e) => log_error("Unable to revoke ephemeral role", e),
            }
        }
        match &self.grant {
            GrantOutcome::NotRequested => {}
            GrantOutcome::ChannelHidden { channel_id } => debug!(
                guild = %self.guild_name,
                channel_id,
                "Channel not visible to bot, no role granted"
            ),
            GrantOutcome::AlreadyHeld(role) => debug!(
                guild = %self.guild_name,
                member = %self.username,
                role = %role.name,
                "Member already holds ephemeral role"
            ),
            GrantOutcome::Granted(role) => info!(
                guild = %self.guild_name,
                member = %self.username,
                role = %role.name,
                "Granted ephemeral role"
            ),
            GrantOutcome::Failed { error, .. } => {
                log_error("Unable to grant ephemeral role", error)
            }
        }
    }
}

pub struct VoiceStateReducer<D> {
    gateway: Gateway<D>,
    config: ReducerConfig,
    bot_user_id: AtomicU64,
}

impl<D: Directory> VoiceStateReducer<D> {
    pub fn new(gateway: Gateway<D>, config: ReducerConfig) -> Self {
        Self {
            gateway,
            config,
            bot_user_id: AtomicU64::new(0),
        }
    }

    pub fn gateway(&self) -> &Gateway<D> {
        &self.gateway
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Set once the session is ready; channel visibility is checked for this user.
    pub fn set_bot_user_id(&self, user_id: u64) {
        self.bot_user_id.store(user_id, Ordering::Relaxed);
    }

    pub fn bot_user_id(&self) -> Option<u64> {
        match self.bot_user_id.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    /// Apply one voice state change.
    ///
    /// Returns `Ok(None)` for ignored guilds. Unresolvable guild, member or
    /// channel is an error; everything after resolution is reported in the
    /// [`Transition`].
    pub async fn reduce(&self, change: &VoiceStateChange) -> Result<Option<Transition>> {
        let timeout = self.config.timeout;
        let prefix = self.config.role_prefix.as_str();

        let guild = self.gateway.lookup_guild(change.guild_id, timeout).await?;
        if self.config.ignored_guilds.iter().any(|name| *name == guild.name) {
            debug!(guild = %guild.name, "Ignoring voice state update");
            return Ok(None);
        }

        let member = guild
            .member(change.user_id)
            .ok_or_else(|| GatewayError::not_found("member", change.user_id))?;
        let held: Vec<Role> = guild
            .member_roles(member)
            .filter(|role| is_managed(prefix, &role.name))
            .cloned()
            .collect();

        let target = match change.new_channel_id {
            None => None,
            Some(channel_id) => {
                let channel = guild
                    .channel(channel_id)
                    .ok_or_else(|| GatewayError::not_found("channel", channel_id))?;
                let bot_id = self.bot_user_id().ok_or_else(|| {
                    GatewayError::Internal("bot user id not known yet".to_string())
                })?;
                let perms = self
                    .gateway
                    .channel_permissions(guild.id, bot_id, channel_id, timeout)
                    .await?;
                Some((channel_id, perms.can_view().then(|| role_name(prefix, &channel.name))))
            }
        };
        let target_name = target.as_ref().and_then(|(_, name)| name.as_deref());
        let (guild_id, user_id) = (guild.id, member.user_id);

        let revocations = held
            .iter()
            .filter(|role| Some(role.name.as_str()) != target_name)
            .map(|role| async move {
                let result = self
                    .gateway
                    .remove_role_from_member(guild_id, user_id, role.id, timeout)
                    .await;
                Revocation {
                    role: role.clone(),
                    result,
                }
            });
        let revoked = join_all(revocations).await;

        let grant = match target {
            None => GrantOutcome::NotRequested,
            Some((channel_id, None)) => GrantOutcome::ChannelHidden { channel_id },
            Some((_, Some(name))) => match held.iter().find(|role| role.name == name) {
                Some(role) => GrantOutcome::AlreadyHeld(role.clone()),
                None => self.grant(guild_id, user_id, name).await,
            },
        };

        Ok(Some(Transition {
            guild_name: guild.name.clone(),
            username: member.username.clone(),
            revoked,
            grant,
        }))
    }

    async fn grant(&self, guild_id: u64, user_id: u64, name: String) -> GrantOutcome {
        let timeout = self.config.timeout;
        let role = match self
            .gateway
            .create_role(guild_id, name.clone(), self.config.role_color, timeout)
            .await
        {
            Ok(role) => role,
            Err(error) => {
                return GrantOutcome::Failed {
                    role_name: name,
                    error,
                }
            }
        };
        match self
            .gateway
            .add_role_to_member(guild_id, user_id, role.id, timeout)
            .await
        {
            Ok(()) => GrantOutcome::Granted(role),
            Err(error) => GrantOutcome::Failed {
                role_name: name,
                error,
            },
        }
    }
}

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod reducer_tests;
