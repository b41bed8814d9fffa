//! In-memory [`Directory`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ephemeral_types::permissions::channel_permissions;
use ephemeral_types::{
    Channel, ChannelType, DirectoryError, DiscordErrorCode, Guild, Member, OverwriteTarget,
    PermissionOverwrite, Permissions, Role,
};

use crate::directory::{Directory, DirectoryResult};

/// Directory call, used to inject failures and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Guild,
    Roles,
    Channels,
    Members,
    CreateRole,
    EditRole,
    AddMemberRole,
    RemoveMemberRole,
    ChannelPermissions,
}

#[derive(Default)]
struct State {
    guilds: HashMap<u64, Guild>,
    next_role_id: u64,
    permission_overrides: HashMap<(u64, u64, u64), Permissions>,
    failures: HashMap<MockOp, DirectoryError>,
    delays: HashMap<MockOp, Duration>,
    calls: HashMap<MockOp, usize>,
}

/// Shared in-memory guild graph. Clones share state.
#[derive(Clone)]
pub struct MockDirectory {
    state: Arc<Mutex<State>>,
    latency: Duration,
    member_pages: Arc<AtomicUsize>,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_role_id: 10_000,
                ..State::default()
            })),
            latency: Duration::ZERO,
            member_pages: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay every call by `latency`, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_guild(&self, guild: Guild) {
        self.lock().guilds.insert(guild.id, guild);
    }

    pub fn guild_state(&self, guild_id: u64) -> Option<Guild> {
        self.lock().guilds.get(&guild_id).cloned()
    }

    pub fn member_roles(&self, guild_id: u64, user_id: u64) -> Vec<u64> {
        self.lock()
            .guilds
            .get(&guild_id)
            .and_then(|g| g.member(user_id))
            .map(|m| m.roles.clone())
            .unwrap_or_default()
    }

    pub fn roles_named(&self, guild_id: u64, name: &str) -> usize {
        self.lock()
            .guilds
            .get(&guild_id)
            .map(|g| g.roles.iter().filter(|r| r.name == name).count())
            .unwrap_or(0)
    }

    /// Answer `channel_permissions` with `perms` instead of computing them.
    pub fn set_permissions(&self, guild_id: u64, user_id: u64, channel_id: u64, perms: Permissions) {
        self.lock()
            .permission_overrides
            .insert((guild_id, user_id, channel_id), perms);
    }

    /// Make every later `op` call fail with `error`.
    pub fn fail(&self, op: MockOp, error: DirectoryError) {
        self.lock().failures.insert(op, error);
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.lock().failures.remove(&op);
    }

    /// Delay every later `op` call by `delay`, overriding the common latency.
    pub fn delay(&self, op: MockOp, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn member_pages(&self) -> usize {
        self.member_pages.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: MockOp) -> DirectoryResult<()> {
        let latency = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            state.delays.get(&op).copied().unwrap_or(self.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn with_guild<T>(
        &self,
        guild_id: u64,
        f: impl FnOnce(&mut Guild) -> DirectoryResult<T>,
    ) -> DirectoryResult<T> {
        let mut state = self.lock();
        match state.guilds.get_mut(&guild_id) {
            Some(guild) => f(guild),
            None => Err(unknown(DiscordErrorCode::UnknownGuild, 404)),
        }
    }
}

fn unknown(code: DiscordErrorCode, status: u16) -> DirectoryError {
    DirectoryError::new(code, format!("{:?}", code)).with_response(status, 0)
}

impl Directory for MockDirectory {
    async fn guild(&self, guild_id: u64) -> DirectoryResult<Guild> {
        self.enter(MockOp::Guild).await?;
        self.with_guild(guild_id, |g| {
            Ok(Guild {
                id: g.id,
                name: g.name.clone(),
                owner_id: g.owner_id,
                roles: Vec::new(),
                channels: Vec::new(),
                members: Vec::new(),
            })
        })
    }

    async fn roles(&self, guild_id: u64) -> DirectoryResult<Vec<Role>> {
        self.enter(MockOp::Roles).await?;
        self.with_guild(guild_id, |g| Ok(g.roles.clone()))
    }

    async fn channels(&self, guild_id: u64) -> DirectoryResult<Vec<Channel>> {
        self.enter(MockOp::Channels).await?;
        self.with_guild(guild_id, |g| Ok(g.channels.clone()))
    }

    async fn members(
        &self,
        guild_id: u64,
        after: Option<u64>,
        limit: u16,
    ) -> DirectoryResult<Vec<Member>> {
        self.enter(MockOp::Members).await?;
        self.member_pages.fetch_add(1, Ordering::SeqCst);
        self.with_guild(guild_id, |g| {
            let mut members: Vec<Member> = g
                .members
                .iter()
                .filter(|m| after.map_or(true, |cursor| m.user_id > cursor))
                .cloned()
                .collect();
            members.sort_by_key(|m| m.user_id);
            members.truncate(usize::from(limit));
            Ok(members)
        })
    }

    async fn create_role(&self, guild_id: u64) -> DirectoryResult<Role> {
        self.enter(MockOp::CreateRole).await?;
        let mut state = self.lock();
        let id = state.next_role_id;
        let guild = state
            .guilds
            .get_mut(&guild_id)
            .ok_or_else(|| unknown(DiscordErrorCode::UnknownGuild, 404))?;
        let role = Role {
            id,
            name: "new role".to_string(),
            color: 0,
            position: 1,
            permissions: Permissions::empty(),
        };
        guild.roles.push(role.clone());
        state.next_role_id += 1;
        Ok(role)
    }

    async fn edit_role(
        &self,
        guild_id: u64,
        role_id: u64,
        name: &str,
        color: u32,
    ) -> DirectoryResult<Role> {
        self.enter(MockOp::EditRole).await?;
        self.with_guild(guild_id, |g| {
            let role = g
                .roles
                .iter_mut()
                .find(|r| r.id == role_id)
                .ok_or_else(|| unknown(DiscordErrorCode::UnknownRole, 404))?;
            role.name = name.to_string();
            role.color = color;
            Ok(role.clone())
        })
    }

    async fn add_member_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> DirectoryResult<()> {
        self.enter(MockOp::AddMemberRole).await?;
        self.with_guild(guild_id, |g| {
            let member = g
                .member_mut(user_id)
                .ok_or_else(|| unknown(DiscordErrorCode::UnknownMember, 404))?;
            if !member.has_role(role_id) {
                member.roles.push(role_id);
            }
            Ok(())
        })
    }

    async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> DirectoryResult<()> {
        self.enter(MockOp::RemoveMemberRole).await?;
        self.with_guild(guild_id, |g| {
            let member = g
                .member_mut(user_id)
                .ok_or_else(|| unknown(DiscordErrorCode::UnknownMember, 404))?;
            member.roles.retain(|&id| id != role_id);
            Ok(())
        })
    }

    async fn channel_permissions(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> DirectoryResult<Permissions> {
        self.enter(MockOp::ChannelPermissions).await?;
        if let Some(perms) = self
            .lock()
            .permission_overrides
            .get(&(guild_id, user_id, channel_id))
        {
            return Ok(*perms);
        }
        self.with_guild(guild_id, |g| {
            let member = g
                .member(user_id)
                .ok_or_else(|| unknown(DiscordErrorCode::UnknownMember, 404))?;
            let channel = g
                .channel(channel_id)
                .ok_or_else(|| unknown(DiscordErrorCode::UnknownChannel, 404))?;
            Ok(channel_permissions(g, member, channel))
        })
    }
}

/// Builder for guild fixtures.
///
/// The guild starts with an `@everyone` role (id = guild id) granting
/// VIEW_CHANNEL and CONNECT, and is owned by user 1.
pub struct GuildBuilder {
    guild: Guild,
}

impl GuildBuilder {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            guild: Guild {
                id,
                name: name.to_string(),
                owner_id: 1,
                roles: vec![Role {
                    id,
                    name: "@everyone".to_string(),
                    color: 0,
                    position: 0,
                    permissions: Permissions::VIEW_CHANNEL | Permissions::CONNECT,
                }],
                channels: Vec::new(),
                members: Vec::new(),
            },
        }
    }

    pub fn role(mut self, id: u64, name: &str) -> Self {
        let position = self.guild.roles.len() as u16;
        self.guild.roles.push(Role {
            id,
            name: name.to_string(),
            color: 0,
            position,
            permissions: Permissions::empty(),
        });
        self
    }

    pub fn voice_channel(mut self, id: u64, name: &str) -> Self {
        self.guild.channels.push(Channel {
            id,
            name: name.to_string(),
            kind: ChannelType::Voice,
            permission_overwrites: Vec::new(),
        });
        self
    }

    /// Voice channel whose overwrite denies VIEW_CHANNEL to `role_id`.
    pub fn hidden_channel(mut self, id: u64, name: &str, role_id: u64) -> Self {
        self.guild.channels.push(Channel {
            id,
            name: name.to_string(),
            kind: ChannelType::Voice,
            permission_overwrites: vec![PermissionOverwrite {
                target: OverwriteTarget::Role(role_id),
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
            }],
        });
        self
    }

    pub fn member(mut self, user_id: u64, username: &str, roles: &[u64]) -> Self {
        self.guild.members.push(Member {
            user_id,
            username: username.to_string(),
            bot: false,
            roles: roles.to_vec(),
        });
        self
    }

    pub fn bot(mut self, user_id: u64, username: &str, roles: &[u64]) -> Self {
        self.guild.members.push(Member {
            user_id,
            username: username.to_string(),
            bot: true,
            roles: roles.to_vec(),
        });
        self
    }

    pub fn build(self) -> Guild {
        self.guild
    }
}
