//! Serenity-backed directory
//!
//! Implements the gateway's [`Directory`] over Discord's REST API. Retries and
//! rate-limit waits are serenity's; failures come back classified.

use std::sync::Arc;

use ephemeral_gateway::{Directory, DirectoryResult};
use ephemeral_types::permissions::channel_permissions;
use ephemeral_types::{
    Channel, ChannelType, DirectoryError, DiscordErrorCode, Guild, Member, OverwriteTarget,
    PermissionOverwrite, Permissions, Role,
};
use serenity::builder::EditRole;
use serenity::http::Http;
use serenity::model::channel::{self as sc, PermissionOverwriteType};
use serenity::model::guild as sg;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};

use crate::errors::to_directory;

#[derive(Clone)]
pub struct SerenityDirectory {
    http: Arc<Http>,
}

impl SerenityDirectory {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl Directory for SerenityDirectory {
    async fn guild(&self, guild_id: u64) -> DirectoryResult<Guild> {
        let guild = self
            .http
            .get_guild(GuildId::new(guild_id))
            .await
            .map_err(to_directory)?;
        Ok(Guild {
            id: guild.id.get(),
            name: guild.name,
            owner_id: guild.owner_id.get(),
            roles: Vec::new(),
            channels: Vec::new(),
            members: Vec::new(),
        })
    }

    async fn roles(&self, guild_id: u64) -> DirectoryResult<Vec<Role>> {
        let roles = self
            .http
            .get_guild_roles(GuildId::new(guild_id))
            .await
            .map_err(to_directory)?;
        Ok(roles.iter().map(role).collect())
    }

    async fn channels(&self, guild_id: u64) -> DirectoryResult<Vec<Channel>> {
        let channels = self
            .http
            .get_channels(GuildId::new(guild_id))
            .await
            .map_err(to_directory)?;
        Ok(channels.iter().map(channel).collect())
    }

    async fn members(
        &self,
        guild_id: u64,
        after: Option<u64>,
        limit: u16,
    ) -> DirectoryResult<Vec<Member>> {
        let members = self
            .http
            .get_guild_members(GuildId::new(guild_id), Some(u64::from(limit)), after)
            .await
            .map_err(to_directory)?;
        Ok(members.iter().map(member).collect())
    }

    async fn create_role(&self, guild_id: u64) -> DirectoryResult<Role> {
        let created = GuildId::new(guild_id)
            .create_role(&self.http, EditRole::new())
            .await
            .map_err(to_directory)?;
        Ok(role(&created))
    }

    async fn edit_role(
        &self,
        guild_id: u64,
        role_id: u64,
        name: &str,
        color: u32,
    ) -> DirectoryResult<Role> {
        let builder = EditRole::new().name(name).colour(color).hoist(true);
        let edited = GuildId::new(guild_id)
            .edit_role(&self.http, RoleId::new(role_id), builder)
            .await
            .map_err(to_directory)?;
        Ok(role(&edited))
    }

    async fn add_member_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> DirectoryResult<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                None,
            )
            .await
            .map_err(to_directory)
    }

    async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> DirectoryResult<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                None,
            )
            .await
            .map_err(to_directory)
    }

    async fn channel_permissions(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> DirectoryResult<Permissions> {
        let (mut guild, roles, fetched, target) = tokio::try_join!(
            self.guild(guild_id),
            self.roles(guild_id),
            async {
                self.http
                    .get_channel(ChannelId::new(channel_id))
                    .await
                    .map_err(to_directory)
            },
            async {
                self.http
                    .get_member(GuildId::new(guild_id), UserId::new(user_id))
                    .await
                    .map_err(to_directory)
            },
        )?;

        let guild_channel = fetched.guild().ok_or_else(|| {
            DirectoryError::new(
                DiscordErrorCode::UnknownChannel,
                format!("channel {} is not a guild channel", channel_id),
            )
        })?;
        guild.roles = roles;

        Ok(channel_permissions(
            &guild,
            &member(&target),
            &channel(&guild_channel),
        ))
    }
}

fn role(role: &sg::Role) -> Role {
    Role {
        id: role.id.get(),
        name: role.name.clone(),
        color: role.colour.0,
        position: role.position,
        permissions: Permissions::from_bits_retain(role.permissions.bits()),
    }
}

fn channel(channel: &sc::GuildChannel) -> Channel {
    Channel {
        id: channel.id.get(),
        name: channel.name.clone(),
        kind: channel_kind(channel.kind),
        permission_overwrites: channel
            .permission_overwrites
            .iter()
            .filter_map(overwrite)
            .collect(),
    }
}

fn overwrite(overwrite: &sc::PermissionOverwrite) -> Option<PermissionOverwrite> {
    let target = match overwrite.kind {
        PermissionOverwriteType::Role(id) => OverwriteTarget::Role(id.get()),
        PermissionOverwriteType::Member(id) => OverwriteTarget::Member(id.get()),
        _ => return None,
    };
    Some(PermissionOverwrite {
        target,
        allow: Permissions::from_bits_retain(overwrite.allow.bits()),
        deny: Permissions::from_bits_retain(overwrite.deny.bits()),
    })
}

fn member(member: &sg::Member) -> Member {
    Member {
        user_id: member.user.id.get(),
        username: member.user.name.clone(),
        bot: member.user.bot,
        roles: member.roles.iter().map(|id| id.get()).collect(),
    }
}

fn channel_kind(kind: sc::ChannelType) -> ChannelType {
    match kind {
        sc::ChannelType::Text | sc::ChannelType::News => ChannelType::Text,
        sc::ChannelType::Voice => ChannelType::Voice,
        sc::ChannelType::Stage => ChannelType::Stage,
        sc::ChannelType::Category => ChannelType::Category,
        _ => ChannelType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind() {
        assert_eq!(channel_kind(sc::ChannelType::Voice), ChannelType::Voice);
        assert_eq!(channel_kind(sc::ChannelType::Stage), ChannelType::Stage);
        assert_eq!(channel_kind(sc::ChannelType::News), ChannelType::Text);
        assert_eq!(channel_kind(sc::ChannelType::Forum), ChannelType::Unknown);
    }

    #[test]
    fn test_permission_bits_carry_over() {
        let serenity_bits = serenity::model::Permissions::VIEW_CHANNEL
            | serenity::model::Permissions::CONNECT
            | serenity::model::Permissions::MANAGE_ROLES;
        let perms = Permissions::from_bits_retain(serenity_bits.bits());
        assert!(perms.can_view());
        assert!(perms.contains(Permissions::CONNECT | Permissions::MANAGE_ROLES));
    }
}
