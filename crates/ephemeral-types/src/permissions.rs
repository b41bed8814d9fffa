//! Discord permission bits and effective channel permission computation

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::types::{Channel, Guild, Member, OverwriteTarget};

bitflags! {
    /// Discord permission bitmask (subset used for role and channel checks).
    ///
    /// Unknown bits are retained so a mask read from the API survives a
    /// round trip unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS = 1 << 1;
        const BAN_MEMBERS = 1 << 2;
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_CHANNELS = 1 << 4;
        const MANAGE_GUILD = 1 << 5;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const CONNECT = 1 << 20;
        const SPEAK = 1 << 21;
        const MOVE_MEMBERS = 1 << 24;
        const MANAGE_ROLES = 1 << 28;

        const _ = !0;
    }
}

impl Permissions {
    /// True if the mask grants read access to a channel.
    pub fn can_view(self) -> bool {
        self.contains(Self::VIEW_CHANNEL)
    }
}

/// Compute a member's effective permissions in a channel.
///
/// Follows Discord's resolution order: guild owner and ADMINISTRATOR get
/// everything; otherwise the `@everyone` role plus the member's roles form the
/// base, then channel overwrites are applied for `@everyone`, the member's
/// roles (denies before allows), and finally the member itself.
pub fn channel_permissions(guild: &Guild, member: &Member, channel: &Channel) -> Permissions {
    if guild.owner_id == member.user_id {
        return Permissions::all();
    }

    let mut base = guild
        .everyone_role()
        .map(|role| role.permissions)
        .unwrap_or_default();
    for role in guild.member_roles(member) {
        base |= role.permissions;
    }

    if base.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }

    let everyone_id = guild.id;
    let mut perms = base;

    if let Some(ow) = channel
        .permission_overwrites
        .iter()
        .find(|ow| ow.target == OverwriteTarget::Role(everyone_id))
    {
        perms &= !ow.deny;
        perms |= ow.allow;
    }

    let mut role_allow = Permissions::empty();
    let mut role_deny = Permissions::empty();
    for ow in &channel.permission_overwrites {
        if let OverwriteTarget::Role(role_id) = ow.target {
            if role_id != everyone_id && member.roles.contains(&role_id) {
                role_allow |= ow.allow;
                role_deny |= ow.deny;
            }
        }
    }
    perms &= !role_deny;
    perms |= role_allow;

    if let Some(ow) = channel
        .permission_overwrites
        .iter()
        .find(|ow| ow.target == OverwriteTarget::Member(member.user_id))
    {
        perms &= !ow.deny;
        perms |= ow.allow;
    }

    perms
}
