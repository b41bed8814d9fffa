//! Core Discord domain types
//!
//! Snapshots of the guild graph as seen by the bot. The directory owns the
//! real state; these values are last-known copies and never authoritative.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::permissions::Permissions;

/// Guild role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: u64,
    pub name: String,
    pub color: u32,
    pub position: u16,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Channel type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Text,
    Voice,
    Stage,
    Category,
    Unknown,
}

/// Who a permission overwrite applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum OverwriteTarget {
    Role(u64),
    Member(u64),
}

/// Channel-level permission overwrite
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// Guild channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: u64,
    pub name: String,
    pub kind: ChannelType,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

/// Guild member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub user_id: u64,
    pub username: String,
    pub bot: bool,
    pub roles: Vec<u64>,
}

impl Member {
    pub fn has_role(&self, role_id: u64) -> bool {
        self.roles.contains(&role_id)
    }
}

/// Guild snapshot with roles, channels and the complete member list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guild {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Guild {
    pub fn role(&self, role_id: u64) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == role_id)
    }

    /// First role carrying exactly this name.
    pub fn role_named(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// The `@everyone` role shares its id with the guild.
    pub fn everyone_role(&self) -> Option<&Role> {
        self.role(self.id)
    }

    pub fn channel(&self, channel_id: u64) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == channel_id)
    }

    pub fn member(&self, user_id: u64) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: u64) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    /// Role id → role lookup table.
    pub fn role_map(&self) -> HashMap<u64, &Role> {
        self.roles.iter().map(|r| (r.id, r)).collect()
    }

    /// Roles held by `member` that exist in this guild. Dangling ids are skipped.
    pub fn member_roles<'a>(&'a self, member: &'a Member) -> impl Iterator<Item = &'a Role> + 'a {
        let map = self.role_map();
        member.roles.iter().filter_map(move |id| map.get(id).copied())
    }
}
