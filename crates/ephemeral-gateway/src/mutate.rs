//! Serialized role creation and member role mutations.

use std::sync::Arc;

use ephemeral_types::{Permissions, Role};
use tracing::{debug, info};

use crate::directory::Directory;
use crate::error::{GatewayError, Result};
use crate::gateway::Inner;
use crate::request::{ResourceKey, Response};

impl<D: Directory> Inner<D> {
    /// Find or create the role named `name`.
    ///
    /// Concurrent calls for the same `(guild, name)` share one flight, so at
    /// most one role is created per key.
    pub(crate) async fn ensure_role(
        self: &Arc<Self>,
        guild_id: u64,
        name: String,
        color: u32,
    ) -> Result<Role> {
        let key = ResourceKey::Role {
            guild_id,
            name: name.clone(),
        };
        let inner = Arc::clone(self);
        self.flights
            .run(key, move || async move {
                let guild = inner.lookup(guild_id).await?;
                if let Some(role) = guild.role_named(&name) {
                    debug!(guild_id, role = %role.name, role_id = role.id, "Role already exists");
                    return Ok(Response::Role(role.clone()));
                }

                let created = inner
                    .directory
                    .create_role(guild_id)
                    .await
                    .map_err(|e| GatewayError::directory("create_role", e))?;
                // The role exists from here on, even if the edit fails.
                inner.cache.invalidate(guild_id);

                let edited = inner
                    .directory
                    .edit_role(guild_id, created.id, &name, color)
                    .await;
                // A refresh that overlapped the edit may have cached the blank role.
                inner.cache.invalidate(guild_id);
                let role = edited.map_err(|e| GatewayError::directory("create_role", e))?;

                info!(guild = %guild.name, role = %role.name, role_id = role.id, "Created role");
                Ok(Response::Role(role))
            })
            .await?
            .into_role()
    }

    pub(crate) async fn add_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<()> {
        self.directory
            .add_member_role(guild_id, user_id, role_id)
            .await
            .map_err(|e| GatewayError::directory("add_role_to_member", e))?;
        self.cache.patch_member(guild_id, user_id, |member| {
            if !member.has_role(role_id) {
                member.roles.push(role_id);
            }
        });
        Ok(())
    }

    pub(crate) async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<()> {
        self.directory
            .remove_member_role(guild_id, user_id, role_id)
            .await
            .map_err(|e| GatewayError::directory("remove_role_from_member", e))?;
        self.cache
            .patch_member(guild_id, user_id, |member| member.roles.retain(|&id| id != role_id));
        Ok(())
    }

    pub(crate) async fn permissions(
        self: &Arc<Self>,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> Result<Permissions> {
        let key = ResourceKey::Permissions {
            guild_id,
            user_id,
            channel_id,
        };
        let inner = Arc::clone(self);
        self.flights
            .run(key, move || async move {
                inner
                    .directory
                    .channel_permissions(guild_id, user_id, channel_id)
                    .await
                    .map(Response::Permissions)
                    .map_err(|e| GatewayError::directory("channel_permissions", e))
            })
            .await?
            .into_permissions()
    }
}
