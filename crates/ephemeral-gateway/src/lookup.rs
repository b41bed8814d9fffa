//! Coalesced guild lookup and snapshot refresh.

use std::sync::Arc;

use ephemeral_types::{Guild, Member};
use tracing::debug;

use crate::directory::Directory;
use crate::error::{GatewayError, Result};
use crate::gateway::Inner;
use crate::request::{ResourceKey, Response};

impl<D: Directory> Inner<D> {
    /// Resolve the guild snapshot, sharing one refresh among concurrent callers.
    pub(crate) async fn lookup(self: &Arc<Self>, guild_id: u64) -> Result<Arc<Guild>> {
        let inner = Arc::clone(self);
        self.flights
            .run(ResourceKey::Guild(guild_id), move || async move {
                if let Some(snapshot) = inner.cache.get(guild_id) {
                    return Ok(Response::Guild(snapshot));
                }
                inner.refresh(guild_id).await.map(Response::Guild)
            })
            .await?
            .into_guild()
    }

    async fn refresh(&self, guild_id: u64) -> Result<Arc<Guild>> {
        let generation = self.cache.begin_refresh(guild_id);
        let lookup_failed = |e| GatewayError::directory("lookup_guild", e);

        let mut guild = self.directory.guild(guild_id).await.map_err(lookup_failed)?;
        guild.roles = self.directory.roles(guild_id).await.map_err(lookup_failed)?;
        guild.channels = self
            .directory
            .channels(guild_id)
            .await
            .map_err(lookup_failed)?;
        guild.members = self.fetch_members(guild_id).await?;

        debug!(
            guild_id,
            guild = %guild.name,
            roles = guild.roles.len(),
            channels = guild.channels.len(),
            members = guild.members.len(),
            "Refreshed guild snapshot"
        );

        let guild = Arc::new(guild);
        if !self.cache.publish(generation, Arc::clone(&guild)) {
            debug!(guild_id, "Guild changed during refresh, snapshot not cached");
        }
        Ok(guild)
    }

    /// Every member of the guild, page by page until a short page.
    async fn fetch_members(&self, guild_id: u64) -> Result<Vec<Member>> {
        let limit = self.page_limit;
        let mut members = Vec::new();
        let mut after = None;

        loop {
            let page = self
                .directory
                .members(guild_id, after, limit)
                .await
                .map_err(|e| GatewayError::directory("lookup_guild", e))?;
            let short = page.len() < usize::from(limit);
            after = page.last().map(|member| member.user_id);
            members.extend(page);

            if short || after.is_none() {
                break;
            }
        }

        Ok(members)
    }
}
