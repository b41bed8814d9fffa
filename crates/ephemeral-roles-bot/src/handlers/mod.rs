//! Serenity event handler implementation

use std::sync::Arc;

use ephemeral_gateway::{log_error, VoiceStateReducer};
use ephemeral_types::VoiceStateChange;
use serenity::async_trait;
use serenity::model::channel::{GuildChannel, Message};
use serenity::model::event::GuildMemberUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::{Guild, Member, Role, UnavailableGuild};
use serenity::model::id::{GuildId, RoleId};
use serenity::model::user::User;
use serenity::model::voice::VoiceState;
use serenity::prelude::*;
use tracing::{debug, error, info};

use crate::directory::SerenityDirectory;
use crate::health::AppState;

pub type Reducer = VoiceStateReducer<SerenityDirectory>;

/// Client data key for the shared reducer.
pub struct RoleSync;

impl TypeMapKey for RoleSync {
    type Value = Arc<Reducer>;
}

pub struct Handler;

async fn reducer(ctx: &Context) -> Option<Arc<Reducer>> {
    let data = ctx.data.read().await;
    let reducer = data.get::<RoleSync>().cloned();
    if reducer.is_none() {
        error!("RoleSync not found in context data");
    }
    reducer
}

async fn invalidate(ctx: &Context, guild_id: GuildId, reason: &'static str) {
    if let Some(reducer) = reducer(ctx).await {
        debug!(guild_id = guild_id.get(), reason, "Dropping guild snapshot");
        reducer.gateway().invalidate(guild_id.get());
    }
}

/// Voice state updates outside a guild carry nothing to reduce.
fn voice_change(
    user_id: u64,
    guild_id: Option<u64>,
    old_channel_id: Option<u64>,
    new_channel_id: Option<u64>,
) -> Option<VoiceStateChange> {
    guild_id.map(|guild_id| VoiceStateChange::new(user_id, guild_id, old_channel_id, new_channel_id))
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            user_id = ready.user.id.get(),
            guilds = ready.guilds.len(),
            "Discord bot connected as {}",
            ready.user.name
        );

        let data = ctx.data.read().await;
        if let Some(reducer) = data.get::<RoleSync>() {
            reducer.set_bot_user_id(ready.user.id.get());
        }
        if let Some(state) = data.get::<AppState>() {
            state.set_bot_username(ready.user.name.clone()).await;
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let health = ctx.data.read().await.get::<AppState>().cloned();
        if let Some(health) = health {
            health.record_voice_state_update();
        }

        let Some(change) = voice_change(
            new.user_id.get(),
            new.guild_id.map(|id| id.get()),
            old.and_then(|o| o.channel_id).map(|id| id.get()),
            new.channel_id.map(|id| id.get()),
        ) else {
            return;
        };
        let Some(reducer) = reducer(&ctx).await else {
            return;
        };

        debug!(
            guild_id = change.guild_id,
            user_id = change.user_id,
            transition = ?change.transition(),
            "Voice state update"
        );
        match reducer.reduce(&change).await {
            Ok(Some(transition)) => transition.log(),
            Ok(None) => {}
            Err(e) => log_error("Unable to process voice state update", &e),
        }
    }

    async fn guild_role_create(&self, ctx: Context, new: Role) {
        invalidate(&ctx, new.guild_id, "role created").await;
    }

    async fn guild_role_update(&self, ctx: Context, _old: Option<Role>, new: Role) {
        invalidate(&ctx, new.guild_id, "role updated").await;
    }

    async fn guild_role_delete(
        &self,
        ctx: Context,
        guild_id: GuildId,
        _removed_role_id: RoleId,
        _removed_role: Option<Role>,
    ) {
        invalidate(&ctx, guild_id, "role deleted").await;
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        invalidate(&ctx, incomplete.id, "guild removed").await;
    }

    async fn channel_create(&self, ctx: Context, channel: GuildChannel) {
        invalidate(&ctx, channel.guild_id, "channel created").await;
    }

    async fn channel_update(&self, ctx: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        invalidate(&ctx, new.guild_id, "channel updated").await;
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        invalidate(&ctx, channel.guild_id, "channel deleted").await;
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        invalidate(&ctx, new_member.guild_id, "member joined").await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        _user: User,
        _member: Option<Member>,
    ) {
        invalidate(&ctx, guild_id, "member left").await;
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        _old: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if let Some(reducer) = reducer(&ctx).await {
            reducer.gateway().observe_member_roles(
                event.guild_id.get(),
                event.user.id.get(),
                event.roles.iter().map(|id| id.get()).collect(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_types::VoiceTransition;

    #[test]
    fn test_voice_change_outside_guild_is_ignored() {
        assert!(voice_change(7, None, None, Some(300)).is_none());
    }

    #[test]
    fn test_voice_change_carries_channels() {
        let change = voice_change(7, Some(100), Some(300), Some(302)).unwrap();
        assert_eq!(change.user_id, 7);
        assert_eq!(change.guild_id, 100);
        assert_eq!(change.old_channel_id, Some(300));
        assert_eq!(change.new_channel_id, Some(302));
        assert_eq!(change.transition(), VoiceTransition::Moved);
    }

    #[test]
    fn test_voice_change_leave() {
        let change = voice_change(7, Some(100), Some(300), None).unwrap();
        assert_eq!(change.transition(), VoiceTransition::Left);
    }
}
