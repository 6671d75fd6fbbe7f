use crate::moderation::backend::to_utc;
use crate::moderation::events::{
    DepartingMember, IncomingMessage, MemberJoinEvent, MemberLeaveEvent, RoleAddEvent, UserSummary,
};
use crate::moderation::scam::EDITED_SUFFIX;
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, ChunkGuildFilter, Context, EventHandler, Guild, GuildId,
    GuildMemberUpdateEvent, Member, Message, MessageUpdateEvent, Permissions, Ready, RoleId, User,
    UserId,
};
use tracing::{debug, info, warn};

pub struct Handler;

async fn shared_data(ctx: &Context) -> Option<Data> {
    let data = ctx.data.read().await.get::<Data>().cloned();
    if data.is_none() {
        warn!(target: EVENT_TARGET, "Event received before shared data was registered");
    }
    data
}

pub fn user_summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id,
        tag: user.tag(),
        avatar_url: user.face(),
        bot: user.bot,
        system: user.system,
    }
}

/// Roles present in `current` but not in `previous`, in `current` order
#[must_use]
pub fn added_roles(previous: &[RoleId], current: &[RoleId]) -> Vec<RoleId> {
    current
        .iter()
        .copied()
        .filter(|role| !previous.contains(role))
        .collect()
}

/// Whether the guild's member list is only partially cached.
///
/// Large guilds arrive without their members, so role diffs and departure
/// snapshots need an explicit chunk request.
#[must_use]
pub fn needs_member_chunks(member_count: u64, cached_members: usize) -> bool {
    u64::try_from(cached_members).is_ok_and(|cached| cached < member_count)
}

/// Permissions from `@everyone` plus every listed role
#[must_use]
pub fn combine_role_permissions(
    everyone: Permissions,
    roles: impl IntoIterator<Item = Permissions>,
) -> Permissions {
    roles.into_iter().fold(everyone, |acc, role| acc | role)
}

#[must_use]
pub fn grants_manage_channels(permissions: Permissions) -> bool {
    permissions.administrator() || permissions.manage_channels()
}

/// Resolve the manage-channels permission from the cached member, falling
/// back to the role list carried on the event. `None` if neither is known.
fn can_manage_channels(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
    event_roles: Option<&[RoleId]>,
) -> Option<bool> {
    let guild = ctx.cache.guild(guild_id)?;
    if guild.owner_id == user_id {
        return Some(true);
    }
    if let Some(member) = guild.members.get(&user_id) {
        return Some(grants_manage_channels(guild.member_permissions(member)));
    }

    let roles = event_roles?;
    let everyone = guild
        .roles
        .get(&RoleId::new(guild_id.get()))
        .map_or_else(Permissions::empty, |role| role.permissions);
    let permissions = combine_role_permissions(
        everyone,
        roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .map(|role| role.permissions),
    );
    Some(grants_manage_channels(permissions))
}

fn incoming(ctx: &Context, message: &Message) -> IncomingMessage {
    let event_roles = message.member.as_ref().map(|member| member.roles.as_slice());
    IncomingMessage {
        id: message.id,
        channel_id: message.channel_id,
        guild_id: message.guild_id,
        author: user_summary(&message.author),
        webhook: message.webhook_id.is_some(),
        author_can_manage_channels: message.guild_id.and_then(|guild_id| {
            can_manage_channels(ctx, guild_id, message.author.id, event_roles)
        }),
        content: message.content.clone(),
    }
}

/// Build from the raw update when the edited message was not cached
fn incoming_from_update(ctx: &Context, event: &MessageUpdateEvent) -> Option<IncomingMessage> {
    let author = event.author.as_ref()?;
    let content = event.content.clone()?;
    Some(IncomingMessage {
        id: event.id,
        channel_id: event.channel_id,
        guild_id: event.guild_id,
        author: user_summary(author),
        webhook: matches!(event.webhook_id, Some(Some(_))),
        author_can_manage_channels: event
            .guild_id
            .and_then(|guild_id| can_manage_channels(ctx, guild_id, author.id, None)),
        content,
    })
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        if guild.id != data.config.guild() {
            return;
        }
        if needs_member_chunks(guild.member_count, guild.members.len()) {
            info!(
                target: EVENT_TARGET,
                "Requesting members of {} ({} of {} cached)",
                guild.id,
                guild.members.len(),
                guild.member_count
            );
            ctx.shard
                .chunk_guild(guild.id, None, false, ChunkGuildFilter::None, None);
        }
    }

    async fn message(&self, ctx: Context, new_message: Message) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let message = incoming(&ctx, &new_message);
        tokio::spawn(async move {
            data.engine.interdictor.on_message(&message, "").await;
        });
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let message = match new.as_ref() {
            Some(message) => Some(incoming(&ctx, message)),
            None => incoming_from_update(&ctx, &event),
        };
        let Some(message) = message else {
            debug!(target: EVENT_TARGET, "Message update {} carried no content", event.id);
            return;
        };
        tokio::spawn(async move {
            data.engine.interdictor.on_message(&message, EDITED_SUFFIX).await;
        });
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let Some(old) = old_if_available else {
            warn!(
                target: EVENT_TARGET,
                "No cached member for {}, cannot diff roles", event.user.id
            );
            return;
        };

        let added = added_roles(&old.roles, &event.roles);
        if added.is_empty() {
            return;
        }
        let role_event = RoleAddEvent {
            guild_id: event.guild_id,
            target: user_summary(&event.user),
            added_roles: added,
            current_roles: event.roles,
        };
        tokio::spawn(async move {
            data.engine.attributor.on_role_added(role_event).await;
        });
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        member_data_if_available: Option<Member>,
    ) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let leave = MemberLeaveEvent {
            guild_id,
            user: user_summary(&user),
            member: member_data_if_available.map(|member| DepartingMember {
                roles: member.roles,
                joined_at: member.joined_at.map(to_utc),
            }),
        };
        tokio::spawn(async move {
            data.engine.departures.on_member_left(leave).await;
        });
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let join = MemberJoinEvent {
            guild_id: new_member.guild_id,
            user: user_summary(&new_member.user),
            roles: new_member.roles,
        };
        tokio::spawn(async move {
            data.engine.restorer.on_member_joined(join).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_added_roles_keeps_only_new_roles() {
        let previous = [RoleId::new(1), RoleId::new(2)];
        let current = [RoleId::new(2), RoleId::new(3), RoleId::new(1), RoleId::new(4)];
        assert_eq!(
            added_roles(&previous, &current),
            vec![RoleId::new(3), RoleId::new(4)]
        );
    }

    #[test]
    fn test_removal_is_not_an_addition() {
        let previous = [RoleId::new(1), RoleId::new(2)];
        assert!(added_roles(&previous, &[RoleId::new(1)]).is_empty());
    }

    #[test]
    fn test_partial_member_list_needs_chunks() {
        assert!(needs_member_chunks(5_000, 1));
        assert!(!needs_member_chunks(120, 120));
        assert!(!needs_member_chunks(0, 0));
    }

    #[test]
    fn test_role_permissions_grant_exemption() {
        let everyone = Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNEL;
        let member = combine_role_permissions(everyone, [Permissions::ADD_REACTIONS]);
        assert!(!grants_manage_channels(member));

        let moderator = combine_role_permissions(
            everyone,
            [Permissions::ADD_REACTIONS, Permissions::MANAGE_CHANNELS],
        );
        assert!(grants_manage_channels(moderator));

        let admin = combine_role_permissions(Permissions::empty(), [Permissions::ADMINISTRATOR]);
        assert!(grants_manage_channels(admin));
    }

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }
}
