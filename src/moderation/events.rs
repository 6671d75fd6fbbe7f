//! Gateway-neutral event payloads
//!
//! The serenity event handler flattens gateway payloads into these types so the
//! engine can be driven (and tested) without a live shard.

use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// The parts of a user the engine needs for decisions and log entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    /// `name#discriminator` or the bare username for migrated accounts
    pub tag: String,
    pub avatar_url: String,
    pub bot: bool,
    pub system: bool,
}

impl UserSummary {
    /// Build a plain human user summary
    pub fn new(id: UserId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            avatar_url: String::new(),
            bot: false,
            system: false,
        }
    }
}

/// A created or edited message as seen by the scam interdictor
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: UserSummary,
    /// Sent through a webhook rather than by a guild member
    pub webhook: bool,
    /// Author holds the manage-channels permission in the guild.
    /// `None` when the author's member record could not be resolved.
    pub author_can_manage_channels: Option<bool>,
    pub content: String,
}

/// One or more roles were granted to a member
#[derive(Debug, Clone)]
pub struct RoleAddEvent {
    pub guild_id: GuildId,
    pub target: UserSummary,
    pub added_roles: Vec<RoleId>,
    /// Member roles after the update
    pub current_roles: Vec<RoleId>,
}

/// Member record as it was when the leave event arrived
#[derive(Debug, Clone)]
pub struct DepartingMember {
    pub roles: Vec<RoleId>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// A member left (or was removed from) a guild
#[derive(Debug, Clone)]
pub struct MemberLeaveEvent {
    pub guild_id: GuildId,
    pub user: UserSummary,
    /// `None` when the member record could not be resolved
    pub member: Option<DepartingMember>,
}

/// A member joined a guild
#[derive(Debug, Clone)]
pub struct MemberJoinEvent {
    pub guild_id: GuildId,
    pub user: UserSummary,
    pub roles: Vec<RoleId>,
}

/// One message of a channel's history
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Most recent member-role-update audit log entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Who performed the change
    pub actor: Option<UserId>,
    /// Raw id of the entry's target
    pub target: Option<u64>,
    pub created_at: DateTime<Utc>,
}
