//! Collaborator interfaces
//!
//! The engine talks to Discord, the denylist host and the persistence layer
//! only through these traits. [`crate::moderation::backend`] and
//! [`crate::moderation::store`] provide the production implementations.

use crate::moderation::events::{AuditEntry, HistoryMessage};
use crate::moderation::log_entry::{LogChannel, LogEntry};
use crate::moderation::ModerationResult;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};

#[cfg(test)]
use mockall::automock;

/// Remote source of known scam URL fragments
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait DenylistSource: Send + Sync {
    /// Fetch the complete current list
    async fn fetch_denylist(&self) -> ModerationResult<Vec<String>>;
}

/// Moderation side effects on the chat surface
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ChatActions: Send + Sync {
    /// Delete a message, recording `reason` in the audit log
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        reason: &str,
    ) -> ModerationResult<()>;

    /// Time a member out until `until`
    async fn timeout_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        until: DateTime<Utc>,
        reason: &str,
    ) -> ModerationResult<()>;

    /// Grant a role to a member
    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> ModerationResult<()>;
}

/// Read access to the guild audit log
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait AuditTrail: Send + Sync {
    /// Latest member-role-update entry for the guild (limit 1)
    async fn latest_role_update(&self, guild_id: GuildId) -> ModerationResult<Option<AuditEntry>>;
}

/// Reverse-chronological channel history
#[cfg_attr(test, automock)]
pub trait MessageHistory: Send + Sync {
    /// Lazily page through a channel's messages, newest first.
    ///
    /// The stream is finite and cannot be restarted; callers stop polling once
    /// they have seen enough.
    fn history(&self, channel_id: ChannelId) -> BoxStream<'static, ModerationResult<HistoryMessage>>;
}

/// Persistence for departure snapshots
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Store the roles a user held when leaving, replacing any previous snapshot
    async fn insert_role_snapshot(&self, user_id: UserId, roles: Vec<RoleId>) -> ModerationResult<()>;

    /// Store a join instant unless one is already recorded.
    ///
    /// Returns `true` if the record was written.
    async fn insert_join_record_if_absent(
        &self,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> ModerationResult<bool>;

    /// Roles persisted for a user at their last departure
    async fn role_snapshot(&self, user_id: UserId) -> ModerationResult<Option<Vec<RoleId>>>;
}

/// Outbound moderation log
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
    /// Post an entry to the given logical channel
    async fn post(&self, channel: LogChannel, entry: LogEntry) -> ModerationResult<()>;
}
