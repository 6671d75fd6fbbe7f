//! Serenity implementation of the collaborator ports

use crate::config::ChannelsConfig;
use crate::{EVENT_TARGET, REQUESTS_TARGET};
use crate::moderation::events::{AuditEntry, HistoryMessage};
use crate::moderation::log_entry::{LogChannel, LogEntry};
use crate::moderation::ports::{AuditTrail, ChatActions, LogSink, MessageHistory};
use crate::moderation::{ModerationError, ModerationResult};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use poise::serenity_prelude::{
    ChannelId, CreateAllowedMentions, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    CreateMessage, EditMember, GetMessages, GuildId, Http, MessageId, RoleId, Timestamp, UserId,
};
use serenity::model::guild::audit_log::{Action, MemberAction};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Messages requested per history page
pub const HISTORY_PAGE_SIZE: u8 = 100;

/// Convert a serenity timestamp to chrono, falling back to the epoch
#[must_use]
pub fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// Ports backed by the Discord REST API
#[derive(Clone)]
pub struct SerenityBackend {
    http: Arc<Http>,
    channels: ChannelsConfig,
}

impl SerenityBackend {
    pub fn new(http: Arc<Http>, channels: ChannelsConfig) -> Self {
        Self { http, channels }
    }
}

/// Render a log entry as a serenity message
#[must_use]
pub fn render(entry: LogEntry) -> CreateMessage {
    let mut embed = CreateEmbed::new()
        .title(entry.title)
        .colour(entry.color)
        .timestamp(Timestamp::now());
    if let Some(description) = entry.description {
        embed = embed.description(description);
    }
    for field in entry.fields {
        embed = embed.field(field.name, field.value, field.inline);
    }
    if let Some(footer) = entry.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    if let Some(thumbnail) = entry.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(author) = entry.author {
        let mut line = CreateEmbedAuthor::new(author.name);
        if let Some(icon) = author.icon_url {
            line = line.icon_url(icon);
        }
        embed = embed.author(line);
    }

    let mut message = CreateMessage::new()
        .embed(embed)
        .allowed_mentions(CreateAllowedMentions::new());
    if let Some(content) = entry.content {
        message = message.content(content);
    }
    message
}

#[async_trait::async_trait]
impl ChatActions for SerenityBackend {
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        reason: &str,
    ) -> ModerationResult<()> {
        self.http
            .delete_message(channel_id, message_id, Some(reason))
            .await
            .map_err(ModerationError::from)
    }

    async fn timeout_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        until: DateTime<Utc>,
        reason: &str,
    ) -> ModerationResult<()> {
        let builder = EditMember::new()
            .disable_communication_until_datetime(until.into())
            .audit_log_reason(reason);
        guild_id
            .edit_member(&*self.http, user_id, builder)
            .await
            .map(|_| ())
            .map_err(ModerationError::from)
    }

    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> ModerationResult<()> {
        self.http
            .add_member_role(guild_id, user_id, role_id, Some(reason))
            .await
            .map_err(ModerationError::from)
    }
}

#[async_trait::async_trait]
impl AuditTrail for SerenityBackend {
    async fn latest_role_update(&self, guild_id: GuildId) -> ModerationResult<Option<AuditEntry>> {
        let logs = guild_id
            .audit_logs(
                &*self.http,
                Some(Action::Member(MemberAction::RoleUpdate)),
                None,
                None,
                Some(1),
            )
            .await?;

        Ok(logs.entries.into_iter().next().map(|entry| AuditEntry {
            actor: Some(entry.user_id),
            target: entry.target_id.map(|id| id.get()),
            created_at: to_utc(entry.id.created_at()),
        }))
    }
}

struct HistoryCursor {
    http: Arc<Http>,
    channel_id: ChannelId,
    before: Option<MessageId>,
    buffered: VecDeque<HistoryMessage>,
    exhausted: bool,
}

impl MessageHistory for SerenityBackend {
    fn history(&self, channel_id: ChannelId) -> BoxStream<'static, ModerationResult<HistoryMessage>> {
        let cursor = HistoryCursor {
            http: self.http.clone(),
            channel_id,
            before: None,
            buffered: VecDeque::new(),
            exhausted: false,
        };

        stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(message) = cursor.buffered.pop_front() {
                    return Some((Ok(message), cursor));
                }
                if cursor.exhausted {
                    return None;
                }

                let mut request = GetMessages::new().limit(HISTORY_PAGE_SIZE);
                if let Some(before) = cursor.before {
                    request = request.before(before);
                }
                match cursor.channel_id.messages(&*cursor.http, request).await {
                    Ok(page) => {
                        debug!(target: REQUESTS_TARGET, "Fetched {} messages from {}", page.len(), cursor.channel_id);
                        cursor.exhausted = page.len() < usize::from(HISTORY_PAGE_SIZE);
                        cursor.before = page.last().map(|message| message.id);
                        cursor.buffered.extend(page.into_iter().map(|message| HistoryMessage {
                            id: message.id,
                            channel_id: message.channel_id,
                            author_id: message.author.id,
                            content: message.content,
                            created_at: to_utc(message.timestamp),
                        }));
                        if cursor.buffered.is_empty() {
                            return None;
                        }
                    }
                    Err(e) => {
                        cursor.exhausted = true;
                        return Some((Err(ModerationError::from(e)), cursor));
                    }
                }
            }
        })
        .boxed()
    }
}

#[async_trait::async_trait]
impl LogSink for SerenityBackend {
    async fn post(&self, channel: LogChannel, entry: LogEntry) -> ModerationResult<()> {
        let Some(channel_id) = self.channels.log_channel(channel) else {
            debug!(target: EVENT_TARGET, "No {channel} log channel configured, dropping \"{}\"", entry.title);
            return Ok(());
        };
        channel_id.send_message(&*self.http, render(entry)).await?;
        Ok(())
    }
}
