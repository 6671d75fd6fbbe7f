//! In-memory fakes shared by the engine tests

use crate::moderation::ModerationResult;
use crate::moderation::events::HistoryMessage;
use crate::moderation::log_entry::{LogChannel, LogEntry};
use crate::moderation::ports::{ChatActions, LogSink, MessageHistory};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every side effect and always succeeds
#[derive(Default)]
pub struct RecordingActions {
    deleted: Mutex<Vec<(ChannelId, MessageId)>>,
    timeouts: Mutex<Vec<(GuildId, UserId, DateTime<Utc>)>>,
    grants: Mutex<Vec<(UserId, RoleId)>>,
}

impl RecordingActions {
    pub fn deleted(&self) -> Vec<(ChannelId, MessageId)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn timeouts(&self) -> Vec<(GuildId, UserId, DateTime<Utc>)> {
        self.timeouts.lock().unwrap().clone()
    }

    pub fn role_grants(&self) -> Vec<(UserId, RoleId)> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatActions for RecordingActions {
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        _reason: &str,
    ) -> ModerationResult<()> {
        self.deleted.lock().unwrap().push((channel_id, message_id));
        Ok(())
    }

    async fn timeout_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        until: DateTime<Utc>,
        _reason: &str,
    ) -> ModerationResult<()> {
        self.timeouts.lock().unwrap().push((guild_id, user_id, until));
        Ok(())
    }

    async fn add_member_role(
        &self,
        _guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        _reason: &str,
    ) -> ModerationResult<()> {
        self.grants.lock().unwrap().push((user_id, role_id));
        Ok(())
    }
}

/// Collects posted log entries in order
#[derive(Default)]
pub struct RecordingSink {
    posted: Mutex<Vec<(LogChannel, LogEntry)>>,
}

impl RecordingSink {
    pub fn posted(&self) -> Vec<(LogChannel, LogEntry)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LogSink for RecordingSink {
    async fn post(&self, channel: LogChannel, entry: LogEntry) -> ModerationResult<()> {
        self.posted.lock().unwrap().push((channel, entry));
        Ok(())
    }
}

/// Fixed newest-first history that counts how many messages were pulled
pub struct FakeHistory {
    messages: Vec<HistoryMessage>,
    pulled: Arc<AtomicUsize>,
}

impl FakeHistory {
    pub fn new(messages: Vec<HistoryMessage>) -> Self {
        Self {
            messages,
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

impl MessageHistory for FakeHistory {
    fn history(&self, channel_id: ChannelId) -> BoxStream<'static, ModerationResult<HistoryMessage>> {
        let pulled = self.pulled.clone();
        let messages: Vec<HistoryMessage> = self
            .messages
            .iter()
            .filter(|message| message.channel_id == channel_id)
            .cloned()
            .collect();
        stream::iter(messages)
            .map(move |message| {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok(message)
            })
            .boxed()
    }
}
