//! Departure handling and request retention sweep
//!
//! When a member leaves, their roles and join instant are persisted, the
//! departure is logged, and their recent messages in the requests channel are
//! removed. The history scan walks newest-first and stops at the first message
//! older than the retention cutoff, so its cost is bounded by message age
//! rather than channel size.

use crate::{EVENT_TARGET, REQUESTS_TARGET};
use crate::moderation::events::{HistoryMessage, MemberLeaveEvent, UserSummary};
use crate::moderation::log_entry::{COLOR_PINK, COLOR_RED, LogChannel, LogEntry};
use crate::moderation::ports::{ChatActions, LogSink, MessageHistory, RoleStore};
use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use poise::serenity_prelude::{ChannelId, GuildId, Mentionable, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How far back the departure sweep reaches, in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionWindow(pub i64);

impl RetentionWindow {
    #[must_use]
    pub fn hours(self) -> i64 {
        self.0
    }

    /// Zero or negative windows disable the sweep
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self.0 > 0
    }

    /// Oldest creation instant still inside the window
    #[must_use]
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.0)
    }
}

/// What happened while processing a departure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartureReport {
    /// Roles captured from the member record, `None` if it was unavailable
    pub roles: Option<Vec<RoleId>>,
    pub snapshot_saved: bool,
    pub join_recorded: bool,
    /// Messages traversed before the cutoff stopped the scan
    pub scanned: usize,
    pub deleted: usize,
}

/// Persists departing members and sweeps their recent requests
pub struct DepartureRetentionSweep {
    guild_id: GuildId,
    requests_channel: Option<ChannelId>,
    window: RetentionWindow,
    self_assignable: Arc<HashSet<RoleId>>,
    store: Arc<dyn RoleStore>,
    history: Arc<dyn MessageHistory>,
    actions: Arc<dyn ChatActions>,
    sink: Arc<dyn LogSink>,
}

impl DepartureRetentionSweep {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guild_id: GuildId,
        requests_channel: Option<ChannelId>,
        window: RetentionWindow,
        self_assignable: Arc<HashSet<RoleId>>,
        store: Arc<dyn RoleStore>,
        history: Arc<dyn MessageHistory>,
        actions: Arc<dyn ChatActions>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            guild_id,
            requests_channel,
            window,
            self_assignable,
            store,
            history,
            actions,
            sink,
        }
    }

    /// Handle a member-leave event. Returns `None` for other guilds.
    pub async fn on_member_left(&self, event: MemberLeaveEvent) -> Option<DepartureReport> {
        if event.guild_id != self.guild_id {
            return None;
        }
        let user = event.user;
        info!(target: EVENT_TARGET, user_id = %user.id, event = "member_left", "User {} left the guild", user.tag);

        let mut report = DepartureReport::default();
        match event.member {
            Some(member) => {
                let kept: Vec<RoleId> = member
                    .roles
                    .iter()
                    .copied()
                    .filter(|role| !self.self_assignable.contains(role))
                    .collect();
                match self.store.insert_role_snapshot(user.id, kept).await {
                    Ok(()) => report.snapshot_saved = true,
                    Err(e) => error!(target: EVENT_TARGET, "Failed to persist roles of {}: {e}", user.id),
                }

                if let Some(joined_at) = member.joined_at {
                    match self.store.insert_join_record_if_absent(user.id, joined_at).await {
                        Ok(inserted) => report.join_recorded = inserted,
                        Err(e) => error!(target: EVENT_TARGET, "Failed to persist join time of {}: {e}", user.id),
                    }
                }
                report.roles = Some(member.roles);
            }
            None => {
                warn!(target: EVENT_TARGET, "Could not get roles of leaving user {}", user.id);
            }
        }

        if let Err(e) = self
            .sink
            .post(LogChannel::Basic, departure_log_entry(&user, report.roles.as_deref()))
            .await
        {
            error!(target: EVENT_TARGET, "Failed to post departure log for {}: {e}", user.id);
        }

        if let Some(roles) = report.roles.as_ref().filter(|roles| !roles.is_empty()) {
            info!(
                target: EVENT_TARGET,
                "User {} had the following roles before leaving: {roles:?}", user.id
            );
        }

        let (scanned, deleted) = self.sweep_recent_requests(&user, Utc::now()).await;
        report.scanned = scanned;
        report.deleted = deleted;
        Some(report)
    }

    /// Delete the user's messages in the requests channel newer than the cutoff.
    ///
    /// Returns `(scanned, deleted)`.
    pub async fn sweep_recent_requests(&self, user: &UserSummary, now: DateTime<Utc>) -> (usize, usize) {
        let Some(channel_id) = self.requests_channel else {
            return (0, 0);
        };
        if !self.window.is_enabled() {
            return (0, 0);
        }

        let cutoff = self.window.cutoff(now);
        let (scanned, candidates) = self.collect_candidates(channel_id, user, cutoff).await;

        let mut deleted = 0;
        for message in candidates {
            if self.delete_request(user, &message).await {
                deleted += 1;
            }
        }
        (scanned, deleted)
    }

    /// Traverse history newest-first until a message predates `cutoff`
    async fn collect_candidates(
        &self,
        channel_id: ChannelId,
        user: &UserSummary,
        cutoff: DateTime<Utc>,
    ) -> (usize, Vec<HistoryMessage>) {
        let mut stream = self.history.history(channel_id);
        let mut scanned = 0;
        let mut candidates = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(message) if message.created_at <= cutoff => break,
                Ok(message) => {
                    scanned += 1;
                    if message.author_id == user.id {
                        candidates.push(message);
                    }
                }
                Err(e) => {
                    error!(target: REQUESTS_TARGET, "Failed to read history of {channel_id}: {e}");
                    break;
                }
            }
        }
        (scanned, candidates)
    }

    /// Delete one request and log it. Returns whether it was deleted by us.
    async fn delete_request(&self, user: &UserSummary, message: &HistoryMessage) -> bool {
        let hours = self.window.hours();
        let reason = format!(
            "User left, message created at {}, within leave deletion threshold of {hours} hour(s)",
            message.created_at.to_rfc3339()
        );

        match self
            .actions
            .delete_message(message.channel_id, message.id, &reason)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_unknown_message() => {
                debug!(target: REQUESTS_TARGET, "Request {} was already gone", message.id);
                return false;
            }
            Err(e) => {
                error!(target: REQUESTS_TARGET, "Failed to delete request {} from {}: {e}", message.id, user.id);
                return false;
            }
        }

        info!(
            target: REQUESTS_TARGET,
            user_id = %user.id,
            message_id = %message.id,
            event = "request_deleted",
            "Removed request from {} (current leave deletion of {hours} hour(s), message sent on {}) because they left the server",
            user.tag,
            message.created_at
        );

        let entry = LogEntry::new("Automatic request deletion", COLOR_PINK)
            .author(user.tag.clone(), Some(user.avatar_url.clone()))
            .description(format!(
                "Deleted request from {} as the user left the server.",
                user.id.mention()
            ))
            .field(
                "Message Creation Time",
                format!("<t:{}:f>", message.created_at.timestamp()),
                true,
            )
            .field("Auto-Deletion on Leave Duration", format!("{hours} hour(s)"), true)
            .footer(format!("User ID: {}", user.id))
            .content(message.content.clone());
        if let Err(e) = self.sink.post(LogChannel::RequestsDeletion, entry).await {
            error!(target: REQUESTS_TARGET, "Failed to log deletion of request {}: {e}", message.id);
        }
        true
    }
}

/// Build the "User Left" entry for the basic log
fn departure_log_entry(user: &UserSummary, roles: Option<&[RoleId]>) -> LogEntry {
    let mut entry = LogEntry::new("User Left", COLOR_RED)
        .thumbnail(user.avatar_url.clone())
        .field("User:", user.tag.clone(), true);
    match roles {
        Some(roles) if !roles.is_empty() => {
            let mentions: String = roles.iter().map(|role| role.mention().to_string()).collect();
            entry = entry.field("Roles:", mentions, true);
        }
        Some(_) => {}
        None => entry = entry.field("Roles:", "_Could not obtain user's roles._", true),
    }
    entry.footer(format!("User ID: {}", user.id))
}
