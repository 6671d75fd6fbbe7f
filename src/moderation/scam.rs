//! Scam link interdiction
//!
//! Messages containing a denylisted fragment are deleted. Only once the
//! deletion has gone through is the author timed out and the incident logged;
//! those two follow-ups run concurrently and neither is retried.

use crate::EVENT_TARGET;
use crate::moderation::denylist::LinkDenylistCache;
use crate::moderation::events::IncomingMessage;
use crate::moderation::log_entry::{COLOR_RED, LogChannel, LogEntry, codeblock};
use crate::moderation::ports::{ChatActions, LogSink};
use chrono::{Duration, Utc};
use poise::serenity_prelude::Mentionable;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Timeout applied to scam link authors
pub const SCAM_TIMEOUT_DAYS: i64 = 14;

/// Audit log reason for the deletion
pub const DELETE_REASON: &str = "Scam link";

/// Audit log reason for the timeout
pub const TIMEOUT_REASON: &str = "Sent a scam link";

/// Log suffix for messages caught after an edit
pub const EDITED_SUFFIX: &str = ", by editing an old message";

/// What the interdictor did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScamOutcome {
    /// Author or message kind is exempt from scanning
    Ignored,
    /// No denylisted fragment found
    Clean,
    /// A match was found but the message could not be deleted
    DeletionFailed,
    /// The message was deleted; follow-up results are reported individually
    Interdicted { muted: bool, logged: bool },
}

/// Deletes scam messages and times out their authors
pub struct ScamInterdictor {
    denylist: Arc<LinkDenylistCache>,
    actions: Arc<dyn ChatActions>,
    sink: Arc<dyn LogSink>,
}

impl ScamInterdictor {
    pub fn new(
        denylist: Arc<LinkDenylistCache>,
        actions: Arc<dyn ChatActions>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            denylist,
            actions,
            sink,
        }
    }

    /// Whether the message should be scanned at all.
    ///
    /// Authors whose permissions cannot be resolved are not scanned.
    fn is_exempt(message: &IncomingMessage) -> bool {
        message.guild_id.is_none()
            || message.webhook
            || message.author.bot
            || message.author.system
            || message.author_can_manage_channels != Some(false)
    }

    /// Scan a created or edited message and remediate on a match.
    ///
    /// `reason_suffix` is appended to the log description, e.g.
    /// [`EDITED_SUFFIX`] for edits.
    pub async fn on_message(&self, message: &IncomingMessage, reason_suffix: &str) -> ScamOutcome {
        if Self::is_exempt(message) {
            return ScamOutcome::Ignored;
        }
        let Some(guild_id) = message.guild_id else {
            return ScamOutcome::Ignored;
        };

        if !self.denylist.contains(&message.content) {
            return ScamOutcome::Clean;
        }

        info!(
            target: EVENT_TARGET,
            user_id = %message.author.id,
            channel_id = %message.channel_id,
            message_id = %message.id,
            event = "scam_detected",
            "Scam link detected"
        );

        if let Err(e) = self
            .actions
            .delete_message(message.channel_id, message.id, DELETE_REASON)
            .await
        {
            if e.is_unknown_message() {
                warn!(target: EVENT_TARGET, "Scam message {} was already deleted", message.id);
            } else {
                error!(target: EVENT_TARGET, "Failed to delete scam message {}: {e}", message.id);
            }
            return ScamOutcome::DeletionFailed;
        }

        let until = Utc::now() + Duration::days(SCAM_TIMEOUT_DAYS);
        let entry = scam_log_entry(message, reason_suffix);
        let (muted, logged) = tokio::join!(
            self.actions
                .timeout_member(guild_id, message.author.id, until, TIMEOUT_REASON),
            self.sink.post(LogChannel::RequestsDeletion, entry),
        );

        if let Err(e) = &muted {
            error!(target: EVENT_TARGET, "Failed to time out scam author {}: {e}", message.author.id);
        }
        if let Err(e) = &logged {
            error!(target: EVENT_TARGET, "Failed to log scam message {}: {e}", message.id);
        }

        ScamOutcome::Interdicted {
            muted: muted.is_ok(),
            logged: logged.is_ok(),
        }
    }
}

/// Build the moderation log entry for a deleted scam message
fn scam_log_entry(message: &IncomingMessage, reason_suffix: &str) -> LogEntry {
    LogEntry::new("Scam link detected!", COLOR_RED)
        .description(format!(
            "User {} sent a scam link in {}{}. Their message was deleted, and they were muted.",
            message.author.id.mention(),
            message.channel_id.mention(),
            reason_suffix
        ))
        .field("Message Content", codeblock(&message.content), false)
        .footer(format!("User ID: {}", message.author.id))
        .thumbnail(message.author.avatar_url.clone())
}
