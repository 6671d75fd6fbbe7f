//! Role grant attribution
//!
//! A role-add event carries no actor, so the attributor asks the audit log for
//! the most recent member-role-update entry and trusts it only when its target
//! matches the event's target. Another grant can land between the event and
//! the audit query; the target check is what keeps a racing entry from being
//! credited to the wrong editor.

use crate::EVENT_TARGET;
use crate::moderation::ModerationResult;
use crate::moderation::events::{RoleAddEvent, UserSummary};
use crate::moderation::log_entry::{COLOR_YELLOW, LogChannel, LogEntry};
use crate::moderation::ports::{AuditTrail, LogSink};
use crate::moderation::suppression::SuppressionRegistry;
use poise::serenity_prelude::{GuildId, Mentionable, RoleId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A role grant correlated with its (best-effort) editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRecord {
    pub target: UserSummary,
    /// Current roles minus the granted ones
    pub previous_roles: Vec<RoleId>,
    /// Granted roles left after suppression
    pub added_roles: Vec<RoleId>,
    /// `None` when no audit entry matched the target
    pub editor: Option<UserId>,
}

impl AttributionRecord {
    /// Render the record as an "important" log entry
    #[must_use]
    pub fn to_log_entry(&self) -> LogEntry {
        let target = &self.target;
        let mut entry = LogEntry::new("User Role(s) Added", COLOR_YELLOW)
            .thumbnail(target.avatar_url.clone())
            .field(
                "User:",
                format!("{} ({})", target.id.mention(), target.id),
                true,
            );
        if let Some(editor) = self.editor {
            entry = entry.field("Editor:", format!("{} ({editor})", editor.mention()), true);
        }
        entry
            .field("Previous Role(s):", mention_roles(&self.previous_roles), false)
            .field("Added Role(s):", mention_roles(&self.added_roles), false)
    }
}

fn mention_roles(roles: &[RoleId]) -> String {
    roles
        .iter()
        .map(|role| role.mention().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where processing of a role-add event stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionOutcome {
    /// Event belongs to a guild we do not monitor
    OtherGuild,
    /// Every granted role is a self-service reaction role
    SelfManaged,
    /// Every granted role was a pending suppression
    Suppressed,
    /// The audit log could not be read; nothing was posted
    AuditUnavailable,
    /// A record was produced and handed to the log sink
    Logged(AttributionRecord),
}

/// Logs role grants with the moderator that made them
pub struct RoleChangeAttributor {
    guild_id: GuildId,
    self_assignable: Arc<HashSet<RoleId>>,
    suppressions: Arc<SuppressionRegistry>,
    audit: Arc<dyn AuditTrail>,
    sink: Arc<dyn LogSink>,
}

impl RoleChangeAttributor {
    pub fn new(
        guild_id: GuildId,
        self_assignable: Arc<HashSet<RoleId>>,
        suppressions: Arc<SuppressionRegistry>,
        audit: Arc<dyn AuditTrail>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            guild_id,
            self_assignable,
            suppressions,
            audit,
            sink,
        }
    }

    /// Process one role-add event
    pub async fn on_role_added(&self, event: RoleAddEvent) -> AttributionOutcome {
        if event.guild_id != self.guild_id {
            return AttributionOutcome::OtherGuild;
        }

        if event
            .added_roles
            .iter()
            .all(|role| self.self_assignable.contains(role))
        {
            debug!(target: EVENT_TARGET, "Ignoring self-assigned role grant for {}", event.target.id);
            return AttributionOutcome::SelfManaged;
        }

        let target = event.target;
        let mut added_roles = event.added_roles;
        let previous_roles: Vec<RoleId> = event
            .current_roles
            .into_iter()
            .filter(|role| !added_roles.contains(role))
            .collect();

        let suppressed = self.suppressions.take_matching(target.id, &added_roles);
        if !suppressed.is_empty() {
            info!(
                target: EVENT_TARGET,
                "Role(s) {suppressed:?} for {} were in role ignore map, removing from map and ignoring",
                target.id
            );
            added_roles.retain(|role| !suppressed.contains(role));
        }
        if added_roles.is_empty() {
            return AttributionOutcome::Suppressed;
        }

        let editor = match self.resolve_editor(target.id).await {
            Ok(editor) => editor,
            Err(e) => {
                error!(
                    target: EVENT_TARGET,
                    "Failed to fetch audit log for role grant to {}: {e}", target.id
                );
                return AttributionOutcome::AuditUnavailable;
            }
        };

        let record = AttributionRecord {
            target,
            previous_roles,
            added_roles,
            editor,
        };

        info!(
            target: EVENT_TARGET,
            user_id = %record.target.id,
            editor_id = ?record.editor.map(|editor| editor.get()),
            added_roles = ?record.added_roles,
            event = "roles_added",
            "Role(s) {:?} was added to user {} by {:?}",
            record.added_roles,
            record.target.id,
            record.editor
        );

        if let Err(e) = self.sink.post(LogChannel::Important, record.to_log_entry()).await {
            error!(target: EVENT_TARGET, "Failed to post role grant log: {e}");
        }
        AttributionOutcome::Logged(record)
    }

    /// Look up who made the most recent role update, if it concerns `target`
    async fn resolve_editor(&self, target: UserId) -> ModerationResult<Option<UserId>> {
        let Some(entry) = self.audit.latest_role_update(self.guild_id).await? else {
            warn!(target: EVENT_TARGET, "No role update audit entry found for grant to {target}");
            return Ok(None);
        };

        if entry.target != Some(target.get()) {
            warn!(
                target: EVENT_TARGET,
                "Inconsistency between target of retrieved audit log entry and actual role event target: retrieved is {:?}, but target is {target}",
                entry.target
            );
            return Ok(None);
        }
        Ok(entry.actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ModerationError;
    use crate::moderation::events::AuditEntry;
    use crate::moderation::log_entry::EMPTY_FIELD_VALUE;
    use crate::moderation::ports::{MockAuditTrail, MockLogSink};
    use crate::moderation::testing::RecordingSink;
    use chrono::Utc;

    const GUILD: GuildId = GuildId::new(10);
    const USER: UserId = UserId::new(7);
    const MODERATOR: UserId = UserId::new(99);
    const R1: RoleId = RoleId::new(1);
    const R2: RoleId = RoleId::new(2);
    const MEMBER: RoleId = RoleId::new(3);
    const REACTION: RoleId = RoleId::new(4);

    fn audit_for(target: UserId, actor: UserId) -> MockAuditTrail {
        let mut audit = MockAuditTrail::new();
        audit.expect_latest_role_update().returning(move |_| {
            Ok(Some(AuditEntry {
                actor: Some(actor),
                target: Some(target.get()),
                created_at: Utc::now(),
            }))
        });
        audit
    }

    fn attributor(
        audit: MockAuditTrail,
        sink: Arc<dyn LogSink>,
        suppressions: Arc<SuppressionRegistry>,
    ) -> RoleChangeAttributor {
        RoleChangeAttributor::new(
            GUILD,
            Arc::new(HashSet::from([REACTION])),
            suppressions,
            Arc::new(audit),
            sink,
        )
    }

    fn grant(roles: &[RoleId]) -> RoleAddEvent {
        let mut current = vec![MEMBER];
        current.extend_from_slice(roles);
        RoleAddEvent {
            guild_id: GUILD,
            target: UserSummary::new(USER, "target"),
            added_roles: roles.to_vec(),
            current_roles: current,
        }
    }

    #[tokio::test]
    async fn test_grant_is_attributed_to_editor() {
        let sink = Arc::new(RecordingSink::default());
        let attributor = attributor(
            audit_for(USER, MODERATOR),
            sink.clone(),
            Arc::new(SuppressionRegistry::new()),
        );

        let AttributionOutcome::Logged(record) = attributor.on_role_added(grant(&[R1])).await
        else {
            panic!("expected a logged record");
        };
        assert_eq!(record.editor, Some(MODERATOR));
        assert_eq!(record.previous_roles, vec![MEMBER]);
        assert_eq!(record.added_roles, vec![R1]);

        let posted = sink.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, LogChannel::Important);
        assert_eq!(posted[0].1.field_value("Editor:"), Some("<@99> (99)"));
        assert_eq!(posted[0].1.field_value("Added Role(s):"), Some("<@&1>"));
    }

    #[tokio::test]
    async fn test_first_role_grant_has_placeholder_previous_roles() {
        let sink = Arc::new(RecordingSink::default());
        let attributor = attributor(
            audit_for(USER, MODERATOR),
            sink.clone(),
            Arc::new(SuppressionRegistry::new()),
        );
        let mut event = grant(&[R1]);
        event.current_roles = vec![R1];

        let AttributionOutcome::Logged(record) = attributor.on_role_added(event).await else {
            panic!("expected a logged record");
        };
        assert!(record.previous_roles.is_empty());

        let posted = sink.posted();
        let previous = posted[0].1.field_value("Previous Role(s):").unwrap();
        assert!(!previous.is_empty());
        assert_eq!(previous, EMPTY_FIELD_VALUE);
    }

    #[tokio::test]
    async fn test_mismatched_audit_target_is_not_trusted() {
        let sink = Arc::new(RecordingSink::default());
        let attributor = attributor(
            audit_for(UserId::new(12345), MODERATOR),
            sink.clone(),
            Arc::new(SuppressionRegistry::new()),
        );

        let AttributionOutcome::Logged(record) = attributor.on_role_added(grant(&[R1])).await
        else {
            panic!("expected a logged record");
        };
        assert_eq!(record.editor, None);
        assert!(sink.posted()[0].1.field_value("Editor:").is_none());
    }

    #[tokio::test]
    async fn test_missing_audit_entry_still_logs() {
        let mut audit = MockAuditTrail::new();
        audit.expect_latest_role_update().returning(|_| Ok(None));
        let sink = Arc::new(RecordingSink::default());
        let attributor = attributor(audit, sink.clone(), Arc::new(SuppressionRegistry::new()));

        let outcome = attributor.on_role_added(grant(&[R1])).await;
        assert!(matches!(outcome, AttributionOutcome::Logged(ref r) if r.editor.is_none()));
        assert_eq!(sink.posted().len(), 1);
    }

    #[tokio::test]
    async fn test_suppressed_role_is_consumed_once() {
        let suppressions = Arc::new(SuppressionRegistry::new());
        suppressions.suppress_once(USER, R1);
        let sink = Arc::new(RecordingSink::default());
        let attributor = attributor(audit_for(USER, MODERATOR), sink.clone(), suppressions.clone());

        let AttributionOutcome::Logged(record) = attributor.on_role_added(grant(&[R1, R2])).await
        else {
            panic!("expected a logged record");
        };
        assert_eq!(record.added_roles, vec![R2]);
        assert!(!suppressions.is_pending(USER, R1));
        assert_eq!(sink.posted()[0].1.field_value("Added Role(s):"), Some("<@&2>"));

        // A later grant of the same role is logged normally
        let AttributionOutcome::Logged(record) = attributor.on_role_added(grant(&[R1])).await
        else {
            panic!("expected a logged record");
        };
        assert_eq!(record.added_roles, vec![R1]);
    }

    #[tokio::test]
    async fn test_fully_suppressed_grant_skips_audit_and_log() {
        let suppressions = Arc::new(SuppressionRegistry::new());
        suppressions.suppress_all(USER, [R1, R2]);
        let mut audit = MockAuditTrail::new();
        audit.expect_latest_role_update().times(0);
        let mut sink = MockLogSink::new();
        sink.expect_post().times(0);
        let attributor = attributor(audit, Arc::new(sink), suppressions.clone());

        let outcome = attributor.on_role_added(grant(&[R1, R2])).await;
        assert_eq!(outcome, AttributionOutcome::Suppressed);
        assert!(suppressions.is_empty());
    }

    #[tokio::test]
    async fn test_racing_grants_consume_suppression_once() {
        let suppressions = Arc::new(SuppressionRegistry::new());
        suppressions.suppress_once(USER, R1);
        let sink = Arc::new(RecordingSink::default());
        let attributor = Arc::new(attributor(
            audit_for(USER, MODERATOR),
            sink.clone(),
            suppressions,
        ));

        let first = {
            let attributor = Arc::clone(&attributor);
            tokio::spawn(async move { attributor.on_role_added(grant(&[R1])).await })
        };
        let second = {
            let attributor = Arc::clone(&attributor);
            tokio::spawn(async move { attributor.on_role_added(grant(&[R1])).await })
        };
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        let suppressed = outcomes
            .iter()
            .filter(|outcome| **outcome == AttributionOutcome::Suppressed)
            .count();
        assert_eq!(suppressed, 1);
        assert_eq!(sink.posted().len(), 1);
    }

    #[tokio::test]
    async fn test_other_guild_and_self_roles_are_ignored() {
        let mut audit = MockAuditTrail::new();
        audit.expect_latest_role_update().times(0);
        let mut sink = MockLogSink::new();
        sink.expect_post().times(0);
        let attributor = attributor(audit, Arc::new(sink), Arc::new(SuppressionRegistry::new()));

        let mut elsewhere = grant(&[R1]);
        elsewhere.guild_id = GuildId::new(11);
        assert_eq!(
            attributor.on_role_added(elsewhere).await,
            AttributionOutcome::OtherGuild
        );
        assert_eq!(
            attributor.on_role_added(grant(&[REACTION])).await,
            AttributionOutcome::SelfManaged
        );
    }

    #[tokio::test]
    async fn test_audit_failure_abandons_event() {
        let mut audit = MockAuditTrail::new();
        audit
            .expect_latest_role_update()
            .returning(|_| Err(ModerationError::Other("timeout".to_string())));
        let mut sink = MockLogSink::new();
        sink.expect_post().times(0);
        let attributor = attributor(audit, Arc::new(sink), Arc::new(SuppressionRegistry::new()));

        assert_eq!(
            attributor.on_role_added(grant(&[R1])).await,
            AttributionOutcome::AuditUnavailable
        );
    }
}
