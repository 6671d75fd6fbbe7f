//! Moderation engine
//!
//! Reacts to gateway events: interdicts scam links, attributes role grants to
//! the moderator who made them, and cleans up after departing members. All
//! outbound effects go through the traits in [`ports`].

pub mod attribution;
pub mod backend;
pub mod denylist;
pub mod departure;
pub mod error;
pub mod events;
pub mod log_entry;
pub mod ports;
pub mod restoration;
pub mod scam;
pub mod store;
pub mod suppression;

#[cfg(test)]
mod testing;

pub use error::{ModerationError, ModerationResult};

use crate::config::BotConfig;
use attribution::RoleChangeAttributor;
use backend::SerenityBackend;
use denylist::LinkDenylistCache;
use departure::DepartureRetentionSweep;
use ports::{AuditTrail, ChatActions, LogSink, MessageHistory, RoleStore};
use restoration::RoleRestorer;
use scam::ScamInterdictor;
use std::sync::Arc;
use suppression::SuppressionRegistry;

/// The reactors, sharing one denylist, registry and store
pub struct ModerationEngine {
    pub interdictor: ScamInterdictor,
    pub attributor: RoleChangeAttributor,
    pub departures: DepartureRetentionSweep,
    pub restorer: RoleRestorer,
}

/// Everything outside the engine it needs to talk to
pub struct Collaborators {
    pub actions: Arc<dyn ChatActions>,
    pub audit: Arc<dyn AuditTrail>,
    pub history: Arc<dyn MessageHistory>,
    pub sink: Arc<dyn LogSink>,
    pub store: Arc<dyn RoleStore>,
}

impl Collaborators {
    /// Route every Discord-facing port through one backend
    pub fn serenity(backend: SerenityBackend, store: Arc<dyn RoleStore>) -> Self {
        let backend = Arc::new(backend);
        Self {
            actions: backend.clone(),
            audit: backend.clone(),
            history: backend.clone(),
            sink: backend,
            store,
        }
    }
}

impl ModerationEngine {
    pub fn new(
        config: &BotConfig,
        denylist: Arc<LinkDenylistCache>,
        suppressions: Arc<SuppressionRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        let guild_id = config.guild();
        let self_assignable = Arc::new(config.self_assignable());
        let Collaborators {
            actions,
            audit,
            history,
            sink,
            store,
        } = collaborators;

        Self {
            interdictor: ScamInterdictor::new(denylist, actions.clone(), sink.clone()),
            attributor: RoleChangeAttributor::new(
                guild_id,
                self_assignable.clone(),
                suppressions.clone(),
                audit,
                sink.clone(),
            ),
            departures: DepartureRetentionSweep::new(
                guild_id,
                config.channels.requests_channel(),
                config.request_leave_deletion_hours,
                self_assignable.clone(),
                store.clone(),
                history,
                actions.clone(),
                sink,
            ),
            restorer: RoleRestorer::new(guild_id, self_assignable, suppressions, store, actions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::attribution::AttributionOutcome;
    use crate::moderation::events::{
        AuditEntry, DepartingMember, MemberJoinEvent, MemberLeaveEvent, RoleAddEvent, UserSummary,
    };
    use crate::moderation::log_entry::LogChannel;
    use crate::moderation::ports::{MockAuditTrail, MockDenylistSource};
    use crate::moderation::store::YamlRoleStore;
    use crate::moderation::testing::{FakeHistory, RecordingActions, RecordingSink};
    use chrono::{Duration, Utc};
    use poise::serenity_prelude::{RoleId, UserId};

    const USER: UserId = UserId::new(7);
    const MODERATOR: UserId = UserId::new(99);

    fn config() -> BotConfig {
        BotConfig {
            guild_id: 10,
            self_assignable_roles: vec![4],
            ..BotConfig::default()
        }
    }

    /// Leave with roles, rejoin, and only a moderator's later grant is logged
    #[tokio::test]
    async fn test_rejoin_restoration_is_not_attributed() {
        let config = config();
        let actions = Arc::new(RecordingActions::default());
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(YamlRoleStore::in_memory());
        let suppressions = Arc::new(SuppressionRegistry::new());

        let mut audit = MockAuditTrail::new();
        audit.expect_latest_role_update().times(1).returning(|_| {
            Ok(Some(AuditEntry {
                actor: Some(MODERATOR),
                target: Some(USER.get()),
                created_at: Utc::now(),
            }))
        });

        let mut source = MockDenylistSource::new();
        source.expect_fetch_denylist().never();
        let denylist = Arc::new(LinkDenylistCache::new(Arc::new(source), Vec::new()));

        let engine = ModerationEngine::new(
            &config,
            denylist,
            suppressions.clone(),
            Collaborators {
                actions: actions.clone(),
                audit: Arc::new(audit),
                history: Arc::new(FakeHistory::new(Vec::new())),
                sink: sink.clone(),
                store: store.clone(),
            },
        );

        let user = UserSummary::new(USER, "member");
        engine
            .departures
            .on_member_left(MemberLeaveEvent {
                guild_id: config.guild(),
                user: user.clone(),
                member: Some(DepartingMember {
                    roles: vec![RoleId::new(1), RoleId::new(4)],
                    joined_at: Some(Utc::now() - Duration::days(2)),
                }),
            })
            .await;

        let restored = engine
            .restorer
            .on_member_joined(MemberJoinEvent {
                guild_id: config.guild(),
                user: user.clone(),
                roles: Vec::new(),
            })
            .await;
        assert_eq!(restored, vec![RoleId::new(1)]);

        let outcome = engine
            .attributor
            .on_role_added(RoleAddEvent {
                guild_id: config.guild(),
                target: user.clone(),
                added_roles: vec![RoleId::new(1)],
                current_roles: vec![RoleId::new(1)],
            })
            .await;
        assert_eq!(outcome, AttributionOutcome::Suppressed);

        let outcome = engine
            .attributor
            .on_role_added(RoleAddEvent {
                guild_id: config.guild(),
                target: user,
                added_roles: vec![RoleId::new(2)],
                current_roles: vec![RoleId::new(1), RoleId::new(2)],
            })
            .await;
        assert!(matches!(outcome, AttributionOutcome::Logged(_)));
        assert!(suppressions.is_empty());

        let important = sink
            .posted()
            .into_iter()
            .filter(|(channel, _)| *channel == LogChannel::Important)
            .count();
        assert_eq!(important, 1);
    }
}
