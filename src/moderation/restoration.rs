//! Role restoration for returning members
//!
//! Roles persisted at departure are re-granted when the member rejoins. Each
//! role is registered with the [`SuppressionRegistry`] before it is added so
//! the attributor does not report the restoration as a moderator grant.

use crate::EVENT_TARGET;
use crate::moderation::events::MemberJoinEvent;
use crate::moderation::ports::{ChatActions, RoleStore};
use crate::moderation::suppression::SuppressionRegistry;
use poise::serenity_prelude::{GuildId, RoleId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Audit log reason for restored roles
pub const RESTORE_REASON: &str = "Persisted roles restored on rejoin";

/// Re-grants persisted roles to returning members
pub struct RoleRestorer {
    guild_id: GuildId,
    self_assignable: Arc<HashSet<RoleId>>,
    suppressions: Arc<SuppressionRegistry>,
    store: Arc<dyn RoleStore>,
    actions: Arc<dyn ChatActions>,
}

impl RoleRestorer {
    pub fn new(
        guild_id: GuildId,
        self_assignable: Arc<HashSet<RoleId>>,
        suppressions: Arc<SuppressionRegistry>,
        store: Arc<dyn RoleStore>,
        actions: Arc<dyn ChatActions>,
    ) -> Self {
        Self {
            guild_id,
            self_assignable,
            suppressions,
            store,
            actions,
        }
    }

    /// Restore persisted roles. Returns the roles that were granted.
    pub async fn on_member_joined(&self, event: MemberJoinEvent) -> Vec<RoleId> {
        if event.guild_id != self.guild_id {
            return Vec::new();
        }
        let user_id = event.user.id;

        let snapshot = match self.store.role_snapshot(user_id).await {
            Ok(Some(roles)) => roles,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(target: EVENT_TARGET, "Failed to load persisted roles of {user_id}: {e}");
                return Vec::new();
            }
        };

        let to_restore: Vec<RoleId> = snapshot
            .into_iter()
            .filter(|role| !event.roles.contains(role) && !self.self_assignable.contains(role))
            .collect();
        if to_restore.is_empty() {
            return Vec::new();
        }

        info!(
            target: EVENT_TARGET,
            user_id = %user_id,
            roles = ?to_restore,
            event = "roles_restored",
            "Restoring persisted roles for returning user {}", event.user.tag
        );
        self.suppressions.suppress_all(user_id, to_restore.iter().copied());

        let mut restored = Vec::with_capacity(to_restore.len());
        for role_id in to_restore {
            match self
                .actions
                .add_member_role(self.guild_id, user_id, role_id, RESTORE_REASON)
                .await
            {
                Ok(()) => restored.push(role_id),
                Err(e) => {
                    // No grant event will arrive to consume it
                    self.suppressions.withdraw(user_id, role_id);
                    error!(target: EVENT_TARGET, "Failed to restore role {role_id} to {user_id}: {e}");
                }
            }
        }
        restored
    }
}
