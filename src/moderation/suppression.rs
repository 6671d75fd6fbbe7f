//! One-shot role-grant suppression registry
//!
//! Role restoration registers the roles it is about to re-add; the role
//! attributor consumes each (user, role) pairing the first time it appears in a
//! role-add event. Consumption happens while holding the map shard for that
//! user, so two racing events cannot both consume the same pairing.

use dashmap::DashMap;
use poise::serenity_prelude::{RoleId, UserId};
use std::collections::HashSet;

/// Concurrent multimap of user to roles whose next grant should not be logged
#[derive(Debug, Default)]
pub struct SuppressionRegistry {
    pending: DashMap<UserId, HashSet<RoleId>>,
}

impl SuppressionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore the next grant of `role_id` to `user_id`
    pub fn suppress_once(&self, user_id: UserId, role_id: RoleId) {
        self.pending.entry(user_id).or_default().insert(role_id);
    }

    /// Ignore the next grant of each of `roles` to `user_id`
    pub fn suppress_all(&self, user_id: UserId, roles: impl IntoIterator<Item = RoleId>) {
        self.pending.entry(user_id).or_default().extend(roles);
    }

    /// Remove and return every pending pairing for `user_id` that appears in `roles`.
    ///
    /// Each returned role was pending exactly once and is no longer pending.
    pub fn take_matching(&self, user_id: UserId, roles: &[RoleId]) -> Vec<RoleId> {
        let mut taken = Vec::new();
        if let Some(mut pending) = self.pending.get_mut(&user_id) {
            for role_id in roles {
                if pending.remove(role_id) {
                    taken.push(*role_id);
                }
            }
        }
        self.pending.remove_if(&user_id, |_, pending| pending.is_empty());
        taken
    }

    /// Drop a pending pairing without it having been observed
    pub fn withdraw(&self, user_id: UserId, role_id: RoleId) -> bool {
        let removed = self
            .pending
            .get_mut(&user_id)
            .is_some_and(|mut pending| pending.remove(&role_id));
        self.pending.remove_if(&user_id, |_, pending| pending.is_empty());
        removed
    }

    #[must_use]
    pub fn is_pending(&self, user_id: UserId, role_id: RoleId) -> bool {
        self.pending
            .get(&user_id)
            .is_some_and(|pending| pending.contains(&role_id))
    }

    /// Number of users with at least one pending pairing
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const USER: UserId = UserId::new(100);
    const R1: RoleId = RoleId::new(1);
    const R2: RoleId = RoleId::new(2);
    const R3: RoleId = RoleId::new(3);

    #[test]
    fn test_take_matching_consumes_once() {
        let registry = SuppressionRegistry::new();
        registry.suppress_once(USER, R1);

        assert_eq!(registry.take_matching(USER, &[R1, R2]), vec![R1]);
        assert!(!registry.is_pending(USER, R1));
        assert!(registry.take_matching(USER, &[R1]).is_empty());
    }

    #[test]
    fn test_unmatched_roles_stay_pending() {
        let registry = SuppressionRegistry::new();
        registry.suppress_all(USER, [R1, R3]);

        assert_eq!(registry.take_matching(USER, &[R1, R2]), vec![R1]);
        assert!(registry.is_pending(USER, R3));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_user_entries_are_removed() {
        let registry = SuppressionRegistry::new();
        registry.suppress_once(USER, R1);
        registry.take_matching(USER, &[R1]);
        assert!(registry.is_empty());

        registry.suppress_once(USER, R2);
        assert!(registry.withdraw(USER, R2));
        assert!(!registry.withdraw(USER, R2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_other_users_are_untouched() {
        let registry = SuppressionRegistry::new();
        let other = UserId::new(200);
        registry.suppress_once(other, R1);

        assert!(registry.take_matching(USER, &[R1]).is_empty());
        assert!(registry.is_pending(other, R1));
    }

    #[test]
    fn test_racing_consumers_take_each_pairing_once() {
        let registry = Arc::new(SuppressionRegistry::new());
        let roles: Vec<RoleId> = (1..=64).map(RoleId::new).collect();
        registry.suppress_all(USER, roles.iter().copied());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let roles = roles.clone();
                std::thread::spawn(move || registry.take_matching(USER, &roles))
            })
            .collect();

        let mut taken: Vec<RoleId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        taken.sort();
        assert_eq!(taken, roles);
        assert!(registry.is_empty());
    }
}
