//! Role snapshot store
//!
//! Departure snapshots and first-join instants live in two `DashMap`s and are
//! flushed to YAML files after every write.

use crate::moderation::ports::RoleStore;
use crate::moderation::{ModerationError, ModerationResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use poise::serenity_prelude::{RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

const ROLES_FILE: &str = "persisted_roles.yaml";
const JOINS_FILE: &str = "first_joins.yaml";

/// Roles a user held when they last left
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRoles {
    pub user_id: u64,
    pub role_ids: Vec<u64>,
}

/// Start of a user's membership as observed at departure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstJoin {
    pub user_id: u64,
    pub joined_at: DateTime<Utc>,
}

/// DashMap-backed [`RoleStore`] persisted as YAML
#[derive(Debug)]
pub struct YamlRoleStore {
    roles: DashMap<UserId, Vec<RoleId>>,
    joins: DashMap<UserId, DateTime<Utc>>,
    /// `None` keeps everything in memory
    dir: Option<PathBuf>,
    flush_lock: Mutex<()>,
}

impl YamlRoleStore {
    /// Create a store that never touches the filesystem
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            roles: DashMap::new(),
            joins: DashMap::new(),
            dir: None,
            flush_lock: Mutex::new(()),
        }
    }

    /// Load persisted state from `dir`, starting empty if the files are missing
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub async fn load(dir: impl AsRef<Path>) -> ModerationResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let store = Self {
            dir: Some(dir.clone()),
            ..Self::in_memory()
        };

        if let Some(content) = read_if_exists(&dir.join(ROLES_FILE)).await? {
            for entry in serde_yaml::from_str::<Vec<PersistedRoles>>(&content)? {
                let Some(user_id) = non_zero_user(entry.user_id) else {
                    continue;
                };
                let roles = entry
                    .role_ids
                    .into_iter()
                    .filter(|id| *id != 0)
                    .map(RoleId::new)
                    .collect();
                store.roles.insert(user_id, roles);
            }
        }

        if let Some(content) = read_if_exists(&dir.join(JOINS_FILE)).await? {
            for entry in serde_yaml::from_str::<Vec<FirstJoin>>(&content)? {
                if let Some(user_id) = non_zero_user(entry.user_id) {
                    store.joins.insert(user_id, entry.joined_at);
                }
            }
        }

        info!(
            "Loaded {} role snapshots and {} join records",
            store.roles.len(),
            store.joins.len()
        );
        Ok(store)
    }

    /// Recorded join instant for a user
    #[must_use]
    pub fn join_record(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.joins.get(&user_id).map(|entry| *entry.value())
    }

    /// Write both maps to disk
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot be written.
    pub async fn save(&self) -> ModerationResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;

        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut roles: Vec<PersistedRoles> = self
            .roles
            .iter()
            .map(|entry| PersistedRoles {
                user_id: entry.key().get(),
                role_ids: entry.value().iter().map(|role| role.get()).collect(),
            })
            .collect();
        roles.sort_by_key(|entry| entry.user_id);
        tokio::fs::write(dir.join(ROLES_FILE), serde_yaml::to_string(&roles)?).await?;

        let mut joins: Vec<FirstJoin> = self
            .joins
            .iter()
            .map(|entry| FirstJoin {
                user_id: entry.key().get(),
                joined_at: *entry.value(),
            })
            .collect();
        joins.sort_by_key(|entry| entry.user_id);
        tokio::fs::write(dir.join(JOINS_FILE), serde_yaml::to_string(&joins)?).await?;

        Ok(())
    }
}

fn non_zero_user(id: u64) -> Option<UserId> {
    (id != 0).then(|| UserId::new(id))
}

async fn read_if_exists(path: &Path) -> ModerationResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ModerationError::Storage(format!(
            "Failed to read {}: {e}",
            path.display()
        ))),
    }
}

#[async_trait::async_trait]
impl RoleStore for YamlRoleStore {
    async fn insert_role_snapshot(&self, user_id: UserId, roles: Vec<RoleId>) -> ModerationResult<()> {
        self.roles.insert(user_id, roles);
        self.save().await
    }

    async fn insert_join_record_if_absent(
        &self,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> ModerationResult<bool> {
        let inserted = match self.joins.entry(user_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(joined_at);
                true
            }
        };
        if inserted {
            self.save().await?;
        }
        Ok(inserted)
    }

    async fn role_snapshot(&self, user_id: UserId) -> ModerationResult<Option<Vec<RoleId>>> {
        Ok(self.roles.get(&user_id).map(|entry| entry.value().clone()))
    }
}
