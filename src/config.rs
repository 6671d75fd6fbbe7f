//! Bot configuration
//!
//! Loaded once at startup from a YAML file. A missing file yields the
//! defaults so the bot can come up with every log channel disabled.

use crate::moderation::denylist::{DEFAULT_DENYLIST_URL, DEFAULT_EXCLUDED_FRAGMENTS};
use crate::moderation::departure::RetentionWindow;
use crate::moderation::log_entry::LogChannel;
use crate::moderation::{ModerationError, ModerationResult};
use poise::serenity_prelude::{ChannelId, GuildId, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "SENTINEL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "data/bot_config.yaml";

/// Channel IDs for each log destination. Zero or absent disables a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub important: Option<u64>,
    pub requests_deletion: Option<u64>,
    pub basic: Option<u64>,
    /// Channel swept when a member leaves
    pub requests: Option<u64>,
}

fn channel(id: Option<u64>) -> Option<ChannelId> {
    id.filter(|id| *id != 0).map(ChannelId::new)
}

impl ChannelsConfig {
    #[must_use]
    pub fn log_channel(&self, channel_kind: LogChannel) -> Option<ChannelId> {
        match channel_kind {
            LogChannel::Important => channel(self.important),
            LogChannel::RequestsDeletion => channel(self.requests_deletion),
            LogChannel::Basic => channel(self.basic),
        }
    }

    #[must_use]
    pub fn requests_channel(&self) -> Option<ChannelId> {
        channel(self.requests)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenylistConfig {
    pub url: String,
    /// Entries containing any of these are dropped on refresh
    pub excluded_fragments: Vec<String>,
    /// 0 populates the list once at startup
    pub refresh_interval_hours: u64,
}

impl Default for DenylistConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DENYLIST_URL.to_string(),
            excluded_fragments: DEFAULT_EXCLUDED_FRAGMENTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            refresh_interval_hours: 0,
        }
    }
}

impl DenylistConfig {
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_hours > 0)
            .then(|| Duration::from_secs(self.refresh_interval_hours * 3600))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The monitored guild
    pub guild_id: u64,
    pub channels: ChannelsConfig,
    pub request_leave_deletion_hours: RetentionWindow,
    /// Reaction roles members grant themselves
    pub self_assignable_roles: Vec<u64>,
    pub denylist: DenylistConfig,
    /// Where role snapshots and join records are persisted
    pub data_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            guild_id: 0,
            channels: ChannelsConfig::default(),
            request_leave_deletion_hours: RetentionWindow(0),
            self_assignable_roles: Vec::new(),
            denylist: DenylistConfig::default(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl BotConfig {
    #[must_use]
    pub fn guild(&self) -> GuildId {
        // GuildId::new panics on zero
        GuildId::new(self.guild_id.max(1))
    }

    #[must_use]
    pub fn self_assignable(&self) -> HashSet<RoleId> {
        self.self_assignable_roles
            .iter()
            .filter(|id| **id != 0)
            .map(|id| RoleId::new(*id))
            .collect()
    }

    /// Parse a configuration document
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the guild is unset.
    pub fn from_yaml(content: &str) -> ModerationResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        if config.guild_id == 0 {
            return Err(ModerationError::Config("guild_id must be set".to_string()));
        }
        Ok(config)
    }

    /// Load from `path`, returning defaults if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_from(path: impl AsRef<Path>) -> ModerationResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from `SENTINEL_CONFIG` or the default location
    ///
    /// # Errors
    ///
    /// See [`BotConfig::load_from`].
    pub async fn load() -> ModerationResult<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
guild_id: 100
channels:
  important: 1
  requests_deletion: 2
  basic: 3
  requests: 4
request_leave_deletion_hours: 6
self_assignable_roles: [10, 11]
denylist:
  url: https://example.invalid/list
  excluded_fragments: []
  refresh_interval_hours: 12
data_dir: /var/lib/sentinel
";
        let config = BotConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.guild(), GuildId::new(100));
        assert_eq!(
            config.channels.log_channel(LogChannel::RequestsDeletion),
            Some(ChannelId::new(2))
        );
        assert_eq!(config.channels.requests_channel(), Some(ChannelId::new(4)));
        assert_eq!(config.request_leave_deletion_hours, RetentionWindow(6));
        assert!(config.self_assignable().contains(&RoleId::new(11)));
        assert_eq!(
            config.denylist.refresh_interval(),
            Some(Duration::from_secs(12 * 3600))
        );
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/sentinel"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = BotConfig::from_yaml("guild_id: 5\nchannels:\n  basic: 0\n").unwrap();
        assert_eq!(config.channels.log_channel(LogChannel::Basic), None);
        assert_eq!(config.denylist.url, DEFAULT_DENYLIST_URL);
        assert_eq!(config.denylist.excluded_fragments, vec!["discordapp.co"]);
        assert_eq!(config.denylist.refresh_interval(), None);
        assert!(!config.request_leave_deletion_hours.is_enabled());
    }

    #[test]
    fn test_missing_guild_is_rejected() {
        let err = BotConfig::from_yaml("channels: {}\n").unwrap_err();
        assert!(matches!(err, ModerationError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BotConfig::load_from(dir.path().join("absent.yaml")).await.unwrap();
        assert_eq!(config, BotConfig::default());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_config.yaml");
        tokio::fs::write(&path, "guild_id: 42\n").await.unwrap();
        let config = BotConfig::load_from(&path).await.unwrap();
        assert_eq!(config.guild_id, 42);
    }
}
