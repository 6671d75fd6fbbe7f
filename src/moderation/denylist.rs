//! Scam link denylist
//!
//! The cache holds an immutable [`DenylistSnapshot`] behind a single handle.
//! A refresh builds a complete new snapshot off to the side and swaps the
//! handle, so a reader sees either the old set or the new set, never a mix.

use crate::EVENT_TARGET;
use crate::moderation::ports::DenylistSource;
use crate::moderation::{ModerationError, ModerationResult};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info};

/// Default public scam link feed
pub const DEFAULT_DENYLIST_URL: &str = "https://phish.sinking.yachts/v2/all";

/// Fragments of legitimate hosts that appear in the public feed
pub const DEFAULT_EXCLUDED_FRAGMENTS: &[&str] = &["discordapp.co"];

/// One immutable generation of the denylist
#[derive(Debug, Default)]
pub struct DenylistSnapshot {
    entries: HashSet<String>,
    version: u64,
    refreshed_at: Option<DateTime<Utc>>,
}

impl DenylistSnapshot {
    /// Check an already-lowercased text against every entry
    #[must_use]
    pub fn matches(&self, lowercase_text: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| lowercase_text.contains(entry.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of successful refreshes that produced this snapshot
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

/// Periodically-refreshed set of malicious URL fragments
pub struct LinkDenylistCache {
    current: RwLock<Arc<DenylistSnapshot>>,
    source: Arc<dyn DenylistSource>,
    excluded_fragments: Vec<String>,
}

impl LinkDenylistCache {
    /// Create an empty cache; nothing matches until the first refresh
    pub fn new(source: Arc<dyn DenylistSource>, excluded_fragments: Vec<String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(DenylistSnapshot::default())),
            source,
            excluded_fragments: excluded_fragments
                .into_iter()
                .map(|fragment| fragment.to_lowercase())
                .collect(),
        }
    }

    /// The snapshot currently in effect
    #[must_use]
    pub fn snapshot(&self) -> Arc<DenylistSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A writer only ever replaces the Arc, so the value is always whole
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Case-insensitive substring scan of `text` against the current snapshot
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.snapshot().matches(&text.to_lowercase())
    }

    /// Fetch the full list and replace the current snapshot.
    ///
    /// Returns the number of entries now in effect. On failure the previous
    /// snapshot is kept.
    ///
    /// # Errors
    ///
    /// Returns the source's error if the list could not be fetched or parsed.
    pub async fn refresh(&self) -> ModerationResult<usize> {
        debug!(target: EVENT_TARGET, "Refreshing scam link denylist");

        let fetched = self.source.fetch_denylist().await?;
        let entries: HashSet<String> = fetched
            .into_iter()
            .map(|entry| entry.trim().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .filter(|entry| {
                !self
                    .excluded_fragments
                    .iter()
                    .any(|fragment| entry.contains(fragment.as_str()))
            })
            .collect();
        let count = entries.len();

        let mut guard = self
            .current
            .write()
            .map_err(|_| ModerationError::Other("Denylist lock poisoned".to_string()))?;
        let next = DenylistSnapshot {
            entries,
            version: guard.version + 1,
            refreshed_at: Some(Utc::now()),
        };
        *guard = Arc::new(next);
        drop(guard);

        info!(
            target: EVENT_TARGET,
            entries = count,
            event = "denylist_refreshed",
            "Scam link denylist refreshed"
        );
        Ok(count)
    }

    /// Populate the cache on a dedicated task.
    ///
    /// With `interval` set the task keeps refreshing on that period; without it
    /// the task exits after the first attempt. Failures are logged and not
    /// retried until the next tick.
    pub fn spawn_refresh_task(self: Arc<Self>, interval: Option<Duration>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Some(period) = interval else {
                if let Err(e) = self.refresh().await {
                    error!(target: EVENT_TARGET, "Error while setting up scam links: {e}");
                }
                return;
            };

            info!(
                target: EVENT_TARGET,
                "Starting denylist refresh task with {}s interval",
                period.as_secs()
            );
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    error!(target: EVENT_TARGET, "Error while refreshing scam links: {e}");
                }
            }
        })
    }
}

/// [`DenylistSource`] that downloads a JSON array of strings over HTTP
pub struct HttpDenylistSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDenylistSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl DenylistSource for HttpDenylistSource {
    async fn fetch_denylist(&self) -> ModerationResult<Vec<String>> {
        debug!(target: EVENT_TARGET, "Receiving scam link data from {}", self.url);
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str::<Vec<String>>(&body)?)
    }
}
