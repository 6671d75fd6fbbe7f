use std::{ops::Deref, sync::Arc};

use crate::config::BotConfig;
use crate::moderation::backend::SerenityBackend;
use crate::moderation::denylist::{HttpDenylistSource, LinkDenylistCache};
use crate::moderation::ports::DenylistSource;
use crate::moderation::store::YamlRoleStore;
use crate::moderation::suppression::SuppressionRegistry;
use crate::moderation::{Collaborators, ModerationEngine, ModerationResult};
use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;

/// Shared state, reachable from commands and the event handler
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Stored in serenity's data map so the event handler can reach it
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("denylist", &self.denylist.snapshot())
            .field("suppressions", &self.suppressions)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(inner: DataInner) -> Self {
        Self(Arc::new(inner))
    }
}

pub struct DataInner {
    pub config: BotConfig,
    // Scam URL fragments, swapped wholesale on refresh
    pub denylist: Arc<LinkDenylistCache>,
    // Pending role grants that must not be attributed
    pub suppressions: Arc<SuppressionRegistry>,
    // Departure snapshots and join records
    pub store: Arc<YamlRoleStore>,
    pub engine: Arc<ModerationEngine>,
}

impl DataInner {
    #[must_use]
    pub fn new(
        config: BotConfig,
        source: Arc<dyn DenylistSource>,
        store: Arc<YamlRoleStore>,
        backend: SerenityBackend,
    ) -> Self {
        let denylist = Arc::new(LinkDenylistCache::new(
            source,
            config.denylist.excluded_fragments.clone(),
        ));
        let suppressions = Arc::new(SuppressionRegistry::new());
        let engine = ModerationEngine::new(
            &config,
            denylist.clone(),
            suppressions.clone(),
            Collaborators::serenity(backend, store.clone()),
        );

        Self {
            config,
            denylist,
            suppressions,
            store,
            engine: Arc::new(engine),
        }
    }

    /// Load persisted state and connect the engine to Discord.
    ///
    /// The denylist starts empty; call [`LinkDenylistCache::spawn_refresh_task`]
    /// to populate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the role store exists but cannot be read.
    pub async fn load(config: BotConfig, http: Arc<serenity::Http>) -> ModerationResult<Self> {
        let store = Arc::new(YamlRoleStore::load(&config.data_dir).await?);
        let source = Arc::new(HttpDenylistSource::new(config.denylist.url.clone()));
        let backend = SerenityBackend::new(http, config.channels.clone());
        Ok(Self::new(config, source, store, backend))
    }
}
