//! Collection registry - one router per logical collection name

use std::collections::HashMap;
use std::sync::Arc;

use docroute_core::{ClusterConfig, RouterResult};
use parking_lot::RwLock;
use tracing::info;

use crate::collection::Collection;
use crate::connection::ConnectionProvider;

/// Builds collection routers on first use and caches them by name
pub struct CollectionRegistry {
    config: ClusterConfig,
    provider: Arc<dyn ConnectionProvider>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl CollectionRegistry {
    /// Create a registry; the configuration is validated up front
    pub fn new(config: ClusterConfig, provider: Arc<dyn ConnectionProvider>) -> RouterResult<Self> {
        config.validate()?;
        info!(
            master = %config.master.address,
            slaves = config.slaves.len(),
            max_successive_reads = config.max_successive_reads,
            provider = provider.name(),
            "Collection registry created"
        );

        Ok(Self {
            config,
            provider,
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Router for `name`, created on first request
    pub fn collection(&self, name: &str) -> RouterResult<Arc<Collection>> {
        if let Some(collection) = self.collections.read().get(name) {
            return Ok(collection.clone());
        }

        let mut collections = self.collections.write();
        // Another caller may have created it between the two locks
        if let Some(collection) = collections.get(name) {
            return Ok(collection.clone());
        }

        let collection = Arc::new(Collection::new(name, &self.config, self.provider.clone())?);
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Names of the collections created so far, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.collections.read().len()
    }
}
