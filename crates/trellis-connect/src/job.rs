//! Job definitions and job instances.
//!
//! A [`JobDefinition`] declares the datasets a job reads and writes. Each run
//! of the job is a [`JobInstance`] with its own [`ConnectionCache`]: datasets
//! read through one instance are resolved once and shared, while two
//! instances never share a connector.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::cache::ConnectionCache;
use crate::connect::{Connect, Connection};
use crate::error::{ConnectorError, Result};
use crate::factory::ConnectorRegistry;
use crate::params::ConnectParams;
use crate::EngineParams;

/// Named dataset bindings of one job.
#[derive(Debug)]
pub struct JobDefinition {
    name: String,
    bindings: BTreeMap<String, Connect>,
    registry: Arc<ConnectorRegistry>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, ConnectorRegistry::shared())
    }

    pub fn with_registry(name: impl Into<String>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            name: name.into(),
            bindings: BTreeMap::new(),
            registry,
        }
    }

    /// Declare a dataset. Declaring never connects.
    pub fn dataset(mut self, name: impl Into<String>, params: ConnectParams) -> Self {
        let binding = Connect::with_registry(params, self.registry.clone());
        self.bindings.insert(name.into(), binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn binding(&self, name: &str) -> Result<&Connect> {
        self.bindings
            .get(name)
            .ok_or_else(|| ConnectorError::UnknownDataset(name.to_string()))
    }

    /// The definition-level view of a dataset: an unresolved binding that
    /// only carries the reference.
    pub fn describe(&self, name: &str) -> Result<Connect> {
        Ok(self.binding(name)?.describe())
    }

    /// Replace a dataset's parameters. The dataset gets a new binding, so
    /// instances created afterwards resolve it afresh.
    pub fn overlay(&mut self, name: &str, params: ConnectParams) -> Result<()> {
        let fresh = self.binding(name)?.overlay(params);
        self.bindings.insert(name.to_string(), fresh);
        Ok(())
    }

    /// Start a run with an empty connection cache.
    pub fn instantiate(self: &Arc<Self>) -> JobInstance {
        info!("Starting instance of job '{}'", self.name);
        JobInstance {
            definition: self.clone(),
            cache: ConnectionCache::new(self.registry.clone()),
        }
    }
}

/// One run of a job.
#[derive(Debug)]
pub struct JobInstance {
    definition: Arc<JobDefinition>,
    cache: ConnectionCache,
}

impl JobInstance {
    pub fn definition(&self) -> &Arc<JobDefinition> {
        &self.definition
    }

    /// The connection for a dataset, resolved on first access and shared by
    /// every later access through this instance.
    pub fn dataset(&self, name: &str) -> Result<Arc<Connection>> {
        self.definition.binding(name)?.resolve(&self.cache)
    }

    /// Every declared dataset, resolved.
    pub fn datasets(&self) -> Result<BTreeMap<String, Arc<Connection>>> {
        self.definition
            .bindings
            .iter()
            .map(|(name, binding)| Ok((name.clone(), binding.resolve(&self.cache)?)))
            .collect()
    }

    pub fn describe(&self, name: &str) -> Result<Connect> {
        self.definition.describe(name)
    }

    /// Engine parameters of the datasets resolved so far that were found
    /// through the catalogue, keyed by dataset name. These are what a replay
    /// of this run needs pinned.
    pub fn discovered_engine_params(&self) -> BTreeMap<String, EngineParams> {
        self.definition
            .bindings
            .iter()
            .filter_map(|(name, binding)| {
                let connection = self.cache.get(binding.id())?;
                connection
                    .uses_dataset_discovery()
                    .then(|| (name.clone(), connection.engine_params()))
            })
            .collect()
    }

    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::Catalogue;
    use crate::factory::default_registry;
    use futures::TryStreamExt;

    fn job() -> Arc<JobDefinition> {
        Arc::new(
            JobDefinition::with_registry("bugs", Arc::new(default_registry()))
                .dataset("bugs", ConnectParams::engine_url("fake://bugsDB"))
                .dataset("pigeons", ConnectParams::engine_url("carrier-pigeon://nowhere")),
        )
    }

    #[test]
    fn test_same_instance_shares_connection() {
        let job = job();
        let instance = job.instantiate();
        let first = instance.dataset("bugs").unwrap();
        let second = instance.dataset("bugs").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(instance.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_instances_do_not_share_connections() {
        let job = job();
        let a = job.instantiate().dataset("bugs").unwrap();
        let b = job.instantiate().dataset("bugs").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        let a_data: Vec<_> = a.data().await.unwrap().try_collect().await.unwrap();
        let b_data: Vec<_> = b.data().await.unwrap().try_collect().await.unwrap();
        assert_eq!(a_data, b_data);
    }

    #[test]
    fn test_unknown_engine_fails_on_access_only() {
        let job = job();
        let instance = job.instantiate();
        assert!(matches!(
            instance.dataset("pigeons"),
            Err(ConnectorError::UnknownEngine(_))
        ));
        assert!(instance.cache().is_empty());
        assert!(instance.datasets().is_err());
    }

    #[test]
    fn test_unknown_dataset_name() {
        let instance = job().instantiate();
        assert!(matches!(
            instance.dataset("nope"),
            Err(ConnectorError::UnknownDataset(ref n)) if n == "nope"
        ));
    }

    #[test]
    fn test_describe_does_not_resolve() {
        let instance = job().instantiate();
        let described = instance.describe("pigeons").unwrap();
        assert!(described.params().engine_url.is_none());
        assert!(instance.cache().is_empty());
    }

    #[test]
    fn test_overlay_replaces_binding() {
        let mut job = JobDefinition::with_registry("bugs", Arc::new(default_registry()))
            .dataset("pigeons", ConnectParams::engine_url("carrier-pigeon://nowhere"));
        let before = job.binding("pigeons").unwrap().id();
        job.overlay("pigeons", ConnectParams::engine_url("fake://bugsDB"))
            .unwrap();
        assert_ne!(job.binding("pigeons").unwrap().id(), before);

        let job = Arc::new(job);
        let connection = job.instantiate().dataset("pigeons").unwrap();
        assert_eq!(connection.engine_url(), "fake://bugsDB");
    }

    struct OneEntry;

    impl Catalogue for OneEntry {
        fn lookup(&self, reference: &str) -> Result<String> {
            match reference {
                "Deadly Animals" => Ok("fake://example.com/abc".to_string()),
                other => Err(ConnectorError::Unresolvable(other.to_string())),
            }
        }
    }

    #[test]
    fn test_discovered_engine_params() {
        let registry = Arc::new(default_registry().with_catalogue(Arc::new(OneEntry)));
        let job = Arc::new(
            JobDefinition::with_registry("zoo", registry)
                .dataset("animals", ConnectParams::reference("Deadly Animals"))
                .dataset("bugs", ConnectParams::engine_url("fake://bugsDB")),
        );
        let instance = job.instantiate();
        assert!(instance.discovered_engine_params().is_empty());

        instance.datasets().unwrap();
        let pinned = instance.discovered_engine_params();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned["animals"]["engine_url"], "fake://example.com/abc");
    }
}
