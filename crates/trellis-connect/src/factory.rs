//! Connector factory: pluggable connector construction by engine URL scheme.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use crate::bigquery::BigQueryConnector;
use crate::catalogue::{Catalogue, NoCatalogue};
use crate::config::ConnectConfig;
use crate::connect::Connection;
use crate::error::{ConnectorError, Result};
use crate::fake::FakeDataConnector;
use crate::flowerpot::FlowerPotConnector;
use crate::kafka::KafkaConnector;
use crate::object_flowerpot::{ObjectFlowerPotConnector, StoreKind};
use crate::params::{split_scheme, ConnectParams};
use crate::Connector;

/// Builds connectors for one engine URL scheme.
pub trait ConnectorFactory: Send + Sync {
    /// The scheme tag this factory handles, including `://` (e.g. `"fake://"`).
    fn scheme(&self) -> &'static str;

    /// Build a connector. Construction must not do I/O; connectors connect
    /// on first read.
    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>>;
}

/// Ordered table of connector factories, plus the catalogue used to discover
/// engine URLs for reference-only bindings.
pub struct ConnectorRegistry {
    factories: Vec<Arc<dyn ConnectorFactory>>,
    catalogue: Arc<dyn Catalogue>,
    config: ConnectConfig,
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("schemes", &self.schemes())
            .field("config", &self.config)
            .finish()
    }
}

impl ConnectorRegistry {
    /// A registry with no factories, no catalogue and default configuration.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
            catalogue: Arc::new(NoCatalogue),
            config: ConnectConfig::default(),
        }
    }

    /// Build a registry from factories. Scheme tags must be unique.
    pub fn new(factories: Vec<Arc<dyn ConnectorFactory>>) -> Result<Self> {
        let mut registry = Self::empty();
        for factory in factories {
            registry.register(factory)?;
        }
        Ok(registry)
    }

    pub fn with_catalogue(mut self, catalogue: Arc<dyn Catalogue>) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn with_config(mut self, config: ConnectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Registered scheme tags, in registration order.
    pub fn schemes(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.scheme()).collect()
    }

    /// Add a factory. Fails if its scheme tag is already taken.
    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) -> Result<()> {
        let scheme = factory.scheme();
        if self.factories.iter().any(|f| f.scheme() == scheme) {
            return Err(ConnectorError::Config(format!(
                "scheme '{}' is already registered",
                scheme
            )));
        }
        self.factories.push(factory);
        Ok(())
    }

    /// The engine URL for `params`: given directly, or discovered through
    /// the catalogue from the reference.
    pub fn engine_url(&self, params: &ConnectParams) -> Result<String> {
        match (&params.engine_url, &params.reference) {
            (Some(url), _) => Ok(url.clone()),
            (None, Some(reference)) => self.catalogue.lookup(reference),
            (None, None) => Err(ConnectorError::Unresolvable(
                "binding has neither an engine_url nor a reference".to_string(),
            )),
        }
    }

    /// Resolve binding parameters into a connection.
    ///
    /// The first factory whose scheme tag equals the engine URL's scheme
    /// exactly builds the connector. Nothing is constructed when no factory
    /// matches.
    pub fn resolve(&self, params: &ConnectParams) -> Result<Connection> {
        let engine_url = self.engine_url(params)?;
        let (scheme, _) = split_scheme(&engine_url)
            .ok_or_else(|| ConnectorError::UnknownEngine(engine_url.clone()))?;
        let factory = self
            .factories
            .iter()
            .find(|f| f.scheme() == scheme)
            .ok_or_else(|| ConnectorError::UnknownEngine(engine_url.clone()))?;

        let connector = factory.build(&engine_url, params, &self.config)?;
        info!("Resolved dataset '{}' with {} connector", engine_url, scheme);
        Ok(Connection::new(
            engine_url,
            connector,
            params.reference.is_some(),
        ))
    }

    /// The built-in connectors, configured from `TRELLIS_*` variables.
    pub fn from_env() -> Result<Self> {
        Ok(default_registry().with_config(ConnectConfig::from_env()?))
    }

    /// Process-wide registry, built by [`ConnectorRegistry::from_env`] on
    /// first use. Fails on an invalid environment; a later call retries.
    pub fn try_shared() -> Result<Arc<ConnectorRegistry>> {
        if let Some(registry) = SHARED.get() {
            return Ok(registry.clone());
        }
        let registry = Arc::new(Self::from_env()?);
        Ok(SHARED.get_or_init(|| registry).clone())
    }

    /// Like [`ConnectorRegistry::try_shared`], but an invalid environment
    /// falls back to the default configuration with a warning.
    pub fn shared() -> Arc<ConnectorRegistry> {
        Self::try_shared().unwrap_or_else(|e| {
            warn!("Ignoring connector environment config: {}", e);
            SHARED
                .get_or_init(|| Arc::new(default_registry()))
                .clone()
        })
    }
}

static SHARED: OnceLock<Arc<ConnectorRegistry>> = OnceLock::new();

// ---------------------------------------------------------------------------
// Built-in factory implementations
// ---------------------------------------------------------------------------

/// Factory for the in-memory fake dataset.
pub struct FakeFactory;

impl ConnectorFactory for FakeFactory {
    fn scheme(&self) -> &'static str {
        "fake://"
    }

    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        _config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(FakeDataConnector::new(engine_url, params)?))
    }
}

/// Factory for flowerpot archives on the local filesystem.
pub struct FlowerPotFactory;

impl ConnectorFactory for FlowerPotFactory {
    fn scheme(&self) -> &'static str {
        "flowerpot://"
    }

    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(FlowerPotConnector::new(engine_url, params, config)?))
    }
}

/// Factory for flowerpot archives in Google Cloud Storage.
pub struct GcsFlowerPotFactory;

impl ConnectorFactory for GcsFlowerPotFactory {
    fn scheme(&self) -> &'static str {
        "gs+flowerpot://"
    }

    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(ObjectFlowerPotConnector::new(
            StoreKind::Gcs,
            engine_url,
            params,
            config,
        )?))
    }
}

/// Factory for flowerpot archives in S3-compatible storage.
pub struct S3FlowerPotFactory;

impl ConnectorFactory for S3FlowerPotFactory {
    fn scheme(&self) -> &'static str {
        "s3+flowerpot://"
    }

    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(ObjectFlowerPotConnector::new(
            StoreKind::S3,
            engine_url,
            params,
            config,
        )?))
    }
}

/// Factory for time windows of Kafka topics.
pub struct KafkaFactory;

impl ConnectorFactory for KafkaFactory {
    fn scheme(&self) -> &'static str {
        "kafka://"
    }

    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(KafkaConnector::new(engine_url, params, config)?))
    }
}

/// Factory for BigQuery tables.
pub struct BigQueryFactory;

impl ConnectorFactory for BigQueryFactory {
    fn scheme(&self) -> &'static str {
        "bigquery://"
    }

    fn build(
        &self,
        engine_url: &str,
        params: &ConnectParams,
        _config: &ConnectConfig,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(BigQueryConnector::new(engine_url, params)?))
    }
}

fn builtin_factories() -> Vec<Arc<dyn ConnectorFactory>> {
    vec![
        Arc::new(BigQueryFactory),
        Arc::new(FlowerPotFactory),
        Arc::new(GcsFlowerPotFactory),
        Arc::new(S3FlowerPotFactory),
        Arc::new(FakeFactory),
        Arc::new(KafkaFactory),
    ]
}

/// Build the default registry with all built-in factories.
///
/// Built-in scheme tags are distinct (checked in tests), so the factories
/// go in without the duplicate check of [`ConnectorRegistry::register`].
pub fn default_registry() -> ConnectorRegistry {
    ConnectorRegistry {
        factories: builtin_factories(),
        ..ConnectorRegistry::empty()
    }
}
