//! Lazy dataset bindings.
//!
//! A [`Connect`] names a dataset without connecting to it. It is read in one
//! of two ways:
//!
//! - [`Connect::describe`], the job-definition view: a fresh, unresolved
//!   binding carrying only the reference. Nothing is resolved.
//! - [`Connect::resolve`], the job-instance view: the connection cached for
//!   this binding in the instance's [`ConnectionCache`], resolved on first
//!   read.
//!
//! Outside a job, [`Connect::connection`] and [`Connect::data`] resolve once
//! and keep the connection for the binding's lifetime.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;

use crate::cache::ConnectionCache;
use crate::error::Result;
use crate::factory::ConnectorRegistry;
use crate::params::{AccessMode, ConnectParams};
use crate::stream::RecordStream;
use crate::{Connector, EngineParams};

/// Identity of one binding, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

/// A resolved dataset: the connector plus where it came from.
pub struct Connection {
    engine_url: String,
    uses_dataset_discovery: bool,
    connector: Box<dyn Connector>,
}

impl Connection {
    pub(crate) fn new(
        engine_url: String,
        connector: Box<dyn Connector>,
        uses_dataset_discovery: bool,
    ) -> Self {
        Self {
            engine_url,
            uses_dataset_discovery,
            connector,
        }
    }

    pub fn engine_url(&self) -> &str {
        &self.engine_url
    }

    /// Whether the engine URL came from a catalogue lookup. Such datasets
    /// need their `engine_params` recorded to replay a run.
    pub fn uses_dataset_discovery(&self) -> bool {
        self.uses_dataset_discovery
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }
}

impl Deref for Connection {
    type Target = dyn Connector;

    fn deref(&self) -> &Self::Target {
        self.connector.as_ref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("engine_url", &self.engine_url)
            .field("uses_dataset_discovery", &self.uses_dataset_discovery)
            .field("connector", &self.connector)
            .finish()
    }
}

/// A declared binding to a dataset.
pub struct Connect {
    id: BindingId,
    params: ConnectParams,
    registry: Arc<ConnectorRegistry>,
    local: Mutex<Option<Arc<Connection>>>,
}

impl Connect {
    /// Bind with full parameters, resolving through the shared registry.
    pub fn new(params: ConnectParams) -> Self {
        Self::with_registry(params, ConnectorRegistry::shared())
    }

    pub fn with_registry(params: ConnectParams, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            id: BindingId::next(),
            params,
            registry,
            local: Mutex::new(None),
        }
    }

    /// Bind directly to an engine URL.
    pub fn engine_url(url: impl Into<String>) -> Self {
        Self::new(ConnectParams::engine_url(url))
    }

    /// Bind to a named dataset whose engine URL is discovered.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(ConnectParams::reference(name))
    }

    /// Add a relayed option. Only valid while declaring the binding.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.options.insert(key.into(), value.into());
        self
    }

    pub fn access(mut self, access: AccessMode) -> Self {
        self.params.access = access;
        self
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn reference_name(&self) -> Option<&str> {
        self.params.reference.as_deref()
    }

    /// The definition-level view: a new, unresolved binding that only knows
    /// the reference. Never connects.
    pub fn describe(&self) -> Connect {
        let params = ConnectParams {
            reference: self.params.reference.clone(),
            ..Default::default()
        };
        Self::with_registry(params, self.registry.clone())
    }

    /// Re-parameterize. Returns a new binding with its own identity; nothing
    /// resolved or cached for `self` carries over.
    pub fn overlay(&self, params: ConnectParams) -> Connect {
        Self::with_registry(params, self.registry.clone())
    }

    /// The instance-level view: the connection cached under this binding in
    /// `cache`, resolved on first access.
    pub fn resolve(&self, cache: &ConnectionCache) -> Result<Arc<Connection>> {
        cache.get_or_resolve(self.id, &self.params)
    }

    /// Standalone use: resolve once through this binding's registry and keep
    /// the connection.
    pub fn connection(&self) -> Result<Arc<Connection>> {
        let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(connection) = local.as_ref() {
            return Ok(connection.clone());
        }
        let connection = Arc::new(self.registry.resolve(&self.params)?);
        *local = Some(connection.clone());
        Ok(connection)
    }

    pub async fn data(&self) -> Result<RecordStream> {
        self.connection()?.data().await
    }

    pub async fn schema(&self) -> Result<SchemaRef> {
        self.connection()?.schema().await
    }

    pub async fn len(&self) -> Result<usize> {
        self.connection()?.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.connection()?.is_empty().await
    }

    pub fn engine_params(&self) -> Result<EngineParams> {
        Ok(self.connection()?.engine_params())
    }
}

impl fmt::Debug for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connect")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_standalone_data() {
        let c = Connect::engine_url("fake://MyDataset");
        let records: Vec<_> = c.data().await.unwrap().try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("fake").unwrap(), &json!("data"));
    }

    #[test]
    fn test_standalone_connection_is_memoised() {
        let c = Connect::engine_url("fake://MyDataset");
        let first = c.connection().unwrap();
        let second = c.connection().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_spare_options_fail_only_when_resolved() {
        let c = Connect::engine_url("fake://foo").option("doesntexist", "oh dear");
        assert!(matches!(
            c.connection(),
            Err(ConnectorError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_describe_returns_fresh_unresolved_bindings() {
        let c = Connect::reference("Deadly Animals").option("credentials", "secret");
        let copy_0 = c.describe();
        let copy_1 = c.describe();

        assert_ne!(copy_0.id(), copy_1.id());
        assert_ne!(copy_0.id(), c.id());
        assert_eq!(copy_0.reference_name(), Some("Deadly Animals"));
        assert!(copy_0.params().engine_url.is_none());
        assert!(copy_0.params().options.is_empty());
    }

    #[test]
    fn test_overlay_is_a_new_binding() {
        let c = Connect::engine_url("fake://old");
        let old = c.connection().unwrap();

        let fresh = c.overlay(ConnectParams::engine_url("fake://new"));
        assert_ne!(fresh.id(), c.id());
        let new = fresh.connection().unwrap();
        assert_eq!(new.engine_url(), "fake://new");
        assert_eq!(old.engine_url(), "fake://old");
    }

    #[test]
    fn test_failed_resolution_is_not_cached() {
        let c = Connect::engine_url("carrier-pigeon://nowhere");
        for _ in 0..2 {
            assert!(matches!(
                c.connection(),
                Err(ConnectorError::UnknownEngine(_))
            ));
        }
    }
}
