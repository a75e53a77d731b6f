//! Trellis Connect - dataset bindings for ETL jobs
//!
//! A job declares named [`Connect`] bindings, each pointing at a dataset by
//! engine URL (`scheme://...`). Reading a binding through a job instance
//! resolves it into a connector via the [`ConnectorRegistry`] and caches it,
//! one connector per binding per instance.
//!
//! Built-in engines:
//! - `fake://` - fixed in-memory data for tests
//! - `flowerpot://` - local archive of JSON-lines files
//! - `gs+flowerpot://`, `s3+flowerpot://` - the same archives in object storage
//! - `kafka://` - a time window of a Kafka topic
//! - `bigquery://` - BigQuery table parameters (stub)

pub mod archive;
pub mod bigquery;
pub mod cache;
pub mod catalogue;
pub mod config;
pub mod connect;
pub mod error;
pub mod factory;
pub mod fake;
pub mod flowerpot;
pub mod job;
pub mod kafka;
pub mod object_flowerpot;
pub mod params;
pub mod record;
pub mod store;
mod stream;

use std::collections::{BTreeMap, BTreeSet};

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;

pub use archive::{logical_table, ArchiveEngine};
pub use bigquery::BigQueryConnector;
pub use cache::ConnectionCache;
pub use catalogue::{Catalogue, NoCatalogue};
pub use config::ConnectConfig;
pub use connect::{BindingId, Connect, Connection};
pub use error::{ConnectorError, Result};
pub use factory::{default_registry, ConnectorFactory, ConnectorRegistry};
pub use fake::FakeDataConnector;
pub use flowerpot::FlowerPotConnector;
pub use job::{JobDefinition, JobInstance};
pub use kafka::{KafkaConnector, PartitionWindow};
pub use object_flowerpot::ObjectFlowerPotConnector;
pub use params::{AccessMode, ConnectParams};
pub use record::{decode_ndjson, Record};
pub use stream::RecordStream;

/// Parameters safe to persist for replaying a run. Never holds secrets.
pub type EngineParams = BTreeMap<String, String>;

/// Capabilities every dataset connector offers.
///
/// Only [`Connector::data`] and [`Connector::engine_params`] are mandatory;
/// the other capabilities fail with [`ConnectorError::NotSupported`] unless a
/// backend defines them.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// The whole dataset as a lazy record stream. Connects to the backend on
    /// first use.
    async fn data(&self) -> Result<RecordStream>;

    /// Records of one logical table, or of everything when `table` is `None`.
    async fn query(&self, table: Option<&str>) -> Result<RecordStream> {
        let _ = table;
        Err(ConnectorError::NotSupported("query".to_string()))
    }

    /// Structural description of the dataset.
    async fn schema(&self) -> Result<SchemaRef> {
        Err(ConnectorError::NotSupported("schema".to_string()))
    }

    /// Number of records.
    async fn len(&self) -> Result<usize> {
        Err(ConnectorError::NotSupported("len".to_string()))
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Names of the logical tables [`Connector::query`] accepts.
    ///
    /// `query` matches by prefix, so when one name starts with another
    /// (`test_a` and `test_ab`) their queries overlap and a union over every
    /// table repeats the shared records.
    async fn tables(&self) -> Result<BTreeSet<String>> {
        Err(ConnectorError::NotSupported("tables".to_string()))
    }

    /// Random access to a record by key.
    async fn get(&self, key: &str) -> Result<Record> {
        let _ = key;
        Err(ConnectorError::NotSupported("keyed access".to_string()))
    }

    /// Connection parameters without secrets.
    fn engine_params(&self) -> EngineParams;
}
