//! `gs+flowerpot://` and `s3+flowerpot://` connectors: flowerpot archives
//! held in object storage.
//!
//! The archive object is fetched whole into memory on each read, then walked
//! by the same engine as local archives.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use crate::archive::{archive_tables, not_found, stream_archive};
use crate::config::ConnectConfig;
use crate::error::Result;
use crate::params::{require_read, ConnectParams};
use crate::record::infer_schema;
use crate::store::{build_store, parse_bucket_url};
use crate::stream::{error_stream, RecordStream};
use crate::{Connector, EngineParams};

pub use crate::store::StoreKind;

pub struct ObjectFlowerPotConnector {
    kind: StoreKind,
    engine_url: String,
    bucket: String,
    key: ObjectPath,
    credentials: Option<String>,
    config: ConnectConfig,
    store: Mutex<Option<Arc<dyn ObjectStore>>>,
}

impl ObjectFlowerPotConnector {
    /// Claims the `credentials` option (a service account key path, GCS
    /// only). The store itself is built on first read.
    pub fn new(
        kind: StoreKind,
        engine_url: &str,
        params: &ConnectParams,
        config: &ConnectConfig,
    ) -> Result<Self> {
        require_read(params.access, kind.scheme())?;
        let mut options = params.relayed_options();
        // S3 credentials come from AWS_* only.
        let credentials = match kind {
            StoreKind::Gcs => options.take("credentials"),
            StoreKind::S3 => None,
        };
        options.finish()?;

        let (bucket, key) = parse_bucket_url(kind, engine_url)?;
        Ok(Self {
            kind,
            engine_url: engine_url.to_string(),
            bucket,
            key,
            credentials,
            config: config.clone(),
            store: Mutex::new(None),
        })
    }

    /// Read from a given store instead of building one from the environment.
    pub fn with_store(
        kind: StoreKind,
        engine_url: &str,
        store: Arc<dyn ObjectStore>,
        config: &ConnectConfig,
    ) -> Result<Self> {
        let connector = Self::new(kind, engine_url, &ConnectParams::default(), config)?;
        *connector.store.lock().unwrap_or_else(|e| e.into_inner()) = Some(store);
        Ok(connector)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        self.key.as_ref()
    }

    fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = store.as_ref() {
            return Ok(store.clone());
        }
        let built = build_store(self.kind, &self.bucket, self.credentials.as_deref())?;
        *store = Some(built.clone());
        Ok(built)
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        debug!("Fetching {}/{} from {:?}", self.bucket, self.key, self.kind);
        match self.store()?.get(&self.key).await {
            Ok(result) => Ok(result.bytes().await?.to_vec()),
            Err(object_store::Error::NotFound { .. }) => Err(not_found(&self.engine_url)),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for ObjectFlowerPotConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectFlowerPotConnector")
            .field("kind", &self.kind)
            .field("bucket", &self.bucket)
            .field("key", &self.key.as_ref())
            .field("credentials", &self.credentials.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl Connector for ObjectFlowerPotConnector {
    async fn data(&self) -> Result<RecordStream> {
        self.query(None).await
    }

    async fn query(&self, table: Option<&str>) -> Result<RecordStream> {
        let bytes = match self.fetch().await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(error_stream(e)),
        };
        Ok(stream_archive(
            move || Ok(Cursor::new(bytes)),
            table.map(str::to_string),
            self.config.stream_buffer,
        ))
    }

    async fn tables(&self) -> Result<BTreeSet<String>> {
        let bytes = self.fetch().await?;
        archive_tables(move || Ok(Cursor::new(bytes))).await
    }

    async fn schema(&self) -> Result<SchemaRef> {
        let sample: Vec<_> = self
            .data()
            .await?
            .take(self.config.schema_sample)
            .try_collect()
            .await?;
        infer_schema(&sample)
    }

    /// Never includes `credentials`.
    fn engine_params(&self) -> EngineParams {
        EngineParams::from([("engine_url".to_string(), self.engine_url.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    fn archive() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let body = b"{\"key\": \"apple\"}\n{\"key\": \"anchor\"}\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "test_a.json", &body[..])
            .unwrap();
        builder.into_inner().unwrap()
    }

    async fn store_with(key: &str, bytes: Vec<u8>) -> Arc<dyn ObjectStore> {
        let store = InMemory::new();
        store
            .put(&ObjectPath::from(key), PutPayload::from(bytes))
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_reads_archive_from_store() {
        let store = store_with("pots/day.tar", archive()).await;
        let fp = ObjectFlowerPotConnector::with_store(
            StoreKind::Gcs,
            "gs+flowerpot://bucket/pots/day.tar",
            store,
            &ConnectConfig::default(),
        )
        .unwrap();

        let records: Vec<_> = fp.query(Some("test_a")).await.unwrap().try_collect().await.unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.field_str("key").unwrap()).collect();
        assert_eq!(keys, vec!["apple", "anchor"]);
        assert_eq!(
            fp.tables().await.unwrap(),
            BTreeSet::from(["test_a".to_string()])
        );
    }

    #[tokio::test]
    async fn test_missing_object_fails_on_read() {
        let store = store_with("other.tar", archive()).await;
        let fp = ObjectFlowerPotConnector::with_store(
            StoreKind::S3,
            "s3+flowerpot://bucket/missing.tar",
            store,
            &ConnectConfig::default(),
        )
        .unwrap();
        let result: Result<Vec<_>> = fp.data().await.unwrap().try_collect().await;
        assert!(matches!(result, Err(ConnectorError::Connection(ref m)) if m.contains("not found")));
    }

    #[test]
    fn test_credentials_are_claimed_and_never_exposed() {
        let params = ConnectParams::default().with_option("credentials", "/keys/sa.json");
        let fp = ObjectFlowerPotConnector::new(
            StoreKind::Gcs,
            "gs+flowerpot://bucket/a.tar.gz",
            &params,
            &ConnectConfig::default(),
        )
        .unwrap();
        assert_eq!(fp.credentials.as_deref(), Some("/keys/sa.json"));
        assert_eq!(fp.engine_params().len(), 1);
        assert!(!format!("{:?}", fp).contains("sa.json"));
    }

    #[test]
    fn test_s3_rejects_credentials_option() {
        let params = ConnectParams::default().with_option("credentials", "/keys/sa.json");
        let err = ObjectFlowerPotConnector::new(
            StoreKind::S3,
            "s3+flowerpot://b/k.tar",
            &params,
            &ConnectConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidParameter(ref m) if m.contains("credentials")));
    }

    #[tokio::test]
    async fn test_key_with_space_is_found() {
        let store = store_with("my pot.tar", archive()).await;
        let fp = ObjectFlowerPotConnector::with_store(
            StoreKind::Gcs,
            "gs+flowerpot://bucket/my pot.tar",
            store,
            &ConnectConfig::default(),
        )
        .unwrap();
        assert_eq!(fp.key(), "my pot.tar");

        let records: Vec<_> = fp.data().await.unwrap().try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
