//! `flowerpot://<path>` connector: an archive of JSON-lines files on the
//! local filesystem.

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::archive::{archive_tables, not_found, stream_archive};
use crate::config::ConnectConfig;
use crate::error::{ConnectorError, Result};
use crate::params::{require_read, split_scheme, ConnectParams};
use crate::record::infer_schema;
use crate::stream::RecordStream;
use crate::{Connector, EngineParams};

#[derive(Debug, Clone)]
pub struct FlowerPotConnector {
    engine_url: String,
    path: PathBuf,
    config: ConnectConfig,
}

impl FlowerPotConnector {
    pub fn new(engine_url: &str, params: &ConnectParams, config: &ConnectConfig) -> Result<Self> {
        require_read(params.access, "flowerpot")?;
        params.relayed_options().finish()?;

        let path = match split_scheme(engine_url) {
            Some(("flowerpot://", path)) if !path.is_empty() => path,
            _ => {
                return Err(ConnectorError::ParseError(format!(
                    "expected flowerpot://<path>, got '{}'",
                    engine_url
                )))
            }
        };
        Ok(Self {
            engine_url: engine_url.to_string(),
            path: PathBuf::from(path),
            config: config.clone(),
        })
    }

    /// Opens the archive afresh; every read walks it from the start.
    fn opener(&self) -> impl FnOnce() -> Result<File> + Send + 'static {
        let path = self.path.clone();
        move || {
            debug!("Opening flowerpot {}", path.display());
            File::open(&path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => not_found(&path.display().to_string()),
                _ => ConnectorError::Io(e),
            })
        }
    }
}

#[async_trait]
impl Connector for FlowerPotConnector {
    async fn data(&self) -> Result<RecordStream> {
        self.query(None).await
    }

    async fn query(&self, table: Option<&str>) -> Result<RecordStream> {
        Ok(stream_archive(
            self.opener(),
            table.map(str::to_string),
            self.config.stream_buffer,
        ))
    }

    /// Distinct logical table names in the archive.
    async fn tables(&self) -> Result<BTreeSet<String>> {
        archive_tables(self.opener()).await
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

    fn engine_params(&self) -> EngineParams {
        EngineParams::from([("engine_url".to_string(), self.engine_url.clone())])
    }
}
