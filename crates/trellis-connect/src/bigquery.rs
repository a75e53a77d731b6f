//! BigQuery connector stub
//!
//! Decodes `bigquery://projectId=..;datasetId=..;tableId=..;` engine URLs and
//! keeps the relayed credentials. Reading and writing tables is not
//! implemented yet.

use async_trait::async_trait;

use crate::error::{ConnectorError, Result};
use crate::params::{parse_url_params, split_scheme, AccessMode, ConnectParams};
use crate::stream::RecordStream;
use crate::{Connector, EngineParams};

/// BigQuery connector (stub, not yet implemented).
#[derive(Clone)]
pub struct BigQueryConnector {
    engine_url: String,
    /// GCP project id
    pub project_id: String,
    /// BigQuery dataset id
    pub dataset_id: String,
    /// BigQuery table id
    pub table_id: String,
    access: AccessMode,
    credentials: Option<String>,
}

impl BigQueryConnector {
    /// Claims the `credentials` option. Accepts both access modes.
    pub fn new(engine_url: &str, params: &ConnectParams) -> Result<Self> {
        let mut options = params.relayed_options();
        let credentials = options.take("credentials");
        options.finish()?;

        let (project_id, dataset_id, table_id) = decode_engine_url(engine_url)?;
        Ok(Self {
            engine_url: engine_url.to_string(),
            project_id,
            dataset_id,
            table_id,
            access: params.access,
            credentials,
        })
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// The relayed credentials, if any.
    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    /// Fully qualified `project.dataset.table` name.
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Split a BigQuery engine URL into (project, dataset, table).
fn decode_engine_url(engine_url: &str) -> Result<(String, String, String)> {
    let rest = match split_scheme(engine_url) {
        Some(("bigquery://", rest)) => rest,
        _ => {
            return Err(ConnectorError::ParseError(format!(
                "expected bigquery://..., got '{}'",
                engine_url
            )))
        }
    };
    let mut params = parse_url_params(rest)?;
    let mut required = |key: &str| {
        params
            .remove(key)
            .ok_or_else(|| ConnectorError::ParseError(format!("missing {} in '{}'", key, engine_url)))
    };
    let decoded = (
        required("projectId")?,
        required("datasetId")?,
        required("tableId")?,
    );
    if let Some(unknown) = params.keys().next() {
        return Err(ConnectorError::ParseError(format!(
            "unknown parameter '{}' in '{}'",
            unknown, engine_url
        )));
    }
    Ok(decoded)
}

impl std::fmt::Debug for BigQueryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryConnector")
            .field("table", &self.table_ref())
            .field("access", &self.access)
            .field("credentials", &self.credentials.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl Connector for BigQueryConnector {
    async fn data(&self) -> Result<RecordStream> {
        Err(ConnectorError::NotSupported(format!(
            "reading BigQuery table {}",
            self.table_ref()
        )))
    }

    fn engine_params(&self) -> EngineParams {
        EngineParams::from([
            ("engine_url".to_string(), self.engine_url.clone()),
            ("access".to_string(), self.access.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE_URL: &str = "bigquery://projectId=my_project;datasetId=nice_food;tableId=cakes;";

    #[test]
    fn test_bigquery_engine_url_decode() {
        let bq = BigQueryConnector::new(ENGINE_URL, &ConnectParams::default()).unwrap();
        assert_eq!(bq.project_id, "my_project");
        assert_eq!(bq.dataset_id, "nice_food");
        assert_eq!(bq.table_id, "cakes");
        assert_eq!(bq.table_ref(), "my_project.nice_food.cakes");
    }

    #[test]
    fn test_bigquery_engine_url_errors() {
        for url in [
            "bigquery://projectId=p;datasetId=d;",
            "bigquery://projectId=p;datasetId=d;tableId=t;colour=blue;",
            "bigquery://projectId",
        ] {
            assert!(
                matches!(decode_engine_url(url), Err(ConnectorError::ParseError(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn test_credentials_relayed() {
        let params = ConnectParams::default()
            .with_option("credentials", "hello_world")
            .with_access(AccessMode::Write);
        let bq = BigQueryConnector::new(ENGINE_URL, &params).unwrap();
        assert_eq!(bq.credentials(), Some("hello_world"));
        assert_eq!(bq.access(), AccessMode::Write);

        let engine_params = bq.engine_params();
        assert_eq!(engine_params["access"], "write");
        assert!(!engine_params.values().any(|v| v.contains("hello_world")));
    }

    #[tokio::test]
    async fn test_reading_not_supported() {
        let bq = BigQueryConnector::new(ENGINE_URL, &ConnectParams::default()).unwrap();
        assert!(matches!(bq.data().await, Err(ConnectorError::NotSupported(_))));
        assert!(matches!(bq.schema().await, Err(ConnectorError::NotSupported(_))));
    }
}
