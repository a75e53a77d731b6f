//! `fake://` connector: a fixed one-record dataset for tests and demos.

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map};

use crate::error::Result;
use crate::params::ConnectParams;
use crate::record::{infer_schema, Record};
use crate::stream::RecordStream;
use crate::{Connector, EngineParams};

/// Serves `[{"fake": "data"}]` whatever the URL says.
#[derive(Debug, Clone)]
pub struct FakeDataConnector {
    engine_url: String,
}

impl FakeDataConnector {
    /// Accepts either access mode and claims no options.
    pub fn new(engine_url: &str, params: &ConnectParams) -> Result<Self> {
        params.relayed_options().finish()?;
        Ok(Self {
            engine_url: engine_url.to_string(),
        })
    }

    fn records() -> Vec<Record> {
        let mut fields = Map::new();
        fields.insert("fake".to_string(), json!("data"));
        vec![Record::new(fields)]
    }
}

#[async_trait]
impl Connector for FakeDataConnector {
    async fn data(&self) -> Result<RecordStream> {
        Ok(stream::iter(Self::records().into_iter().map(Ok)).boxed())
    }

    async fn schema(&self) -> Result<SchemaRef> {
        infer_schema(&Self::records())
    }

    fn engine_params(&self) -> EngineParams {
        EngineParams::from([("engine_url".to_string(), self.engine_url.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::params::AccessMode;
    use arrow::datatypes::DataType;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_fake_data() {
        let fake = FakeDataConnector::new("fake://bugsDB", &ConnectParams::default()).unwrap();
        let records: Vec<_> = fake.data().await.unwrap().try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field_str("fake").unwrap(), "data");
    }

    #[tokio::test]
    async fn test_fake_schema_and_params() {
        let fake = FakeDataConnector::new("fake://bugsDB", &ConnectParams::default()).unwrap();
        let schema = fake.schema().await.unwrap();
        assert_eq!(schema.field_with_name("fake").unwrap().data_type(), &DataType::Utf8);
        assert_eq!(fake.engine_params()["engine_url"], "fake://bugsDB");
    }

    #[tokio::test]
    async fn test_fake_unsupported_capabilities() {
        let params = ConnectParams::default().with_access(AccessMode::Write);
        let fake = FakeDataConnector::new("fake://bugsDB", &params).unwrap();
        assert!(matches!(fake.len().await, Err(ConnectorError::NotSupported(_))));
        assert!(matches!(fake.get("x").await, Err(ConnectorError::NotSupported(_))));
        assert!(matches!(fake.query(None).await, Err(ConnectorError::NotSupported(_))));
    }

    #[test]
    fn test_fake_rejects_options() {
        let params = ConnectParams::default().with_option("doesntexist", "oh dear");
        assert!(matches!(
            FakeDataConnector::new("fake://foo", &params),
            Err(ConnectorError::InvalidParameter(_))
        ));
    }
}
