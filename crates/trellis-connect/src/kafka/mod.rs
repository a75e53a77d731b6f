//! `kafka://` connector: the messages of a topic that fall in a time window.
//!
//! The window is turned into per-partition offset ranges through a
//! [`Broker`], then each range is read in turn. Each message payload holds
//! one JSON object.

pub mod memory;
#[cfg(feature = "kafka")]
pub mod librdkafka;
pub mod url;
pub mod window;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use tracing::info;

use crate::config::ConnectConfig;
use crate::error::{ConnectorError, Result};
use crate::params::{require_read, ConnectParams};
use crate::record::Record;
use crate::stream::RecordStream;
use crate::{Connector, EngineParams};

pub use self::memory::MemoryBroker;
pub use self::url::KafkaEngineUrl;
pub use self::window::{resolve_partition_windows, Broker, KafkaMessage, PartitionWindow};

#[derive(Debug)]
pub struct KafkaConnector {
    engine_url: String,
    url: KafkaEngineUrl,
    config: ConnectConfig,
    broker: Mutex<Option<Arc<dyn Broker>>>,
}

impl KafkaConnector {
    /// Decodes the engine URL. The broker connection is made on first read.
    pub fn new(engine_url: &str, params: &ConnectParams, config: &ConnectConfig) -> Result<Self> {
        require_read(params.access, "kafka")?;
        params.relayed_options().finish()?;
        Ok(Self {
            engine_url: engine_url.to_string(),
            url: KafkaEngineUrl::parse(engine_url)?,
            config: config.clone(),
            broker: Mutex::new(None),
        })
    }

    /// Read through `broker` instead of connecting to the bootstrap server.
    pub fn with_broker(
        engine_url: &str,
        broker: Arc<dyn Broker>,
        config: &ConnectConfig,
    ) -> Result<Self> {
        let connector = Self::new(engine_url, &ConnectParams::default(), config)?;
        *connector.broker.lock().unwrap_or_else(|e| e.into_inner()) = Some(broker);
        Ok(connector)
    }

    pub fn engine(&self) -> &KafkaEngineUrl {
        &self.url
    }

    fn broker(&self) -> Result<Arc<dyn Broker>> {
        let mut broker = self.broker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(broker) = broker.as_ref() {
            return Ok(broker.clone());
        }
        let connected = connect_broker(&self.url, &self.config)?;
        *broker = Some(connected.clone());
        Ok(connected)
    }

    /// Offset windows of each partition covering the time window.
    pub async fn partition_windows(&self) -> Result<BTreeSet<PartitionWindow>> {
        let broker = self.broker()?;
        let windows = resolve_partition_windows(
            broker.as_ref(),
            &self.url.topic,
            self.url.start_ms(),
            self.url.end_ms(),
        )
        .await?;
        info!(
            "Topic '{}' has {} partition windows between {} and {}",
            self.url.topic,
            windows.len(),
            self.url.start,
            self.url.end
        );
        Ok(windows)
    }
}

#[cfg(feature = "kafka")]
fn connect_broker(url: &KafkaEngineUrl, config: &ConnectConfig) -> Result<Arc<dyn Broker>> {
    Ok(Arc::new(librdkafka::RdKafkaBroker::connect(
        &url.bootstrap_server,
        config,
    )?))
}

#[cfg(not(feature = "kafka"))]
fn connect_broker(url: &KafkaEngineUrl, _config: &ConnectConfig) -> Result<Arc<dyn Broker>> {
    Err(ConnectorError::NotSupported(format!(
        "connecting to Kafka at '{}' needs the `kafka` feature",
        url.bootstrap_server
    )))
}

/// Decode a message payload into a record.
fn decode_message(topic: &str, message: KafkaMessage) -> Result<Record> {
    let location = format!("{}/{}@{}", topic, message.partition, message.offset);
    match message.payload {
        Some(payload) => Record::from_slice(&payload, &location),
        None => Err(ConnectorError::MalformedRecord {
            location,
            reason: "message has no payload".to_string(),
        }),
    }
}

#[async_trait]
impl Connector for KafkaConnector {
    async fn data(&self) -> Result<RecordStream> {
        let broker = self.broker()?;
        let windows = self.partition_windows().await?;
        let topic = self.url.topic.clone();

        let messages = stream::iter(windows)
            .map({
                let topic = topic.clone();
                move |window| broker.read_window(&topic, window)
            })
            .flatten();
        let records = messages
            .map(move |message| message.and_then(|m| decode_message(&topic, m)))
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            });
        Ok(records.boxed())
    }

    fn engine_params(&self) -> EngineParams {
        EngineParams::from([("engine_url".to_string(), self.engine_url.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::AccessMode;
    use futures::TryStreamExt;
    use serde_json::json;

    const ENGINE_URL: &str =
        "kafka://bionic/topic=foobar;start=@(2019-05-15 08:00:00);end=@(2019-05-15 18:00:00);";

    fn ms(url: &str) -> i64 {
        KafkaEngineUrl::parse(url).unwrap().start_ms()
    }

    #[tokio::test]
    async fn test_reads_window_sequentially() {
        let start = ms(ENGINE_URL);
        let broker = MemoryBroker::new();
        broker.produce("foobar", 0, start - 1, r#"{"n": "early"}"#);
        broker.produce("foobar", 0, start, r#"{"n": "p0-a"}"#);
        broker.produce("foobar", 0, start + 5, r#"{"n": "p0-b"}"#);
        broker.produce("foobar", 1, start + 1, r#"{"n": "p1-a"}"#);

        let kafka =
            KafkaConnector::with_broker(ENGINE_URL, Arc::new(broker), &ConnectConfig::default())
                .unwrap();
        let records: Vec<_> = kafka.data().await.unwrap().try_collect().await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.field("n").unwrap().clone()).collect();
        assert_eq!(names, vec![json!("p0-a"), json!("p0-b"), json!("p1-a")]);
    }

    #[tokio::test]
    async fn test_bad_payload_stops_the_stream() {
        let start = ms(ENGINE_URL);
        let broker = MemoryBroker::new();
        broker.produce("foobar", 0, start, r#"{"n": 1}"#);
        broker.produce_raw("foobar", 0, start + 1, None);
        broker.produce("foobar", 0, start + 2, r#"{"n": 3}"#);

        let kafka =
            KafkaConnector::with_broker(ENGINE_URL, Arc::new(broker), &ConnectConfig::default())
                .unwrap();
        let items: Vec<_> = kafka.data().await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(ConnectorError::MalformedRecord { ref location, .. }) if location == "foobar/0@1"
        ));
    }

    #[test]
    fn test_kafka_is_read_only() {
        let params = ConnectParams::default().with_access(AccessMode::Write);
        assert!(matches!(
            KafkaConnector::new(ENGINE_URL, &params, &ConnectConfig::default()),
            Err(ConnectorError::InvalidParameter(_))
        ));
    }

    #[cfg(not(feature = "kafka"))]
    #[tokio::test]
    async fn test_no_broker_without_feature() {
        let kafka =
            KafkaConnector::new(ENGINE_URL, &ConnectParams::default(), &ConnectConfig::default())
                .unwrap();
        assert!(matches!(kafka.data().await, Err(ConnectorError::NotSupported(_))));
        assert_eq!(kafka.engine_params()["engine_url"], ENGINE_URL);
    }
}
