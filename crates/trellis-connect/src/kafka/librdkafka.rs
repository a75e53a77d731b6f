//! Broker backed by librdkafka.
//!
//! librdkafka calls block, so every call runs on tokio's blocking pool.
//! Offsets are looked up and read without committing anything.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::window::{until_window_end, Broker, KafkaMessage, PartitionWindow};
use crate::config::ConnectConfig;
use crate::error::{ConnectorError, Result};
use crate::stream::{blocking_stream, forward_until_error};

pub struct RdKafkaBroker {
    bootstrap_server: String,
    group_id: String,
    timeout: Duration,
    buffer: usize,
    consumer: Arc<BaseConsumer>,
}

impl std::fmt::Debug for RdKafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdKafkaBroker")
            .field("bootstrap_server", &self.bootstrap_server)
            .field("group_id", &self.group_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn create_consumer(bootstrap_server: &str, group_id: &str) -> Result<BaseConsumer> {
    Ok(ClientConfig::new()
        .set("bootstrap.servers", bootstrap_server)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "false")
        .create()?)
}

impl RdKafkaBroker {
    pub fn connect(bootstrap_server: &str, config: &ConnectConfig) -> Result<Self> {
        let consumer = create_consumer(bootstrap_server, &config.kafka_group_id)?;
        info!(
            "Created Kafka consumer for {} (group {})",
            bootstrap_server, config.kafka_group_id
        );
        Ok(Self {
            bootstrap_server: bootstrap_server.to_string(),
            group_id: config.kafka_group_id.clone(),
            timeout: config.kafka_timeout,
            buffer: config.stream_buffer,
            consumer: Arc::new(consumer),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> Result<T> + Send + 'static,
    {
        let consumer = self.consumer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || f(&consumer, timeout)).await?
    }
}

#[async_trait]
impl Broker for RdKafkaBroker {
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let topic = topic.to_string();
        self.blocking(move |consumer, timeout| {
            let metadata = consumer.fetch_metadata(Some(&topic), timeout)?;
            let found = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .ok_or_else(|| ConnectorError::Connection(format!("unknown topic '{}'", topic)))?;
            if let Some(err) = found.error() {
                return Err(ConnectorError::Connection(format!(
                    "metadata for topic '{}' failed: {:?}",
                    topic, err
                )));
            }
            Ok(found.partitions().iter().map(|p| p.id()).collect())
        })
        .await
    }

    async fn offset_for_timestamp(
        &self,
        topic: &str,
        partition: i32,
        timestamp_ms: i64,
    ) -> Result<Option<i64>> {
        let topic = topic.to_string();
        self.blocking(move |consumer, timeout| {
            let mut query = TopicPartitionList::new();
            query.add_partition_offset(&topic, partition, Offset::Offset(timestamp_ms))?;
            let found = consumer.offsets_for_times(query, timeout)?;
            let offset = found
                .find_partition(&topic, partition)
                .map(|elem| elem.offset());
            Ok(match offset {
                Some(Offset::Offset(offset)) => Some(offset),
                _ => None,
            })
        })
        .await
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64> {
        let topic = topic.to_string();
        self.blocking(move |consumer, timeout| {
            let (_low, high) = consumer.fetch_watermarks(&topic, partition, timeout)?;
            Ok(high)
        })
        .await
    }

    /// Reads with a dedicated consumer assigned to the window's partition.
    fn read_window(
        &self,
        topic: &str,
        window: PartitionWindow,
    ) -> BoxStream<'static, Result<KafkaMessage>> {
        let topic = topic.to_string();
        let bootstrap_server = self.bootstrap_server.clone();
        let group_id = self.group_id.clone();
        let timeout = self.timeout;

        blocking_stream(self.buffer, move |tx| {
            let messages = WindowReader::open(&bootstrap_server, &group_id, &topic, window, timeout);
            match messages {
                Ok(reader) => forward_until_error(&tx, until_window_end(window, reader)),
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                }
            }
        })
    }
}

/// Polls one partition from the window's start offset up to its end.
struct WindowReader {
    consumer: BaseConsumer,
    window: PartitionWindow,
    next_offset: i64,
    timeout: Duration,
}

impl WindowReader {
    fn open(
        bootstrap_server: &str,
        group_id: &str,
        topic: &str,
        window: PartitionWindow,
        timeout: Duration,
    ) -> Result<Self> {
        let consumer = create_consumer(bootstrap_server, group_id)?;
        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(
            topic,
            window.partition,
            Offset::Offset(window.start_offset),
        )?;
        consumer.assign(&assignment)?;
        debug!(
            "Reading {} partition {} offsets {}..{}",
            topic, window.partition, window.start_offset, window.end_offset
        );
        Ok(Self {
            consumer,
            window,
            next_offset: window.start_offset,
            timeout,
        })
    }
}

impl Iterator for WindowReader {
    type Item = Result<KafkaMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_offset >= self.window.end_offset {
            return None;
        }
        let message = match self.consumer.poll(self.timeout) {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Some(Err(e.into())),
            None => {
                return Some(Err(ConnectorError::Connection(format!(
                    "timed out reading partition {} at offset {}",
                    self.window.partition, self.next_offset
                ))))
            }
        };
        self.next_offset = message.offset() + 1;
        Some(Ok(KafkaMessage {
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        }))
    }
}
