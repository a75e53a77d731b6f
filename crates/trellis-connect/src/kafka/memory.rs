//! In-process broker holding timestamped messages.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use super::window::{Broker, KafkaMessage, PartitionWindow};
use crate::error::{ConnectorError, Result};

#[derive(Debug, Clone)]
struct Stored {
    timestamp_ms: i64,
    payload: Option<Vec<u8>>,
}

type Partitions = BTreeMap<i32, Vec<Stored>>;

/// A broker kept in memory. Offsets are positions in each partition's log;
/// timestamps must not decrease within a partition.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<BTreeMap<String, Partitions>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `partition` exists, possibly empty.
    pub fn create_partition(&self, topic: &str, partition: i32) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();
    }

    /// Append a message and return its offset.
    pub fn produce(
        &self,
        topic: &str,
        partition: i32,
        timestamp_ms: i64,
        payload: impl Into<Vec<u8>>,
    ) -> i64 {
        self.produce_raw(topic, partition, timestamp_ms, Some(payload.into()))
    }

    /// Append a message that may have no payload.
    pub fn produce_raw(
        &self,
        topic: &str,
        partition: i32,
        timestamp_ms: i64,
        payload: Option<Vec<u8>>,
    ) -> i64 {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let log = topics
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();
        log.push(Stored {
            timestamp_ms,
            payload,
        });
        log.len() as i64 - 1
    }

    fn with_partition<T>(
        &self,
        topic: &str,
        partition: i32,
        f: impl FnOnce(&[Stored]) -> T,
    ) -> Result<T> {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let log = topics
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .ok_or_else(|| {
                ConnectorError::Connection(format!(
                    "unknown partition {} of topic '{}'",
                    partition, topic
                ))
            })?;
        Ok(f(log))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .get(topic)
            .map(|partitions| partitions.keys().copied().collect())
            .ok_or_else(|| ConnectorError::Connection(format!("unknown topic '{}'", topic)))
    }

    async fn offset_for_timestamp(
        &self,
        topic: &str,
        partition: i32,
        timestamp_ms: i64,
    ) -> Result<Option<i64>> {
        self.with_partition(topic, partition, |log| {
            log.iter()
                .position(|m| m.timestamp_ms >= timestamp_ms)
                .map(|offset| offset as i64)
        })
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64> {
        self.with_partition(topic, partition, |log| log.len() as i64)
    }

    fn read_window(
        &self,
        topic: &str,
        window: PartitionWindow,
    ) -> BoxStream<'static, Result<KafkaMessage>> {
        let messages = self.with_partition(topic, window.partition, |log| {
            (window.start_offset.max(0)..window.end_offset.min(log.len() as i64))
                .map(|offset| KafkaMessage {
                    partition: window.partition,
                    offset,
                    payload: log[offset as usize].payload.clone(),
                })
                .collect::<Vec<_>>()
        });
        match messages {
            Ok(messages) => stream::iter(messages.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}
