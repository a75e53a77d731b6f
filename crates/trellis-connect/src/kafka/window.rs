//! Partition windows: which offsets of each partition fall in a time range.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::debug;

use crate::error::Result;

/// Offsets `[start_offset, end_offset)` of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionWindow {
    pub partition: i32,
    pub start_offset: i64,
    pub end_offset: i64,
}

impl PartitionWindow {
    pub fn len(&self) -> i64 {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    pub fn contains(&self, offset: i64) -> bool {
        self.start_offset <= offset && offset < self.end_offset
    }
}

/// Cut polled messages off at the first one at or past the window's end.
///
/// Logs can skip offsets (compaction, transaction markers), so the next
/// message after `end_offset - 1` may land well beyond the window.
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) fn until_window_end<I>(
    window: PartitionWindow,
    messages: I,
) -> impl Iterator<Item = Result<KafkaMessage>>
where
    I: IntoIterator<Item = Result<KafkaMessage>>,
{
    messages.into_iter().take_while(move |message| match message {
        Ok(message) => message.offset < window.end_offset,
        Err(_) => true,
    })
}

/// One message read from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaMessage {
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// The broker operations windowed reads need.
#[async_trait]
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Partition ids of `topic`.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// First offset whose timestamp is at or after `timestamp_ms`, or `None`
    /// if the partition has no such message.
    async fn offset_for_timestamp(
        &self,
        topic: &str,
        partition: i32,
        timestamp_ms: i64,
    ) -> Result<Option<i64>>;

    /// Offset the next produced message will get.
    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64>;

    /// Messages of `window`, in offset order.
    fn read_window(
        &self,
        topic: &str,
        window: PartitionWindow,
    ) -> BoxStream<'static, Result<KafkaMessage>>;
}

/// Offset windows covering `[start_ms, end_ms)` in every partition of `topic`.
///
/// A partition with no message at or after `start_ms` is left out. When no
/// message is at or after `end_ms`, the window runs to the high watermark.
/// Empty windows are left out.
pub async fn resolve_partition_windows(
    broker: &dyn Broker,
    topic: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<BTreeSet<PartitionWindow>> {
    let mut windows = BTreeSet::new();
    for partition in broker.partitions(topic).await? {
        let Some(start_offset) = broker
            .offset_for_timestamp(topic, partition, start_ms)
            .await?
        else {
            debug!("Partition {} of {} has nothing after the start", partition, topic);
            continue;
        };
        let end_offset = match broker.offset_for_timestamp(topic, partition, end_ms).await? {
            Some(offset) => offset,
            None => broker.high_watermark(topic, partition).await?,
        };
        let window = PartitionWindow {
            partition,
            start_offset,
            end_offset,
        };
        if window.is_empty() {
            debug!("Partition {} of {} has an empty window", partition, topic);
            continue;
        }
        windows.insert(window);
    }
    Ok(windows)
}
