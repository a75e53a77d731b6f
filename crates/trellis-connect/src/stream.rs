//! Bridge from blocking readers to async record streams.
//!
//! Archive decompression and librdkafka polling are blocking. They run on
//! tokio's blocking pool and hand items over a bounded channel, so at most
//! `capacity` items are buffered ahead of the consumer.

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::record::Record;

/// A lazily produced sequence of records.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Run `produce` on the blocking pool and expose what it sends as a stream.
///
/// `produce` should stop as soon as a send fails: that means the stream was
/// dropped.
pub(crate) fn blocking_stream<T, F>(capacity: usize, produce: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: FnOnce(mpsc::Sender<T>) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || produce(tx));
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Forward `items` into `tx` until the iterator ends, an item is an error,
/// or the receiver is gone.
pub(crate) fn forward_until_error<T, I>(tx: &mpsc::Sender<Result<T>>, items: I)
where
    I: IntoIterator<Item = Result<T>>,
{
    for item in items {
        let failed = item.is_err();
        if tx.blocking_send(item).is_err() || failed {
            break;
        }
    }
}

/// A stream holding only `err`.
pub(crate) fn error_stream<T: Send + 'static>(err: crate::ConnectorError) -> BoxStream<'static, Result<T>> {
    stream::once(async move { Err(err) }).boxed()
}
