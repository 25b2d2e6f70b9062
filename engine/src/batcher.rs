//! Idle-debounce batching of reasoning-stream records.
//!
//! The stream can emit dozens of records in a burst; re-rendering after each
//! would swamp a front end. The batcher queues records and flushes the whole
//! queue once the stream has been idle for the debounce interval (100 ms by
//! default). Nothing is ever dropped and there is no capacity limit: volume
//! is bounded by one interactive session.

use std::time::Duration;

use tokio::sync::mpsc;

use lumen_types::RawStreamRecord;

/// The queue/flush core, separated from timing so it can be driven directly.
#[derive(Debug, Default)]
pub struct Batcher {
    queue: Vec<RawStreamRecord>,
}

impl Batcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, record: RawStreamRecord) {
        self.queue.push(record);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain the entire queue atomically, preserving enqueue order.
    #[must_use]
    pub fn flush(&mut self) -> Vec<RawStreamRecord> {
        std::mem::take(&mut self.queue)
    }
}

/// Drive a batcher between an input channel and a batch channel.
///
/// Every received record (re)arms the idle timer; when the timer fires with
/// records queued, the whole queue is sent downstream as one batch. When the
/// input channel closes, any remainder is flushed before the loop exits. The
/// loop also exits once the batch receiver is gone.
pub async fn run_batcher(
    mut rx: mpsc::Receiver<RawStreamRecord>,
    batch_tx: mpsc::Sender<Vec<RawStreamRecord>>,
    debounce: Duration,
) {
    let mut batcher = Batcher::new();

    loop {
        if batcher.pending() == 0 {
            // Nothing queued: block until a record arrives or input closes.
            match rx.recv().await {
                Some(record) => batcher.enqueue(record),
                None => break,
            }
            continue;
        }

        // Records queued: wait for more, but only until the idle timer fires.
        match tokio::time::timeout(debounce, rx.recv()).await {
            Ok(Some(record)) => batcher.enqueue(record),
            Ok(None) => break,
            Err(_elapsed) => {
                let batch = batcher.flush();
                tracing::trace!(len = batch.len(), "Flushing idle batch");
                if batch_tx.send(batch).await.is_err() {
                    return;
                }
            }
        }
    }

    // Input closed: deliver whatever is still queued.
    let remainder = batcher.flush();
    if !remainder.is_empty() {
        let _ = batch_tx.send(remainder).await;
    }
}

/// Spawn [`run_batcher`] on the current runtime and return the input sender
/// plus the batch receiver.
#[must_use]
pub fn spawn_batcher(
    debounce: Duration,
) -> (
    mpsc::Sender<RawStreamRecord>,
    mpsc::Receiver<Vec<RawStreamRecord>>,
) {
    let (record_tx, record_rx) = mpsc::channel(256);
    let (batch_tx, batch_rx) = mpsc::channel(16);
    tokio::spawn(run_batcher(record_rx, batch_tx, debounce));
    (record_tx, batch_rx)
}
