// @file: kline_engine/src/connectors/batch.rs
// @description: Runs tasks in fixed-size batches, each fully settled before the next starts.
// @author: LAS.

use futures_util::future::join_all;
use log::{info, warn};
use std::future::Future;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Self {
        BatchScheduler { batch_size: batch_size.max(1) }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs `task` over `items` in order, `batch_size` at a time.
    ///
    /// `results[i]` belongs to `items[i]`. When cancellation stops the run between
    /// batches the result is shorter than `items`; a batch that already started
    /// always settles completely.
    pub async fn run<'a, T, O, F, Fut>(&self, items: &'a [T], cancel: &CancellationToken, task: F) -> Vec<O>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = O>,
    {
        let total_batches: usize = (items.len() + self.batch_size - 1) / self.batch_size;
        let mut results: Vec<O> = Vec::with_capacity(items.len());

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                warn!("Cancelled before batch {}/{}", index + 1, total_batches);
                break;
            }

            let outcomes: Vec<O> = join_all(batch.iter().map(&task)).await;
            results.extend(outcomes);

            info!("Completed batch {}/{}", index + 1, total_batches);
        }

        results
    }
}
