//! Fixed-size pool of part upload workers.
//!
//! Workers share one bounded queue. Each dequeued chunk is tree-hashed,
//! uploaded (with retries for transient failures) and recorded as a
//! [`PartOutcome`]. The first terminal failure cancels the shared token,
//! which stops the producer and makes idle workers exit.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vaultpush_transfer::{Chunk, tree_hash};

use crate::client::RemoteArchiveClient;
use crate::error::UploadError;
use crate::retry::RetryPolicy;
use crate::types::{PartOutcome, PartReceipt, UploadEvent, UploadPartRequest};

/// Queue capacity for `concurrency` workers.
///
/// Lets the reader stay one part ahead of every worker without buffering
/// an unbounded share of the file.
pub fn queue_capacity(concurrency: usize) -> usize {
    concurrency.max(1) * 2
}

/// State shared read-only by every worker of a session.
pub(crate) struct WorkerContext {
    pub(crate) client: Arc<dyn RemoteArchiveClient>,
    pub(crate) session_id: String,
    pub(crate) vault: String,
    pub(crate) file_size: u64,
    pub(crate) retry: RetryPolicy,
    pub(crate) events_tx: mpsc::Sender<UploadEvent>,
}

/// A running set of upload workers.
pub struct UploadWorkerPool {
    workers: JoinSet<Vec<PartOutcome>>,
}

impl UploadWorkerPool {
    /// Spawns `concurrency` workers draining `queue`.
    pub(crate) fn spawn(
        concurrency: usize,
        ctx: Arc<WorkerContext>,
        queue: mpsc::Receiver<Chunk>,
        cancel: CancellationToken,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue));
        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency.max(1) {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&ctx),
                Arc::clone(&queue),
                cancel.clone(),
            ));
        }
        Self { workers }
    }

    /// Waits for every worker to exit and gathers their outcomes.
    pub async fn join(mut self) -> Result<Vec<PartOutcome>, UploadError> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(mut worker_outcomes) => outcomes.append(&mut worker_outcomes),
                Err(e) => return Err(UploadError::Worker(e.to_string())),
            }
        }
        Ok(outcomes)
    }
}

async fn run_worker(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    queue: Arc<Mutex<mpsc::Receiver<Chunk>>>,
    cancel: CancellationToken,
) -> Vec<PartOutcome> {
    let mut outcomes = Vec::new();

    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = rx.recv() => chunk,
            }
        };
        let Some(chunk) = next else {
            break;
        };

        let outcome = upload_chunk(&ctx, chunk, &cancel).await;
        let failed = outcome.result.is_err();
        outcomes.push(outcome);
        if failed {
            cancel.cancel();
            break;
        }
    }

    debug!(worker = worker_id, parts = outcomes.len(), "worker exiting");
    outcomes
}

/// Uploads one chunk, retrying transient failures per the retry policy.
///
/// The chunk's bytes are dropped when this returns.
async fn upload_chunk(
    ctx: &WorkerContext,
    chunk: Chunk,
    cancel: &CancellationToken,
) -> PartOutcome {
    let range = chunk.range;
    let content_range = range.content_range(ctx.file_size).to_string();
    let checksum = tree_hash(&chunk.data);

    let request = UploadPartRequest {
        session_id: ctx.session_id.clone(),
        vault: ctx.vault.clone(),
        range: content_range.clone(),
        body: chunk.data,
        checksum: checksum.to_hex(),
    };

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(
            session = %ctx.session_id,
            part = range.index,
            range = %content_range,
            bytes = range.len(),
            attempt,
            "uploading part"
        );

        let err = match ctx.client.upload_part(&request).await {
            Ok(ack) => {
                let _ = ctx.events_tx.try_send(UploadEvent::PartUploaded {
                    index: range.index,
                    bytes: range.len(),
                });
                return PartOutcome {
                    range,
                    result: Ok(PartReceipt {
                        range,
                        checksum,
                        ack,
                        attempts: attempt,
                    }),
                };
            }
            Err(e) => e,
        };

        if !err.is_transient() || attempt > ctx.retry.max_retries {
            return PartOutcome {
                range,
                result: Err(UploadError::PartUpload {
                    session_id: ctx.session_id.clone(),
                    part_index: range.index,
                    range: content_range,
                    attempts: attempt,
                    source: err,
                }),
            };
        }

        let delay = ctx.retry.delay_for_attempt(attempt);
        warn!(
            session = %ctx.session_id,
            part = range.index,
            range = %content_range,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient part failure, retrying"
        );
        let _ = ctx.events_tx.try_send(UploadEvent::PartRetrying {
            index: range.index,
            attempt,
            delay,
            error: err,
        });

        tokio::select! {
            _ = cancel.cancelled() => {
                return PartOutcome {
                    range,
                    result: Err(UploadError::Cancelled {
                        session_id: ctx.session_id.clone(),
                    }),
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
