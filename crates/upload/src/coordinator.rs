//! Upload coordinator: owns one multipart session from initiation to
//! completion or abort.
//!
//! The coordinator reads the file through a single [`PartReader`], feeds a
//! bounded queue drained by an [`UploadWorkerPool`], waits for every worker
//! to finish and only then finalizes the archive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vaultpush_transfer::{
    Chunk, PartReader, TransferError, TreeHash, combine_tree_hashes, tree_hash_file,
};

use crate::client::RemoteArchiveClient;
use crate::error::UploadError;
use crate::types::{
    AbortUploadRequest, CompleteUploadRequest, InitiateUploadRequest, PartReceipt, SessionState,
    UploadConfig, UploadEvent, UploadReport,
};
use crate::worker::{UploadWorkerPool, WorkerContext, queue_capacity};

/// Drives a single archive upload.
pub struct UploadCoordinator {
    client: Arc<dyn RemoteArchiveClient>,
    state: Mutex<SessionState>,
    /// Set by the first `upload` call that passes validation.
    claimed: AtomicBool,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadCoordinator {
    /// Creates a coordinator for one session against `client`.
    pub fn new(client: Arc<dyn RemoteArchiveClient>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            client,
            state: Mutex::new(SessionState::Created),
            claimed: AtomicBool::new(false),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped rather than queued when the receiver lags.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a token that aborts the session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Aborted)
    }

    /// Uploads `config.file_path` as one archive.
    ///
    /// A coordinator runs at most one session; calling this again, even
    /// concurrently, fails with [`UploadError::SessionReused`]. A config that
    /// fails validation leaves the coordinator unused.
    pub async fn upload(&self, config: &UploadConfig) -> Result<UploadReport, UploadError> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(UploadError::SessionReused(self.state()));
        }
        if let Err(err) = config.validate().await {
            self.claimed.store(false, Ordering::Release);
            return Err(err);
        }

        let started = Instant::now();
        info!(
            file = %config.file_path.display(),
            vault = %config.vault,
            part_size = config.part_size,
            concurrency = config.concurrency,
            "starting archive upload"
        );

        // Created -> Initiated
        let request = InitiateUploadRequest {
            vault: config.vault.clone(),
            archive_description: config.archive_description.clone(),
            part_size: config.part_size.to_string(),
        };
        let session_id = match self.client.initiate_upload(&request).await {
            Ok(id) => id,
            Err(e) => {
                let err = UploadError::Initiate(e);
                self.mark_aborted(None, &err);
                return Err(err);
            }
        };
        self.transition(SessionState::Initiated);
        info!(session = %session_id, "multipart upload initiated");

        // Initiated -> Uploading -> AllPartsAcked
        let receipts = match self.upload_parts(config, &session_id).await {
            Ok(receipts) => receipts,
            Err(err) => {
                self.abort_remote(config, &session_id).await;
                self.mark_aborted(Some(&session_id), &err);
                return Err(err);
            }
        };
        self.transition(SessionState::AllPartsAcked);

        // AllPartsAcked -> Completed
        let checksum = self.archive_checksum(config, &session_id, &receipts).await;
        let (archive_size, tree_hash) = match checksum {
            Ok(_) if self.cancel.is_cancelled() => {
                let err = UploadError::Cancelled {
                    session_id: session_id.clone(),
                };
                self.abort_remote(config, &session_id).await;
                self.mark_aborted(Some(&session_id), &err);
                return Err(err);
            }
            Ok(v) => v,
            Err(err) => {
                self.abort_remote(config, &session_id).await;
                self.mark_aborted(Some(&session_id), &err);
                return Err(err);
            }
        };
        info!(session = %session_id, tree_hash = %tree_hash, "archive tree hash computed");

        let request = CompleteUploadRequest {
            session_id: session_id.clone(),
            vault: config.vault.clone(),
            archive_size: archive_size.to_string(),
            checksum: tree_hash.to_hex(),
        };
        let archive_id = match self.client.complete_upload(&request).await {
            Ok(id) => id,
            Err(e) => {
                let err = UploadError::Complete {
                    session_id: session_id.clone(),
                    source: e,
                };
                self.mark_aborted(Some(&session_id), &err);
                return Err(err);
            }
        };
        self.transition(SessionState::Completed);
        info!(session = %session_id, archive = %archive_id, "archive upload completed");

        let _ = self.events_tx.try_send(UploadEvent::Completed {
            archive_id: archive_id.clone(),
            tree_hash,
        });

        Ok(UploadReport {
            session_id,
            archive_id,
            archive_size,
            tree_hash,
            parts: receipts.len() as u64,
            elapsed: started.elapsed(),
        })
    }

    /// Reads the file once, uploading every part. Returns receipts in part order.
    async fn upload_parts(
        &self,
        config: &UploadConfig,
        session_id: &str,
    ) -> Result<Vec<PartReceipt>, UploadError> {
        let reader = PartReader::open(&config.file_path, config.part_size)
            .await
            .map_err(|source| UploadError::Io {
                path: config.file_path.clone(),
                source,
            })?;
        let file_size = reader.file_size();
        let parts = reader.remaining_parts();

        self.transition(SessionState::Uploading);
        info!(session = %session_id, parts, file_size, "splitting upload into {parts} parts");
        let _ = self.events_tx.try_send(UploadEvent::Initiated {
            session_id: session_id.to_string(),
            total_parts: parts,
            file_size,
        });

        let pipeline = self.cancel.child_token();
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity(config.concurrency));
        let ctx = Arc::new(WorkerContext {
            client: Arc::clone(&self.client),
            session_id: session_id.to_string(),
            vault: config.vault.clone(),
            file_size,
            retry: config.retry.clone(),
            events_tx: self.events_tx.clone(),
        });
        let pool = UploadWorkerPool::spawn(config.concurrency, ctx, queue_rx, pipeline.clone());

        let (produced, joined) = tokio::join!(
            produce_parts(reader, queue_tx, pipeline.clone()),
            pool.join()
        );
        let outcomes = joined?;

        // Report the root cause: a terminal part failure beats a read error,
        // which beats the cancellations either of them caused.
        let mut receipts = Vec::with_capacity(outcomes.len());
        let mut part_failure = None;
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome.result {
                Ok(receipt) => receipts.push(receipt),
                Err(UploadError::Cancelled { .. }) => cancelled = true,
                Err(err) => {
                    part_failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = part_failure {
            return Err(err);
        }
        match produced {
            Ok(queued) => debug!(session = %session_id, queued, "reader finished"),
            Err(source) => {
                return Err(UploadError::Io {
                    path: config.file_path.clone(),
                    source,
                });
            }
        }
        if cancelled || pipeline.is_cancelled() || receipts.len() as u64 != parts {
            return Err(UploadError::Cancelled {
                session_id: session_id.to_string(),
            });
        }

        receipts.sort_by_key(|r| r.range.index);
        Ok(receipts)
    }

    /// Derives the archive hash from the part hashes and checks it against a
    /// fresh sequential read of the file.
    ///
    /// The re-read is abandoned as soon as the session is cancelled.
    async fn archive_checksum(
        &self,
        config: &UploadConfig,
        session_id: &str,
        receipts: &[PartReceipt],
    ) -> Result<(u64, TreeHash), UploadError> {
        let archive_size = receipts.last().map(|r| r.range.end).unwrap_or(0);
        let part_hashes: Vec<TreeHash> = receipts.iter().map(|r| r.checksum).collect();
        let from_parts = combine_tree_hashes(&part_hashes);
        let _ = self.events_tx.try_send(UploadEvent::Verifying { archive_size });

        let path = config.file_path.clone();
        let hashing = tokio::task::spawn_blocking(move || tree_hash_file(&path));
        let joined = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(UploadError::Cancelled {
                    session_id: session_id.to_string(),
                });
            }
            joined = hashing => joined,
        };
        let from_file = joined
            .map_err(|e| UploadError::Worker(format!("task join error: {e}")))?
            .map_err(|source| UploadError::Io {
                path: config.file_path.clone(),
                source,
            })?;

        if from_parts != from_file {
            return Err(UploadError::ChecksumMismatch {
                session_id: session_id.to_string(),
                from_parts: from_parts.to_hex(),
                from_file: from_file.to_hex(),
            });
        }
        Ok((archive_size, from_file))
    }

    /// Best-effort abort of the remote session.
    async fn abort_remote(&self, config: &UploadConfig, session_id: &str) {
        let request = AbortUploadRequest {
            session_id: session_id.to_string(),
            vault: config.vault.clone(),
        };
        match self.client.abort_upload(&request).await {
            Ok(()) => debug!(session = %session_id, "remote session aborted"),
            Err(e) => warn!(session = %session_id, error = %e, "failed to abort remote session"),
        }
    }

    fn mark_aborted(&self, session_id: Option<&str>, err: &UploadError) {
        self.transition(SessionState::Aborted);
        error!(session = session_id.unwrap_or("-"), error = %err, "archive upload aborted");
        let _ = self.events_tx.try_send(UploadEvent::Aborted {
            session_id: session_id.map(str::to_string),
            error: err.to_string(),
        });
    }

    fn transition(&self, next: SessionState) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let current = *state;
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "ignoring invalid session transition");
            return;
        }
        debug!(from = %current, to = %next, "session state change");
        *state = next;
    }
}

/// Reads parts in order and queues them until the file is exhausted, the
/// queue is closed or the pipeline is cancelled.
///
/// Blocks while the queue is full. Returns the number of parts queued.
async fn produce_parts<R: AsyncRead + Unpin>(
    mut reader: PartReader<R>,
    queue: mpsc::Sender<Chunk>,
    cancel: CancellationToken,
) -> Result<u64, TransferError> {
    let mut queued = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let chunk = match reader.next_part().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };
        let index = chunk.range.index;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = queue.send(chunk) => {
                if sent.is_err() {
                    // Every worker is gone.
                    break;
                }
            }
        }
        debug!(part = index, "part queued");
        queued += 1;
    }
    Ok(queued)
}
