//! Logs upload progress from the coordinator's event stream.

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use vaultpush_transfer::SpeedCalculator;
use vaultpush_upload::UploadEvent;

/// Running totals for one upload.
#[derive(Default)]
pub struct Progress {
    speed: SpeedCalculator,
    total_parts: u64,
    file_size: u64,
    parts_done: u64,
    bytes_done: u64,
}

impl Progress {
    /// Applies one event and logs it.
    pub fn apply(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::Initiated {
                session_id,
                total_parts,
                file_size,
            } => {
                self.total_parts = total_parts;
                self.file_size = file_size;
                // Marks the start of the throughput window.
                self.speed.add_sample(0);
                info!(session_id = %session_id, total_parts, file_size, "upload started");
            }
            UploadEvent::PartUploaded { index, bytes } => {
                self.parts_done += 1;
                self.bytes_done += bytes;
                self.speed.add_sample(bytes);
                info!(
                    part = index,
                    "part {}/{} uploaded, {} of {} ({}/s)",
                    self.parts_done,
                    self.total_parts,
                    format_bytes(self.bytes_done as f64),
                    format_bytes(self.file_size as f64),
                    format_bytes(self.speed.bytes_per_second()),
                );
            }
            UploadEvent::PartRetrying {
                index,
                attempt,
                delay,
                error,
            } => {
                debug!(part = index, attempt, ?delay, error = %error, "part will be retried");
            }
            UploadEvent::Verifying { archive_size } => {
                info!(
                    archive_size,
                    "all parts uploaded, verifying archive tree hash"
                );
            }
            UploadEvent::Completed {
                archive_id,
                tree_hash,
            } => {
                info!(archive_id = %archive_id, tree_hash = %tree_hash, "archive completed");
            }
            UploadEvent::Aborted { session_id, error } => {
                error!(session_id = ?session_id, error = %error, "upload aborted");
            }
        }
    }

    pub fn parts_done(&self) -> u64 {
        self.parts_done
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }
}

/// Consumes events until the coordinator drops its sender.
pub async fn report(mut events: mpsc::Receiver<UploadEvent>) -> Progress {
    let mut progress = Progress::default();
    while let Some(event) = events.recv().await {
        progress.apply(event);
    }
    progress
}

/// Formats a byte count with a binary unit.
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
