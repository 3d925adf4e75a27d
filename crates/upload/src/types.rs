//! Data types for the upload flow.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use vaultpush_transfer::{
    DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE_MIB, MIB, PartRange, TreeHash, validate_part_size,
};

use crate::error::{ArchiveError, UploadError};
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything needed to upload one file as one archive.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub file_path: PathBuf,
    pub vault: String,
    pub archive_description: String,
    /// Part size in bytes.
    pub part_size: u64,
    /// Number of concurrent part uploads.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl UploadConfig {
    /// Config with default part size, concurrency and retry policy.
    pub fn new(file_path: impl Into<PathBuf>, vault: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            vault: vault.into(),
            archive_description: String::new(),
            part_size: DEFAULT_PART_SIZE_MIB * MIB,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    /// Checks every constraint that can be checked without the service.
    pub async fn validate(&self) -> Result<(), UploadError> {
        if self.vault.trim().is_empty() {
            return Err(UploadError::InvalidConfig("vault name is required".into()));
        }
        validate_part_size(self.part_size)
            .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;
        if self.concurrency < 1 {
            return Err(UploadError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        match tokio::fs::metadata(&self.file_path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(UploadError::InvalidConfig(format!(
                "{} is not a regular file",
                self.file_path.display()
            ))),
            Err(e) => Err(UploadError::InvalidConfig(format!(
                "{}: {e}",
                self.file_path.display()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// Lifecycle of one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initiated,
    Uploading,
    AllPartsAcked,
    Completed,
    Aborted,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Initiated)
                | (Created, Aborted)
                | (Initiated, Uploading)
                | (Initiated, Aborted)
                | (Uploading, AllPartsAcked)
                | (Uploading, Aborted)
                | (AllPartsAcked, Completed)
                | (AllPartsAcked, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Initiated => "initiated",
            SessionState::Uploading => "uploading",
            SessionState::AllPartsAcked => "all-parts-acked",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Service requests
// ---------------------------------------------------------------------------

/// Request to open a multipart session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateUploadRequest {
    pub vault: String,
    pub archive_description: String,
    /// Part size in bytes, as a decimal string.
    pub part_size: String,
}

/// Request to upload one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPartRequest {
    pub session_id: String,
    pub vault: String,
    /// `bytes {first}-{last}/{total}`.
    pub range: String,
    pub body: Vec<u8>,
    /// Hex tree hash of `body`.
    pub checksum: String,
}

/// Request to finalize a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteUploadRequest {
    pub session_id: String,
    pub vault: String,
    /// Archive size in bytes, as a decimal string.
    pub archive_size: String,
    /// Hex tree hash of the whole archive.
    pub checksum: String,
}

/// Request to discard a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortUploadRequest {
    pub session_id: String,
    pub vault: String,
}

/// Acknowledgement of an uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartAck {
    /// Tree hash the service computed for the part.
    pub checksum: String,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A successfully uploaded part.
#[derive(Debug, Clone)]
pub struct PartReceipt {
    pub range: PartRange,
    pub checksum: TreeHash,
    pub ack: PartAck,
    pub attempts: u32,
}

/// Result of processing one part.
#[derive(Debug)]
pub struct PartOutcome {
    pub range: PartRange,
    pub result: Result<PartReceipt, UploadError>,
}

/// Summary of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub session_id: String,
    pub archive_id: String,
    pub archive_size: u64,
    pub tree_hash: TreeHash,
    pub parts: u64,
    pub elapsed: Duration,
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Session opened; `total_parts` parts will follow.
    Initiated {
        session_id: String,
        total_parts: u64,
        file_size: u64,
    },
    /// A part was acknowledged.
    PartUploaded { index: u64, bytes: u64 },
    /// A part failed transiently and will be retried after `delay`.
    PartRetrying {
        index: u64,
        attempt: u32,
        delay: Duration,
        error: ArchiveError,
    },
    /// Every part was acknowledged; the file is being re-read to check the
    /// archive tree hash.
    Verifying { archive_size: u64 },
    /// The archive was finalized.
    Completed { archive_id: String, tree_hash: TreeHash },
    /// The session ended without an archive.
    Aborted {
        session_id: Option<String>,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(path: &std::path::Path) -> UploadConfig {
        UploadConfig::new(path, "photos")
    }

    #[test]
    fn defaults() {
        let c = UploadConfig::new("/tmp/x", "v");
        assert_eq!(c.part_size, 4 * MIB);
        assert_eq!(c.concurrency, 25);
        assert_eq!(c.retry.max_retries, 3);
    }

    #[tokio::test]
    async fn validate_accepts_good_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();
        config_for(&path).validate().await.unwrap();
    }

    #[tokio::test]
    async fn validate_rejects_bad_part_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        for bad in [3 * MIB, 8192 * MIB, 0, MIB / 2] {
            let mut c = config_for(&path);
            c.part_size = bad;
            assert!(c.validate().await.unwrap_err().is_config(), "part size {bad}");
        }
    }

    #[tokio::test]
    async fn validate_rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        let mut c = config_for(&path);
        c.concurrency = 0;
        assert!(c.validate().await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn validate_rejects_missing_file_and_vault() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_for(&dir.path().join("nope")).validate().await.is_err());
        assert!(config_for(dir.path()).validate().await.is_err());

        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();
        let mut c = config_for(&path);
        c.vault = "  ".into();
        assert!(c.validate().await.unwrap_err().is_config());
    }

    #[test]
    fn state_transitions() {
        use SessionState::*;
        assert!(Created.can_transition_to(Initiated));
        assert!(Initiated.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(AllPartsAcked));
        assert!(AllPartsAcked.can_transition_to(Completed));
        assert!(Uploading.can_transition_to(Aborted));

        assert!(!Created.can_transition_to(Uploading));
        assert!(!Completed.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Initiated));
        assert!(Completed.is_terminal() && Aborted.is_terminal());
    }
}
