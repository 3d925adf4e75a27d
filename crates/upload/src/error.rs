//! Upload error types.

use std::fmt;
use std::path::PathBuf;

use vaultpush_transfer::TransferError;

/// Classification of a failure reported by the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorKind {
    ResourceNotFound,
    InvalidParameterValue,
    MissingParameterValue,
    RequestTimeout,
    ServiceUnavailable,
    Throttling,
    Other,
}

impl ArchiveErrorKind {
    /// Whether a request failing this way may succeed if repeated.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RequestTimeout | Self::ServiceUnavailable | Self::Throttling
        )
    }

    /// Service error code, as the storage API names it.
    pub fn code(self) -> &'static str {
        match self {
            Self::ResourceNotFound => "ResourceNotFoundException",
            Self::InvalidParameterValue => "InvalidParameterValueException",
            Self::MissingParameterValue => "MissingParameterValueException",
            Self::RequestTimeout => "RequestTimeoutException",
            Self::ServiceUnavailable => "ServiceUnavailableException",
            Self::Throttling => "ThrottlingException",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for ArchiveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by a [`RemoteArchiveClient`](crate::RemoteArchiveClient).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ArchiveError {
    pub kind: ArchiveErrorKind,
    pub message: String,
}

impl ArchiveError {
    pub fn new(kind: ArchiveErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Errors produced by an upload session.
///
/// Every variant raised after initiation names the session so it can be
/// inspected or cleaned up on the service side.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    #[error("failed to initiate multipart upload: {0}")]
    Initiate(#[source] ArchiveError),

    #[error(
        "upload of part {part_index} ({range}) failed after {attempts} attempt(s) in session {session_id}: {source}"
    )]
    PartUpload {
        session_id: String,
        part_index: u64,
        range: String,
        attempts: u32,
        #[source]
        source: ArchiveError,
    },

    #[error("failed to complete session {session_id}, its parts remain stored: {source}")]
    Complete {
        session_id: String,
        #[source]
        source: ArchiveError,
    },

    #[error(
        "archive tree hash mismatch in session {session_id}: parts give {from_parts}, file gives {from_file}"
    )]
    ChecksumMismatch {
        session_id: String,
        from_parts: String,
        from_file: String,
    },

    #[error("session {session_id} cancelled")]
    Cancelled { session_id: String },

    #[error("upload session already used (state {0})")]
    SessionReused(crate::types::SessionState),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl UploadError {
    /// Session the error belongs to, if one had been opened.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::PartUpload { session_id, .. }
            | Self::Complete { session_id, .. }
            | Self::ChecksumMismatch { session_id, .. }
            | Self::Cancelled { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}
