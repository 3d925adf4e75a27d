//! Multipart archive upload pipeline.
//!
//! This crate implements the **upload logic** for pushing one large file
//! into an archival vault. It has no transport dependencies: callers
//! provide a [`RemoteArchiveClient`] implementation that talks to the
//! actual storage service.
//!
//! # Pipeline
//!
//! 1. **Initiate**: open a multipart session with the service
//! 2. **Upload**: one reader feeds parts into a bounded queue drained by
//!    a fixed pool of workers; each part is tree-hashed and uploaded with
//!    retries for transient failures
//! 3. **Verify**: derive the archive tree hash from the part hashes and
//!    check it against a fresh read of the file
//! 4. **Complete**: finalize the session with the archive size and hash
//!
//! Any terminal failure cancels the pipeline and aborts the session.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod retry;
pub mod types;
pub mod worker;

pub use client::{ArchiveFuture, RemoteArchiveClient};
pub use coordinator::UploadCoordinator;
pub use error::{ArchiveError, ArchiveErrorKind, UploadError};
pub use retry::RetryPolicy;
pub use types::{
    AbortUploadRequest, CompleteUploadRequest, InitiateUploadRequest, PartAck, PartOutcome,
    PartReceipt, SessionState, UploadConfig, UploadEvent, UploadPartRequest, UploadReport,
};
pub use worker::{UploadWorkerPool, queue_capacity};
