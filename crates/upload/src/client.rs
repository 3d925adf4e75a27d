//! Boundary to the archival storage service.
//!
//! `RemoteArchiveClient` is implemented outside this crate (see the local
//! vault crate, or an HTTP client for a hosted service). Using a trait keeps
//! the pipeline decoupled from transport and testable with mocks.

use std::future::Future;
use std::pin::Pin;

use crate::error::ArchiveError;
use crate::types::{
    AbortUploadRequest, CompleteUploadRequest, InitiateUploadRequest, PartAck, UploadPartRequest,
};

/// Boxed future returned by [`RemoteArchiveClient`] methods.
pub type ArchiveFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ArchiveError>> + Send + 'a>>;

/// Multipart upload API of an archival vault.
///
/// Implementations must be safe to call from many workers at once.
pub trait RemoteArchiveClient: Send + Sync {
    /// Opens a multipart session and returns its identifier.
    fn initiate_upload<'a>(&'a self, req: &'a InitiateUploadRequest) -> ArchiveFuture<'a, String>;

    /// Uploads one part of an open session.
    fn upload_part<'a>(&'a self, req: &'a UploadPartRequest) -> ArchiveFuture<'a, PartAck>;

    /// Finalizes the session and returns the archive identifier.
    fn complete_upload<'a>(&'a self, req: &'a CompleteUploadRequest) -> ArchiveFuture<'a, String>;

    /// Discards an open session and any parts stored for it.
    ///
    /// Services without an abort operation can rely on the default, which
    /// does nothing.
    fn abort_upload<'a>(&'a self, req: &'a AbortUploadRequest) -> ArchiveFuture<'a, ()> {
        let _ = req;
        Box::pin(async { Ok(()) })
    }
}
