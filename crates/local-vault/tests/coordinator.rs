//! End-to-end uploads through `UploadCoordinator` into a `DirectoryVault`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use vaultpush_local_vault::DirectoryVault;
use vaultpush_transfer::{MIB, tree_hash, tree_hash_file};
use vaultpush_upload::{
    AbortUploadRequest, ArchiveError, ArchiveErrorKind, ArchiveFuture, CompleteUploadRequest,
    InitiateUploadRequest, PartAck, RemoteArchiveClient, RetryPolicy, SessionState, UploadConfig,
    UploadCoordinator, UploadError, UploadEvent, UploadPartRequest,
};

const VAULT: &str = "backups";

fn write_source(dir: &TempDir, name: &str, len: u64) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 253) as u8).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

fn config(path: &Path, part_mib: u64, concurrency: usize) -> UploadConfig {
    let mut config = UploadConfig::new(path, VAULT);
    config.part_size = part_mib * MIB;
    config.concurrency = concurrency;
    config.retry = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_factor: 2.0,
    };
    config
}

/// Wraps the vault and fails selected part uploads.
struct FlakyVault {
    inner: DirectoryVault,
    /// Remaining failures per part start offset.
    failures: Mutex<HashMap<u64, (u32, ArchiveErrorKind)>>,
    part_calls: Mutex<u32>,
}

impl FlakyVault {
    fn new(inner: DirectoryVault) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            part_calls: Mutex::new(0),
        }
    }

    fn fail(self, start: u64, times: u32, kind: ArchiveErrorKind) -> Self {
        self.failures.lock().unwrap().insert(start, (times, kind));
        self
    }
}

impl RemoteArchiveClient for FlakyVault {
    fn initiate_upload<'a>(&'a self, req: &'a InitiateUploadRequest) -> ArchiveFuture<'a, String> {
        self.inner.initiate_upload(req)
    }

    fn upload_part<'a>(&'a self, req: &'a UploadPartRequest) -> ArchiveFuture<'a, PartAck> {
        *self.part_calls.lock().unwrap() += 1;
        let start: u64 = req
            .range
            .trim_start_matches("bytes ")
            .split('-')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(u64::MAX);

        let injected = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&start) {
                Some((remaining, kind)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(*kind)
                }
                _ => None,
            }
        };

        match injected {
            Some(kind) => Box::pin(async move { Err(ArchiveError::new(kind, "injected")) }),
            None => self.inner.upload_part(req),
        }
    }

    fn complete_upload<'a>(&'a self, req: &'a CompleteUploadRequest) -> ArchiveFuture<'a, String> {
        self.inner.complete_upload(req)
    }

    fn abort_upload<'a>(&'a self, req: &'a AbortUploadRequest) -> ArchiveFuture<'a, ()> {
        self.inner.abort_upload(req)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uploads_file_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let (path, data) = write_source(&dir, "source.bin", 10 * MIB);
    let vault = DirectoryVault::new(dir.path().join("vaults"), "local").unwrap();

    let coordinator = UploadCoordinator::new(Arc::new(vault.clone()));
    let report = coordinator.upload(&config(&path, 4, 3)).await.unwrap();

    assert_eq!(coordinator.state(), SessionState::Completed);
    assert_eq!(report.parts, 3);
    assert_eq!(report.archive_size, 10 * MIB);
    assert_eq!(report.tree_hash, tree_hash_file(&path).unwrap());

    let stored = std::fs::read(vault.archive_path(VAULT, &report.archive_id).unwrap()).unwrap();
    assert_eq!(stored, data);

    let record = vault.archive_record(VAULT, &report.archive_id).await.unwrap();
    assert_eq!(record.tree_hash, report.tree_hash.to_hex());
    assert!(vault.pending_uploads(VAULT).await.unwrap().is_empty());
}

#[tokio::test]
async fn uploads_empty_file() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_source(&dir, "empty.bin", 0);
    let vault = DirectoryVault::new(dir.path().join("vaults"), "local").unwrap();

    let coordinator = UploadCoordinator::new(Arc::new(vault.clone()));
    let report = coordinator.upload(&config(&path, 1, 4)).await.unwrap();

    assert_eq!(report.parts, 0);
    assert_eq!(report.tree_hash, tree_hash(&[]));
    let stored = std::fs::read(vault.archive_path(VAULT, &report.archive_id).unwrap()).unwrap();
    assert!(stored.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let (path, data) = write_source(&dir, "source.bin", 5 * MIB + 17);
    let vault = DirectoryVault::new(dir.path().join("vaults"), "local").unwrap();

    let flaky = Arc::new(
        FlakyVault::new(vault.clone())
            .fail(0, 2, ArchiveErrorKind::ServiceUnavailable)
            .fail(3 * MIB, 1, ArchiveErrorKind::RequestTimeout),
    );
    let mut coordinator = UploadCoordinator::new(flaky.clone());
    let mut events = coordinator.take_events().unwrap();

    let report = coordinator.upload(&config(&path, 1, 2)).await.unwrap();
    assert_eq!(report.parts, 6);
    assert_eq!(*flaky.part_calls.lock().unwrap(), 6 + 3);

    let stored = std::fs::read(vault.archive_path(VAULT, &report.archive_id).unwrap()).unwrap();
    assert_eq!(stored, data);

    let mut retries = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, UploadEvent::PartRetrying { .. }) {
            retries += 1;
        }
    }
    assert_eq!(retries, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn permanent_failure_aborts_session() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_source(&dir, "source.bin", 12 * MIB);
    let vault = DirectoryVault::new(dir.path().join("vaults"), "local").unwrap();

    let flaky = Arc::new(FlakyVault::new(vault.clone()).fail(
        4 * MIB,
        u32::MAX,
        ArchiveErrorKind::InvalidParameterValue,
    ));
    let coordinator = UploadCoordinator::new(flaky);

    let err = coordinator.upload(&config(&path, 4, 1)).await.unwrap_err();
    match err {
        UploadError::PartUpload {
            part_index,
            attempts,
            ..
        } => {
            assert_eq!(part_index, 1);
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(coordinator.state(), SessionState::Aborted);

    // The aborted session leaves nothing behind.
    assert!(vault.pending_uploads(VAULT).await.unwrap().is_empty());
    assert!(!vault.base_path().join(VAULT).join("archives").exists());
}

#[tokio::test]
async fn invalid_vault_name_fails_initiation() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_source(&dir, "source.bin", MIB);
    let vault = DirectoryVault::new(dir.path().join("vaults"), "local").unwrap();

    let coordinator = UploadCoordinator::new(Arc::new(vault));
    let mut cfg = config(&path, 1, 1);
    cfg.vault = "no/slashes".into();

    let err = coordinator.upload(&cfg).await.unwrap_err();
    match err {
        UploadError::Initiate(source) => {
            assert_eq!(source.kind, ArchiveErrorKind::InvalidParameterValue)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(coordinator.state(), SessionState::Aborted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_sessions_produce_separate_archives() {
    let dir = TempDir::new().unwrap();
    let (path, data) = write_source(&dir, "source.bin", 3 * MIB + 5);
    let vault = Arc::new(DirectoryVault::new(dir.path().join("vaults"), "local").unwrap());

    let first = UploadCoordinator::new(vault.clone());
    let second = UploadCoordinator::new(vault.clone());
    let cfg = config(&path, 1, 4);

    let (a, b) = tokio::join!(first.upload(&cfg), second.upload(&cfg));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.archive_id, b.archive_id);
    assert_eq!(a.tree_hash, b.tree_hash);

    for id in [&a.archive_id, &b.archive_id] {
        let stored = std::fs::read(vault.archive_path(VAULT, id).unwrap()).unwrap();
        assert_eq!(stored, data);
    }
}
