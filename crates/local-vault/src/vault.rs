use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vaultpush_transfer::{
    ContentRange, TreeHash, combine_tree_hashes, tree_hash, validate_part_size,
};
use vaultpush_upload::{
    AbortUploadRequest, ArchiveError, ArchiveErrorKind, ArchiveFuture, CompleteUploadRequest,
    InitiateUploadRequest, PartAck, RemoteArchiveClient, UploadPartRequest,
};

use crate::records::{ArchiveRecord, PartRecord, SessionRecord};
use crate::validation::{validate_session_id, validate_vault_name};

const SESSION_FILE: &str = "session.json";
const DATA_FILE: &str = "data";
const PARTS_DIR: &str = "parts";
const UPLOADS_DIR: &str = "uploads";
const ARCHIVES_DIR: &str = "archives";

/// Archive vault stored under `<root>/<region>/`.
///
/// Safe to share between workers: every operation works on its own file
/// handles, and parts of one session write disjoint byte ranges.
#[derive(Debug, Clone)]
pub struct DirectoryVault {
    base: PathBuf,
}

impl DirectoryVault {
    /// Creates a vault rooted at `root` for the given region.
    pub fn new(root: impl Into<PathBuf>, region: &str) -> Result<Self, ArchiveError> {
        validate_vault_name(region).map_err(|e| {
            ArchiveError::new(e.kind, format!("invalid region: {}", e.message))
        })?;
        Ok(Self {
            base: root.into().join(region),
        })
    }

    /// Directory holding all vaults of this region.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Location of a completed archive's bytes.
    pub fn archive_path(&self, vault: &str, archive_id: &str) -> Result<PathBuf, ArchiveError> {
        validate_vault_name(vault)?;
        validate_session_id(archive_id)?;
        Ok(self.base.join(vault).join(ARCHIVES_DIR).join(archive_id))
    }

    /// Reads the metadata sidecar of a completed archive.
    pub async fn archive_record(
        &self,
        vault: &str,
        archive_id: &str,
    ) -> Result<ArchiveRecord, ArchiveError> {
        let path = self.archive_path(vault, archive_id)?.with_extension("json");
        read_json(&path).await
    }

    /// Lists the sessions of a vault that were neither completed nor aborted.
    pub async fn pending_uploads(&self, vault: &str) -> Result<Vec<String>, ArchiveError> {
        validate_vault_name(vault)?;
        let dir = self.base.join(vault).join(UPLOADS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn upload_dir(&self, vault: &str, session_id: &str) -> Result<PathBuf, ArchiveError> {
        validate_vault_name(vault)?;
        validate_session_id(session_id)?;
        Ok(self.base.join(vault).join(UPLOADS_DIR).join(session_id))
    }

    async fn load_session(
        &self,
        dir: &Path,
        session_id: &str,
    ) -> Result<SessionRecord, ArchiveError> {
        match tokio::fs::try_exists(dir.join(SESSION_FILE)).await {
            Ok(true) => read_json(&dir.join(SESSION_FILE)).await,
            Ok(false) => Err(ArchiveError::new(
                ArchiveErrorKind::ResourceNotFound,
                format!("no such upload: {session_id}"),
            )),
            Err(e) => Err(io_error(dir, e)),
        }
    }

    async fn initiate(&self, req: &InitiateUploadRequest) -> Result<String, ArchiveError> {
        validate_vault_name(&req.vault)?;
        require("partSize", &req.part_size)?;
        let part_size: u64 = req.part_size.parse().map_err(|_| {
            invalid(format!("part size is not a number: {}", req.part_size))
        })?;
        validate_part_size(part_size).map_err(|e| invalid(e.to_string()))?;

        let session_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&req.vault, &session_id)?;
        let parts = dir.join(PARTS_DIR);
        tokio::fs::create_dir_all(&parts)
            .await
            .map_err(|e| io_error(&parts, e))?;

        let record = SessionRecord {
            vault: req.vault.clone(),
            archive_description: req.archive_description.clone(),
            part_size,
            created_at: Utc::now(),
        };
        write_json(&dir.join(SESSION_FILE), &record).await?;

        let data = dir.join(DATA_FILE);
        tokio::fs::File::create(&data)
            .await
            .map_err(|e| io_error(&data, e))?;

        info!(vault = %req.vault, session_id = %session_id, part_size, "upload session created");
        Ok(session_id)
    }

    async fn store_part(&self, req: &UploadPartRequest) -> Result<PartAck, ArchiveError> {
        require("uploadId", &req.session_id)?;
        require("range", &req.range)?;
        require("checksum", &req.checksum)?;
        let dir = self.upload_dir(&req.vault, &req.session_id)?;
        let session = self.load_session(&dir, &req.session_id).await?;

        let range: ContentRange = req.range.parse().map_err(|e| invalid(format!("{e}")))?;
        if range.first % session.part_size != 0 {
            return Err(invalid(format!(
                "range start {} is not aligned to part size {}",
                range.first, session.part_size
            )));
        }
        let len = range.byte_count();
        let is_final = range.last + 1 == range.total;
        if len > session.part_size || (!is_final && len != session.part_size) {
            return Err(invalid(format!(
                "range {} does not match part size {}",
                req.range, session.part_size
            )));
        }
        if req.body.len() as u64 != len {
            return Err(invalid(format!(
                "body is {} bytes but range {} covers {len}",
                req.body.len(),
                req.range
            )));
        }

        let expected = TreeHash::from_hex(&req.checksum)
            .map_err(|_| invalid(format!("malformed checksum: {}", req.checksum)))?;
        let actual = tree_hash(&req.body);
        if actual != expected {
            return Err(invalid(format!(
                "checksum mismatch for range {}: expected {expected}, computed {actual}",
                req.range
            )));
        }

        let data = dir.join(DATA_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&data)
            .await
            .map_err(|e| io_error(&data, e))?;
        file.seek(SeekFrom::Start(range.first))
            .await
            .map_err(|e| io_error(&data, e))?;
        file.write_all(&req.body)
            .await
            .map_err(|e| io_error(&data, e))?;
        file.flush().await.map_err(|e| io_error(&data, e))?;

        let record = PartRecord {
            first: range.first,
            last: range.last,
            total: range.total,
            tree_hash: actual.to_hex(),
        };
        let part_file = dir.join(PARTS_DIR).join(format!("{:020}.json", range.first));
        write_json(&part_file, &record).await?;

        debug!(session_id = %req.session_id, range = %req.range, "part stored");
        Ok(PartAck {
            checksum: actual.to_hex(),
        })
    }

    async fn complete(&self, req: &CompleteUploadRequest) -> Result<String, ArchiveError> {
        require("uploadId", &req.session_id)?;
        require("archiveSize", &req.archive_size)?;
        require("checksum", &req.checksum)?;
        let dir = self.upload_dir(&req.vault, &req.session_id)?;
        let session = self.load_session(&dir, &req.session_id).await?;

        let size: u64 = req.archive_size.parse().map_err(|_| {
            invalid(format!("archive size is not a number: {}", req.archive_size))
        })?;
        let expected = TreeHash::from_hex(&req.checksum)
            .map_err(|_| invalid(format!("malformed checksum: {}", req.checksum)))?;

        let parts = self.read_parts(&dir).await?;
        let mut next = 0u64;
        for part in &parts {
            if part.total != size {
                return Err(invalid(format!(
                    "part at {} was uploaded for a {}-byte archive, not {size}",
                    part.first, part.total
                )));
            }
            if part.first != next {
                return Err(invalid(format!("archive is missing bytes {next}-{}", part.first)));
            }
            next = part.last + 1;
        }
        if next != size {
            return Err(invalid(format!(
                "archive size {size} does not match uploaded bytes {next}"
            )));
        }

        let hashes = parts
            .iter()
            .map(|p| TreeHash::from_hex(&p.tree_hash))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                ArchiveError::new(ArchiveErrorKind::Other, format!("corrupt part record: {e}"))
            })?;
        let actual = combine_tree_hashes(&hashes);
        if actual != expected {
            return Err(invalid(format!(
                "archive checksum mismatch: expected {expected}, computed {actual}"
            )));
        }

        let archive_id = Uuid::new_v4().to_string();
        let archives = self.base.join(&req.vault).join(ARCHIVES_DIR);
        tokio::fs::create_dir_all(&archives)
            .await
            .map_err(|e| io_error(&archives, e))?;

        let target = archives.join(&archive_id);
        tokio::fs::rename(dir.join(DATA_FILE), &target)
            .await
            .map_err(|e| io_error(&target, e))?;

        let record = ArchiveRecord {
            archive_id: archive_id.clone(),
            vault: req.vault.clone(),
            archive_description: session.archive_description,
            size,
            tree_hash: actual.to_hex(),
            created_at: session.created_at,
            completed_at: Utc::now(),
        };
        write_json(&target.with_extension("json"), &record).await?;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %e, "failed to remove finished upload directory");
        }

        info!(
            vault = %req.vault,
            session_id = %req.session_id,
            archive_id = %archive_id,
            size,
            "archive stored"
        );
        Ok(archive_id)
    }

    async fn discard(&self, req: &AbortUploadRequest) -> Result<(), ArchiveError> {
        require("uploadId", &req.session_id)?;
        let dir = self.upload_dir(&req.vault, &req.session_id)?;
        self.load_session(&dir, &req.session_id).await?;
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        info!(vault = %req.vault, session_id = %req.session_id, "upload session aborted");
        Ok(())
    }

    /// Stored part records ordered by first byte.
    async fn read_parts(&self, dir: &Path) -> Result<Vec<PartRecord>, ArchiveError> {
        let parts_dir = dir.join(PARTS_DIR);
        let mut entries = tokio::fs::read_dir(&parts_dir)
            .await
            .map_err(|e| io_error(&parts_dir, e))?;

        let mut parts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&parts_dir, e))?
        {
            let record: PartRecord = read_json(&entry.path()).await?;
            parts.push(record);
        }
        parts.sort_by_key(|p| p.first);
        Ok(parts)
    }
}

impl RemoteArchiveClient for DirectoryVault {
    fn initiate_upload<'a>(&'a self, req: &'a InitiateUploadRequest) -> ArchiveFuture<'a, String> {
        Box::pin(self.initiate(req))
    }

    fn upload_part<'a>(&'a self, req: &'a UploadPartRequest) -> ArchiveFuture<'a, PartAck> {
        Box::pin(self.store_part(req))
    }

    fn complete_upload<'a>(&'a self, req: &'a CompleteUploadRequest) -> ArchiveFuture<'a, String> {
        Box::pin(self.complete(req))
    }

    fn abort_upload<'a>(&'a self, req: &'a AbortUploadRequest) -> ArchiveFuture<'a, ()> {
        Box::pin(self.discard(req))
    }
}

fn require(field: &str, value: &str) -> Result<(), ArchiveError> {
    if value.is_empty() {
        return Err(ArchiveError::new(
            ArchiveErrorKind::MissingParameterValue,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn invalid(message: String) -> ArchiveError {
    ArchiveError::new(ArchiveErrorKind::InvalidParameterValue, message)
}

fn io_error(path: &Path, e: std::io::Error) -> ArchiveError {
    let kind = if e.kind() == std::io::ErrorKind::NotFound {
        ArchiveErrorKind::ResourceNotFound
    } else {
        ArchiveErrorKind::Other
    };
    ArchiveError::new(kind, format!("{}: {e}", path.display()))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        ArchiveError::new(
            ArchiveErrorKind::Other,
            format!("{}: {e}", path.display()),
        )
    })
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    let content = serde_json::to_string_pretty(value).map_err(|e| {
        ArchiveError::new(ArchiveErrorKind::Other, format!("{}: {e}", path.display()))
    })?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| io_error(path, e))
}
