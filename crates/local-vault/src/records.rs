//! JSON records kept next to session and archive data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of an open multipart session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub vault: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub archive_description: String,
    pub part_size: u64,
    pub created_at: DateTime<Utc>,
}

/// One stored part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    pub first: u64,
    pub last: u64,
    pub total: u64,
    pub tree_hash: String,
}

/// Metadata of a finished archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub archive_id: String,
    pub vault: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub archive_description: String,
    pub size: u64,
    pub tree_hash: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
