//! Tree hashing and fixed-size file partitioning for multipart archive uploads.
//!
//! An archive is uploaded as a sequence of equally sized parts (the last one
//! may be shorter). Every part carries a SHA-256 tree hash of its bytes and the
//! finished archive carries the tree hash of the whole file. Because part sizes
//! are power-of-two multiples of the 1 MiB leaf size, the archive hash can also
//! be derived from the per-part hashes with [`combine_tree_hashes`].

mod chunked;
mod progress;
mod treehash;
mod types;
mod validation;

pub use chunked::{PartRanges, PartReader, part_ranges, total_parts};
pub use progress::SpeedCalculator;
pub use treehash::{TreeHash, TreeHasher, combine_tree_hashes, tree_hash, tree_hash_file};
pub use types::{Chunk, ContentRange, PartRange};
pub use validation::{part_size_from_mib, validate_part_size};

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Size of a tree hash leaf block.
pub const LEAF_SIZE: usize = 1024 * 1024;

/// Smallest accepted part size: 1 MiB.
pub const MIN_PART_SIZE: u64 = MIB;

/// Largest accepted part size: 4 GiB.
pub const MAX_PART_SIZE: u64 = 4096 * MIB;

/// Part size used when none is configured, in MiB.
pub const DEFAULT_PART_SIZE_MIB: u64 = 4;

/// Number of concurrent part uploads used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 25;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid part size: {0}")]
    InvalidPartSize(String),

    #[error("invalid content range: {0}")]
    InvalidRange(String),

    #[error("invalid tree hash: {0}")]
    InvalidHash(String),

    #[error("file ended early at offset {offset}: expected {expected} more bytes")]
    ShortRead { offset: u64, expected: u64 },
}
