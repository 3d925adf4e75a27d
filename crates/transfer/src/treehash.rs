use std::fmt;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{LEAF_SIZE, TransferError};

/// A 256-bit tree hash digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeHash([u8; 32]);

impl TreeHash {
    /// Parses a lowercase or uppercase hex digest.
    pub fn from_hex(s: &str) -> Result<Self, TransferError> {
        let decoded = hex::decode(s).map_err(|e| TransferError::InvalidHash(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| TransferError::InvalidHash(format!("{} bytes", v.len())))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding, the form sent on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHash({})", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Streaming hasher
// ---------------------------------------------------------------------------

/// Incremental tree hasher.
///
/// Input is cut into 1 MiB leaves regardless of how it is fed, so any
/// sequence of [`update`](Self::update) calls over the same bytes yields the
/// same digest.
pub struct TreeHasher {
    leaves: Vec<[u8; 32]>,
    current: Sha256,
    current_len: usize,
}

impl Default for TreeHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeHasher {
    pub fn new() -> Self {
        Self {
            leaves: Vec::new(),
            current: Sha256::new(),
            current_len: 0,
        }
    }

    /// Feeds more bytes into the hasher.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (LEAF_SIZE - self.current_len).min(data.len());
            self.current.update(&data[..take]);
            self.current_len += take;
            data = &data[take..];
            if self.current_len == LEAF_SIZE {
                self.finish_leaf();
            }
        }
    }

    /// Returns the root of the tree.
    ///
    /// Empty input hashes to SHA-256 of the empty byte string.
    pub fn finalize(mut self) -> TreeHash {
        if self.current_len > 0 || self.leaves.is_empty() {
            self.finish_leaf();
        }
        TreeHash(reduce_level(self.leaves))
    }

    fn finish_leaf(&mut self) {
        let leaf = std::mem::take(&mut self.current).finalize();
        self.leaves.push(to_array(&leaf));
        self.current_len = 0;
    }
}

impl std::io::Write for TreeHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Computes the tree hash of `data`.
pub fn tree_hash(data: &[u8]) -> TreeHash {
    let mut hasher = TreeHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes the tree hash of an entire file, reading it sequentially.
pub fn tree_hash_file(path: &Path) -> Result<TreeHash, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = TreeHasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Combines per-part tree hashes (in part order) into the archive tree hash.
///
/// Valid when every part except the last spans the same power-of-two number
/// of leaves: each part root is then a node of the whole-file tree, and
/// reducing the part roots with the same pairing rule reaches the same root.
/// No parts means an empty archive.
pub fn combine_tree_hashes(parts: &[TreeHash]) -> TreeHash {
    if parts.is_empty() {
        return tree_hash(&[]);
    }
    TreeHash(reduce_level(parts.iter().map(|h| h.0).collect()))
}

/// Pairs adjacent nodes until one remains. An odd node out is promoted as is.
fn reduce_level(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    to_array(&hasher.finalize())
}

fn to_array(digest: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest);
    out
}
