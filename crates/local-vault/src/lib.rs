//! Directory-backed archive vault.
//!
//! Implements the multipart upload API on top of a local directory, with
//! the same validation a hosted archival service applies: part ranges must
//! be aligned to the session's part size, every part must match its tree
//! hash and completion must cover the whole archive.
//!
//! # Layout
//!
//! ```text
//! <root>/<vault>/uploads/<session id>/session.json
//! <root>/<vault>/uploads/<session id>/data
//! <root>/<vault>/uploads/<session id>/parts/<first byte>.json
//! <root>/<vault>/archives/<archive id>
//! <root>/<vault>/archives/<archive id>.json
//! ```

mod records;
mod validation;
mod vault;

pub use records::{ArchiveRecord, PartRecord, SessionRecord};
pub use validation::{validate_session_id, validate_vault_name};
pub use vault::DirectoryVault;
