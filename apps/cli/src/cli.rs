use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments.
///
/// Numeric options are optional so that values from the defaults file apply
/// when a flag is not given.
#[derive(Debug, Parser)]
#[command(name = "vaultpush", version)]
#[command(about = "Upload a file to an archive vault as a parallel multipart upload")]
pub struct Cli {
    /// File to upload
    #[arg(value_name = "FILE_PATH")]
    pub file_path: PathBuf,

    /// Vault that receives the archive
    #[arg(long)]
    pub vault: String,

    /// Description stored with the resulting archive
    #[arg(long = "archiveDescription", default_value = "")]
    pub archive_description: String,

    /// Part size in MiB: a power of two between 1 and 4096 [default: 4]
    #[arg(long = "partSize", value_name = "MIB")]
    pub part_size: Option<u64>,

    /// Number of parts uploaded in parallel [default: 25]
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Region whose vaults are used
    #[arg(long)]
    pub region: Option<String>,

    /// Directory holding the vaults
    #[arg(long = "vault-root", value_name = "DIR")]
    pub vault_root: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
}
