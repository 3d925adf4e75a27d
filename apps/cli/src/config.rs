//! Upload settings.
//!
//! Values come from three layers, highest priority first: command-line
//! flags, the optional defaults file `vaultpush/config.json` under the
//! platform config directory, and built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vaultpush_transfer::{DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE_MIB, part_size_from_mib};
use vaultpush_upload::{RetryPolicy, UploadConfig, UploadError};

use crate::cli::Cli;

/// Region used when neither a flag nor the defaults file names one.
pub const DEFAULT_REGION: &str = "local";

/// Contents of the defaults file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDefaults {
    #[serde(default)]
    pub region: Option<String>,
    /// Part size in MiB.
    #[serde(default)]
    pub part_size: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub vault_root: Option<PathBuf>,
}

impl FileDefaults {
    /// Loads the defaults file from the platform config directory.
    pub fn load() -> Self {
        Self::load_from(&defaults_path())
    }

    /// Loads defaults from `path`.
    ///
    /// A missing file yields empty defaults; an unreadable or unparsable one
    /// is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read defaults file");
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(defaults) => {
                tracing::debug!(path = %path.display(), "loaded defaults file");
                defaults
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse defaults file, using built-in defaults"
                );
                Self::default()
            }
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub upload: UploadConfig,
    pub region: String,
    pub vault_root: PathBuf,
}

impl Settings {
    /// Merges flags over file defaults over built-in defaults.
    ///
    /// Fails only on a part size that cannot be expressed in bytes; the
    /// remaining checks are left to [`UploadConfig::validate`].
    pub fn resolve(cli: Cli, defaults: FileDefaults) -> Result<Self, UploadError> {
        let part_size_mib = cli
            .part_size
            .or(defaults.part_size)
            .unwrap_or(DEFAULT_PART_SIZE_MIB);
        let part_size = part_size_from_mib(part_size_mib)
            .map_err(|e| UploadError::InvalidConfig(format!("--partSize {part_size_mib}: {e}")))?;

        let upload = UploadConfig {
            file_path: cli.file_path,
            vault: cli.vault,
            archive_description: cli.archive_description,
            part_size,
            concurrency: cli
                .concurrency
                .or(defaults.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            retry: RetryPolicy::default(),
        };

        Ok(Self {
            upload,
            region: cli
                .region
                .or(defaults.region)
                .unwrap_or_else(|| DEFAULT_REGION.into()),
            vault_root: cli
                .vault_root
                .or(defaults.vault_root)
                .unwrap_or_else(default_vault_root),
        })
    }
}

/// `<config dir>/vaultpush/config.json`.
pub fn defaults_path() -> PathBuf {
    config_base_dir().join("vaultpush").join("config.json")
}

/// `<data dir>/vaultpush`.
pub fn default_vault_root() -> PathBuf {
    data_base_dir().join("vaultpush")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}

fn data_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".local").join("share")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;
    use vaultpush_transfer::MIB;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["vaultpush", "file.bin", "--vault", "photos"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn built_in_defaults_apply() {
        let settings = Settings::resolve(cli(&[]), FileDefaults::default()).unwrap();
        assert_eq!(settings.upload.part_size, 4 * MIB);
        assert_eq!(settings.upload.concurrency, 25);
        assert_eq!(settings.region, DEFAULT_REGION);
        assert_eq!(settings.vault_root, default_vault_root());
    }

    #[test]
    fn flags_override_file_defaults() {
        let defaults = FileDefaults {
            region: Some("file-region".into()),
            part_size: Some(8),
            concurrency: Some(3),
            vault_root: Some("/srv/vaults".into()),
        };

        let settings = Settings::resolve(cli(&[]), defaults.clone()).unwrap();
        assert_eq!(settings.upload.part_size, 8 * MIB);
        assert_eq!(settings.upload.concurrency, 3);
        assert_eq!(settings.region, "file-region");
        assert_eq!(settings.vault_root, PathBuf::from("/srv/vaults"));

        let settings = Settings::resolve(
            cli(&["--partSize", "1", "--concurrency", "7", "--region", "flag-region"]),
            defaults,
        )
        .unwrap();
        assert_eq!(settings.upload.part_size, MIB);
        assert_eq!(settings.upload.concurrency, 7);
        assert_eq!(settings.region, "flag-region");
    }

    #[test]
    fn invalid_part_size_is_config_error() {
        for mib in ["3", "8192", "0"] {
            let err = Settings::resolve(cli(&["--partSize", mib]), FileDefaults::default())
                .unwrap_err();
            assert!(err.is_config(), "{mib}");
        }
    }

    #[test]
    fn loads_camel_case_defaults_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"partSize": 16, "vaultRoot": "/data"}"#).unwrap();

        let defaults = FileDefaults::load_from(&path);
        assert_eq!(defaults.part_size, Some(16));
        assert_eq!(defaults.vault_root, Some(PathBuf::from("/data")));
        assert!(defaults.region.is_none());
    }

    #[test]
    fn broken_or_missing_defaults_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(FileDefaults::load_from(&path), FileDefaults::default());

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(FileDefaults::load_from(&path), FileDefaults::default());
    }
}
