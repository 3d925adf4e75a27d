mod cli;
mod config;
mod progress;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vaultpush_local_vault::DirectoryVault;
use vaultpush_upload::{UploadCoordinator, UploadError};

use cli::Cli;
use config::{FileDefaults, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info,vaultpush=debug" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// 2 for invalid input, 1 for everything else.
fn exit_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<UploadError>() {
        Some(upload) if upload.is_config() => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(cli, FileDefaults::load())?;
    info!(
        file = %settings.upload.file_path.display(),
        vault = %settings.upload.vault,
        description = %settings.upload.archive_description,
        part_size = settings.upload.part_size,
        concurrency = settings.upload.concurrency,
        region = %settings.region,
        vault_root = %settings.vault_root.display(),
        "effective configuration"
    );
    settings.upload.validate().await?;

    let vault = DirectoryVault::new(&settings.vault_root, &settings.region)
        .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;
    let mut coordinator = UploadCoordinator::new(Arc::new(vault));
    let events = coordinator
        .take_events()
        .context("upload event stream already taken")?;
    let reporter = tokio::spawn(progress::report(events));

    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling upload");
            cancel.cancel();
        }
    });

    let result = coordinator.upload(&settings.upload).await;
    // Closes the event stream so the reporter drains and exits.
    drop(coordinator);
    if let Err(e) = reporter.await {
        warn!(error = %e, "progress reporter failed");
    }

    let report = result?;
    info!(
        archive_id = %report.archive_id,
        tree_hash = %report.tree_hash,
        size = report.archive_size,
        parts = report.parts,
        elapsed = ?report.elapsed,
        "upload finished"
    );
    println!("{}", report.archive_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_two() {
        let e = anyhow::Error::from(UploadError::InvalidConfig("bad".into()));
        assert_eq!(exit_code(&e), 2);

        let e = anyhow::Error::from(UploadError::Cancelled {
            session_id: "s".into(),
        });
        assert_eq!(exit_code(&e), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
