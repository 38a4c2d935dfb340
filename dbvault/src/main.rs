use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use dbvault::cadapter::ObjectBackend;
use dbvault::cadapter::localfs::LocalFsBackend;
use dbvault::cadapter::s3::S3Backend;
use dbvault::cli::{Cli, Commands};
use dbvault::config::{Config, StoreConfig};
use dbvault::error::{ArchiveError, ErrorClass};
use dbvault::orchestrator::{Orchestrator, RestoreSource};
use dbvault::transfer::TransferEngine;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(class = ?failure_class(&e), "{e:#}");
        std::process::exit(1);
    }
}

/// Class of the first [`ArchiveError`] in the cause chain.
fn failure_class(e: &anyhow::Error) -> Option<ErrorClass> {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<ArchiveError>())
        .map(ArchiveError::class)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.command == Commands::Automate && !cli.args.automatic_backup {
        info!("AUTOMATIC_BACKUP is not enabled, skipping backup");
        return Ok(());
    }

    let config = Config::from_args(&cli.args).context("invalid configuration")?;
    match config.store.clone() {
        StoreConfig::S3(s3) => {
            info!(bucket = %s3.bucket, endpoint = %s3.endpoint, "using S3 store");
            dispatch(S3Backend::new(&s3).await, &config, cli.command).await
        }
        StoreConfig::LocalFs { root } => {
            info!(root = %root.display(), "using local directory store");
            dispatch(LocalFsBackend::new(root), &config, cli.command).await
        }
    }
}

async fn dispatch<B: ObjectBackend>(backend: B, config: &Config, command: Commands) -> anyhow::Result<()> {
    let engine = TransferEngine::new(backend, config.transfer);
    let orchestrator = Orchestrator::new(engine, config.tools.clone(), config.pipeline.clone());

    match command {
        Commands::Backup | Commands::Automate => {
            let report = orchestrator.backup(config.backup_db_url()?, Utc::now()).await?;
            info!(
                key = %report.upload.key,
                local_deleted = report.local_sweep.deleted_count(),
                cloud_deleted = report.cloud_sweep.deleted_count(),
                "backup run finished"
            );
        }
        Commands::Restore { file, key } => {
            let source = match (file, key) {
                (Some(path), _) => RestoreSource::LocalFile(path),
                (None, Some(key)) => RestoreSource::Archive(key),
                (None, None) => anyhow::bail!("restore needs --file or --key"),
            };
            orchestrator.restore(config.restore_db_url()?, source).await?;
        }
        Commands::List => {
            let archives = orchestrator
                .list_archives()
                .await
                .context("failed to list archived backups")?;
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["snapshot (UTC)", "key"]);
            for archive in archives {
                let taken = archive
                    .name
                    .created_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(vec![taken, archive.key]);
            }
            println!("{table}");
        }
        Commands::Prune => {
            let report = orchestrator.prune(Utc::now()).await?;
            info!(
                local_deleted = report.local_sweep.deleted_count(),
                cloud_deleted = report.cloud_sweep.deleted_count(),
                "prune finished"
            );
        }
    }
    Ok(())
}
