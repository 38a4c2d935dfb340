//! Backup and restore pipelines.
//!
//! Backup: `Idle -> Dumping -> Uploading -> SweepingLocal -> SweepingCloud -> Done`.
//! Restore: `Idle -> [Fetching] -> Restoring -> CleaningTemp -> Done`.
//!
//! Steps run strictly in sequence and the first failing step ends the run. In
//! particular no retention sweep runs unless the upload was confirmed, so a
//! bad upload never prunes the last good copies.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::artifact::{self, ArtifactName};
use crate::cadapter::client::ObjectBackend;
use crate::error::ArchiveError;
use crate::exec::DatabaseTool;
use crate::retention::{self, RetentionPolicy, SweepReport};
use crate::transfer::{DownloadReport, TransferEngine, UploadReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    Idle,
    Dumping,
    Uploading,
    SweepingLocal,
    SweepingCloud,
    Done,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupStage::Idle => "idle",
            BackupStage::Dumping => "dump",
            BackupStage::Uploading => "upload",
            BackupStage::SweepingLocal => "local retention sweep",
            BackupStage::SweepingCloud => "cloud retention sweep",
            BackupStage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    Idle,
    Fetching,
    Restoring,
    CleaningTemp,
    Done,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestoreStage::Idle => "idle",
            RestoreStage::Fetching => "fetch",
            RestoreStage::Restoring => "restore",
            RestoreStage::CleaningTemp => "temp file cleanup",
            RestoreStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// The step a pipeline failed in, with the underlying error.
#[derive(Error, Debug)]
#[error("{stage} step failed: {source}")]
pub struct StageError<S: fmt::Display + fmt::Debug> {
    pub stage: S,
    #[source]
    pub source: ArchiveError,
}

impl<S: fmt::Display + fmt::Debug> StageError<S> {
    fn new(stage: S, source: ArchiveError) -> Self {
        Self { stage, source }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Archive key prefix (`BACKUP_DIR`).
    pub backup_prefix: String,
    /// Where dumps are written before upload.
    pub local_dir: PathBuf,
    /// Where cloud artifacts are downloaded before restore.
    pub restore_tmp_dir: PathBuf,
    pub local_retention: RetentionPolicy,
    pub cloud_retention: RetentionPolicy,
}

impl PipelineSettings {
    /// Listing scope for the cloud tier: `<prefix>/`, or the whole bucket
    /// when no prefix is configured.
    pub fn list_prefix(&self) -> Option<String> {
        let prefix = self.backup_prefix.trim_matches('/');
        (!prefix.is_empty()).then(|| format!("{prefix}/"))
    }
}

#[derive(Debug)]
pub struct BackupReport {
    pub artifact: ArtifactName,
    pub local_path: PathBuf,
    pub upload: UploadReport,
    pub local_sweep: SweepReport,
    pub cloud_sweep: SweepReport,
    pub stages: Vec<BackupStage>,
}

#[derive(Debug)]
pub struct PruneReport {
    pub local_sweep: SweepReport,
    pub cloud_sweep: SweepReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreSource {
    /// An artifact already on local disk; it is left in place.
    LocalFile(PathBuf),
    /// An archive key; the object is fetched to a temp file first.
    Archive(String),
}

#[derive(Debug)]
pub struct RestoreReport {
    pub source: RestoreSource,
    pub fetched: Option<DownloadReport>,
    pub stages: Vec<RestoreStage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedArtifact {
    pub key: String,
    pub name: ArtifactName,
}

pub struct Orchestrator<B, D> {
    engine: TransferEngine<B>,
    tool: D,
    settings: PipelineSettings,
}

impl<B: ObjectBackend, D: DatabaseTool> Orchestrator<B, D> {
    pub fn new(engine: TransferEngine<B>, tool: D, settings: PipelineSettings) -> Self {
        Self {
            engine,
            tool,
            settings,
        }
    }

    pub fn engine(&self) -> &TransferEngine<B> {
        &self.engine
    }

    pub fn tool(&self) -> &D {
        &self.tool
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Dumps `db_url` to a new artifact stamped with `now`, uploads it, then
    /// applies the local and cloud retention policies.
    pub async fn backup(
        &self,
        db_url: &str,
        now: DateTime<Utc>,
    ) -> Result<BackupReport, StageError<BackupStage>> {
        let mut stages = vec![BackupStage::Idle];
        let artifact = ArtifactName::at(now);
        let local_path = self.settings.local_dir.join(artifact.to_string());
        let key = artifact.archive_key(&self.settings.backup_prefix);

        stages.push(BackupStage::Dumping);
        info!(path = %local_path.display(), "dumping database");
        fs::create_dir_all(&self.settings.local_dir)
            .await
            .map_err(|e| {
                StageError::new(
                    BackupStage::Dumping,
                    ArchiveError::io(&self.settings.local_dir, e),
                )
            })?;
        self.tool
            .dump(db_url, &local_path)
            .await
            .map_err(|e| StageError::new(BackupStage::Dumping, e))?;

        stages.push(BackupStage::Uploading);
        info!(%key, "uploading artifact");
        let upload = self
            .engine
            .upload(&local_path, &key)
            .await
            .map_err(|e| {
                log_abort_failure(&e);
                StageError::new(BackupStage::Uploading, e)
            })?;
        info!(
            %key,
            size = upload.size,
            parts = upload.part_count(),
            "artifact archived"
        );

        stages.push(BackupStage::SweepingLocal);
        let local_sweep = self
            .sweep_local(now)
            .await
            .map_err(|e| StageError::new(BackupStage::SweepingLocal, e))?;

        stages.push(BackupStage::SweepingCloud);
        let cloud_sweep = self
            .sweep_cloud(now)
            .await
            .map_err(|e| StageError::new(BackupStage::SweepingCloud, e))?;

        stages.push(BackupStage::Done);
        info!(%key, "backup completed");
        Ok(BackupReport {
            artifact,
            local_path,
            upload,
            local_sweep,
            cloud_sweep,
            stages,
        })
    }

    /// Runs both retention sweeps without taking a new backup.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<PruneReport, StageError<BackupStage>> {
        let local_sweep = self
            .sweep_local(now)
            .await
            .map_err(|e| StageError::new(BackupStage::SweepingLocal, e))?;
        let cloud_sweep = self
            .sweep_cloud(now)
            .await
            .map_err(|e| StageError::new(BackupStage::SweepingCloud, e))?;
        Ok(PruneReport {
            local_sweep,
            cloud_sweep,
        })
    }

    /// Restores `db_url` from `source`. A fetched temp file is removed even
    /// when the restore itself fails; nothing is cleaned if the fetch failed.
    pub async fn restore(
        &self,
        db_url: &str,
        source: RestoreSource,
    ) -> Result<RestoreReport, StageError<RestoreStage>> {
        let mut stages = vec![RestoreStage::Idle];

        let (path, fetched) = match &source {
            RestoreSource::LocalFile(path) => (path.clone(), None),
            RestoreSource::Archive(key) => {
                stages.push(RestoreStage::Fetching);
                let temp = self
                    .temp_path_for(key)
                    .map_err(|e| StageError::new(RestoreStage::Fetching, e))?;
                info!(%key, path = %temp.display(), "fetching artifact");
                let report = self
                    .engine
                    .download(key, &temp)
                    .await
                    .map_err(|e| StageError::new(RestoreStage::Fetching, e))?;
                (temp, Some(report))
            }
        };

        stages.push(RestoreStage::Restoring);
        info!(path = %path.display(), "restoring database");
        let restored = self.tool.restore(db_url, &path).await;

        stages.push(RestoreStage::CleaningTemp);
        let cleaned = match fetched {
            Some(_) => fs::remove_file(&path)
                .await
                .map_err(|e| ArchiveError::io(&path, e)),
            None => Ok(()),
        };

        if let Err(e) = restored {
            if let Err(cleanup) = &cleaned {
                warn!(error = %cleanup, "temp file left behind after failed restore");
            }
            return Err(StageError::new(RestoreStage::Restoring, e));
        }
        cleaned.map_err(|e| StageError::new(RestoreStage::CleaningTemp, e))?;

        stages.push(RestoreStage::Done);
        info!("database restored");
        Ok(RestoreReport {
            source,
            fetched,
            stages,
        })
    }

    /// Archived artifacts under the configured prefix, oldest first. Foreign
    /// objects are omitted.
    pub async fn list_archives(&self) -> Result<Vec<ArchivedArtifact>, ArchiveError> {
        let prefix = self.settings.list_prefix();
        let keys = self.engine.backend().list_objects(prefix.as_deref()).await?;
        let mut archives: Vec<ArchivedArtifact> = keys
            .into_iter()
            .filter_map(|key| ArtifactName::from_key(&key).map(|name| ArchivedArtifact { key, name }))
            .collect();
        archives.sort_by_key(|a| a.name);
        Ok(archives)
    }

    async fn sweep_local(&self, now: DateTime<Utc>) -> Result<SweepReport, ArchiveError> {
        let dir = &self.settings.local_dir;
        let report =
            retention::sweep_local(dir, &self.settings.local_retention, now).await?;
        log_sweep("local", &dir.display().to_string(), &report);
        Ok(report)
    }

    async fn sweep_cloud(&self, now: DateTime<Utc>) -> Result<SweepReport, ArchiveError> {
        let prefix = self.settings.list_prefix();
        let report = retention::sweep_cloud(
            self.engine.backend(),
            prefix.as_deref(),
            &self.settings.cloud_retention,
            now,
        )
        .await?;
        log_sweep("cloud", prefix.as_deref().unwrap_or("<bucket>"), &report);
        Ok(report)
    }

    fn temp_path_for(&self, key: &str) -> Result<PathBuf, ArchiveError> {
        let name = artifact::key_file_name(key);
        if name.is_empty() || name == "." || name == ".." {
            return Err(ArchiveError::ConfigurationInvalid {
                name: "key",
                reason: format!("`{key}` does not name an object"),
            });
        }
        Ok(Path::new(&self.settings.restore_tmp_dir).join(name))
    }
}

fn log_sweep(tier: &str, scope: &str, report: &SweepReport) {
    for key in &report.deleted {
        info!(tier, %key, "deleted expired backup");
    }
    for failure in &report.failures {
        warn!(tier, target = %failure.target, error = %failure.error, "failed to delete backup");
    }
    info!(
        tier,
        scope,
        deleted = report.deleted.len(),
        retained = report.retained.len(),
        failed = report.failures.len(),
        "retention sweep completed"
    );
}

fn log_abort_failure(err: &ArchiveError) {
    if let ArchiveError::MultipartAborted {
        key,
        upload_id,
        abort_failure: Some(abort),
        ..
    } = err
    {
        warn!(%key, %upload_id, error = %abort, "abort of failed multipart upload also failed");
    }
}
