use std::path::PathBuf;

use crate::cadapter::s3::S3Config;
use crate::cli::{Args, StoreKind};
use crate::error::{ArchiveError, Result};
use crate::exec::PgTools;
use crate::orchestrator::PipelineSettings;
use crate::retention::{MAX_RETAIN_DAYS, RetentionPolicy};
use crate::transfer::{ChunkLayout, TransferConfig};

/// S3 rejects non-final parts smaller than this.
pub const S3_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum StoreConfig {
    S3(S3Config),
    LocalFs { root: PathBuf },
}

/// Settings for one run, resolved once from arguments and environment and
/// passed to the constructors that need them.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub pipeline: PipelineSettings,
    pub transfer: TransferConfig,
    pub tools: PgTools,
    pub backup_db_url: Option<String>,
    pub restore_db_url: Option<String>,
    pub automatic_backup: bool,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn required(value: &Option<String>, name: &'static str) -> Result<String> {
    present(value).ok_or(ArchiveError::ConfigurationMissing(name))
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let store = match args.store {
            StoreKind::S3 => {
                let endpoint = match present(&args.s3_endpoint) {
                    Some(endpoint) => endpoint,
                    None => S3Config::r2_endpoint(&required(&args.account_id, "ACCOUNT_ID")?),
                };
                StoreConfig::S3(S3Config {
                    bucket: required(&args.bucket_name, "BUCKET_NAME")?,
                    endpoint,
                    region: args.s3_region.clone(),
                    access_key_id: required(&args.access_key_id, "ACCESS_KEY_ID")?,
                    secret_access_key: required(&args.secret_access_key, "SECRET_ACCESS_KEY")?,
                })
            }
            StoreKind::Localfs => StoreConfig::LocalFs {
                root: args
                    .local_store_root
                    .clone()
                    .ok_or(ArchiveError::ConfigurationMissing("LOCAL_STORE_ROOT"))?,
            },
        };

        if args.part_size == 0 {
            return Err(ArchiveError::ConfigurationInvalid {
                name: "PART_SIZE_BYTES",
                reason: "must be positive".into(),
            });
        }
        if matches!(store, StoreConfig::S3(_)) && args.part_size < S3_MIN_PART_SIZE {
            return Err(ArchiveError::ConfigurationInvalid {
                name: "PART_SIZE_BYTES",
                reason: format!("S3 requires parts of at least {S3_MIN_PART_SIZE} bytes"),
            });
        }
        if args.max_in_flight_parts == 0 {
            return Err(ArchiveError::ConfigurationInvalid {
                name: "MAX_IN_FLIGHT_PARTS",
                reason: "must be positive".into(),
            });
        }
        for (name, days) in [
            ("LOCAL_RETAIN_DAYS", args.local_retain_days),
            ("CLOUD_RETAIN_DAYS", args.cloud_retain_days),
        ] {
            if !(0..=MAX_RETAIN_DAYS).contains(&days) {
                return Err(ArchiveError::ConfigurationInvalid {
                    name,
                    reason: format!("{days} is outside 0..={MAX_RETAIN_DAYS}"),
                });
            }
        }

        let local_retention = if args.keep_local_backup {
            RetentionPolicy::days(args.local_retain_days)
        } else {
            RetentionPolicy::delete_all()
        };

        Ok(Config {
            store,
            pipeline: PipelineSettings {
                backup_prefix: required(&args.backup_dir, "BACKUP_DIR")?,
                local_dir: args.local_backup_dir.clone(),
                restore_tmp_dir: args
                    .restore_tmp_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                local_retention,
                cloud_retention: RetentionPolicy::days(args.cloud_retain_days),
            },
            transfer: TransferConfig {
                layout: ChunkLayout::new(args.part_size),
                max_in_flight_parts: args.max_in_flight_parts,
            },
            tools: PgTools {
                pg_dump: args.pg_dump.clone(),
                pg_restore: args.pg_restore.clone(),
            },
            backup_db_url: present(&args.backup_db_url),
            restore_db_url: present(&args.restore_db_url),
            automatic_backup: args.automatic_backup,
        })
    }

    pub fn backup_db_url(&self) -> Result<&str> {
        self.backup_db_url
            .as_deref()
            .ok_or(ArchiveError::ConfigurationMissing("BACKUP_DB_URL"))
    }

    pub fn restore_db_url(&self) -> Result<&str> {
        self.restore_db_url
            .as_deref()
            .ok_or(ArchiveError::ConfigurationMissing("RESTORE_DB_URL"))
    }
}
