use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::retention::{DEFAULT_CLOUD_RETAIN_DAYS, DEFAULT_LOCAL_RETAIN_DAYS};
use crate::transfer::chunk::DEFAULT_PART_SIZE;
use crate::transfer::engine::DEFAULT_MAX_IN_FLIGHT_PARTS;

#[derive(Parser, Debug)]
#[command(name = "dbvault", version, about = "Database backups archived to S3-compatible storage", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub args: Args,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Dump the database, archive the dump, then apply retention")]
    Backup,
    #[command(about = "Run `backup` only when AUTOMATIC_BACKUP=true")]
    Automate,
    #[command(about = "Restore the database from a local file or an archived key")]
    Restore {
        /// Local artifact to restore from
        #[arg(long, value_name = "PATH", conflicts_with = "key", required_unless_present = "key")]
        file: Option<PathBuf>,
        /// Archive key to fetch and restore from
        #[arg(long, value_name = "KEY")]
        key: Option<String>,
    },
    #[command(about = "List archived backups")]
    List,
    #[command(about = "Apply local and cloud retention without taking a backup")]
    Prune,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    S3,
    Localfs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct Args {
    /// Connection URL of the database to back up
    #[arg(long, env = "BACKUP_DB_URL", global = true, hide_env_values = true)]
    pub backup_db_url: Option<String>,

    /// Connection URL of the database to restore into
    #[arg(long, env = "RESTORE_DB_URL", global = true, hide_env_values = true)]
    pub restore_db_url: Option<String>,

    /// Object store backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = StoreKind::S3, global = true)]
    pub store: StoreKind,

    /// Bucket holding the archives
    #[arg(long, env = "BUCKET_NAME", global = true)]
    pub bucket_name: Option<String>,

    /// Key prefix for archived backups
    #[arg(long, env = "BACKUP_DIR", global = true)]
    pub backup_dir: Option<String>,

    #[arg(long, env = "ACCESS_KEY_ID", global = true, hide_env_values = true)]
    pub access_key_id: Option<String>,

    #[arg(long, env = "SECRET_ACCESS_KEY", global = true, hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Cloudflare account id; selects the R2 endpoint when no endpoint is given
    #[arg(long, env = "ACCOUNT_ID", global = true)]
    pub account_id: Option<String>,

    /// Explicit S3 endpoint URL
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "S3_REGION", default_value = "auto", global = true)]
    pub s3_region: String,

    /// Root directory of the `localfs` backend
    #[arg(long, env = "LOCAL_STORE_ROOT", global = true)]
    pub local_store_root: Option<PathBuf>,

    /// Where dumps are written before upload
    #[arg(long, env = "LOCAL_BACKUP_DIR", default_value = "db_backups", global = true)]
    pub local_backup_dir: PathBuf,

    /// Where archived backups are fetched to before restore
    #[arg(long, env = "RESTORE_TMP_DIR", global = true)]
    pub restore_tmp_dir: Option<PathBuf>,

    #[arg(long, env = "LOCAL_RETAIN_DAYS", default_value_t = DEFAULT_LOCAL_RETAIN_DAYS, global = true)]
    pub local_retain_days: i64,

    #[arg(long, env = "CLOUD_RETAIN_DAYS", default_value_t = DEFAULT_CLOUD_RETAIN_DAYS, global = true)]
    pub cloud_retain_days: i64,

    /// Keep local dumps for LOCAL_RETAIN_DAYS instead of deleting them after upload
    #[arg(long, env = "KEEP_LOCAL_BACKUP", default_value_t = false, action = ArgAction::Set, global = true)]
    pub keep_local_backup: bool,

    /// Part size and single-put threshold, in bytes
    #[arg(long, env = "PART_SIZE_BYTES", default_value_t = DEFAULT_PART_SIZE, global = true)]
    pub part_size: u64,

    #[arg(long, env = "MAX_IN_FLIGHT_PARTS", default_value_t = DEFAULT_MAX_IN_FLIGHT_PARTS, global = true)]
    pub max_in_flight_parts: usize,

    #[arg(long, env = "PG_DUMP_BIN", default_value = "pg_dump", global = true)]
    pub pg_dump: PathBuf,

    #[arg(long, env = "PG_RESTORE_BIN", default_value = "pg_restore", global = true)]
    pub pg_restore: PathBuf,

    /// Gate for the `automate` command
    #[arg(long, env = "AUTOMATIC_BACKUP", default_value_t = false, action = ArgAction::Set, global = true)]
    pub automatic_backup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_requires_exactly_one_source() {
        let parsed = Cli::try_parse_from(["dbvault", "restore", "--key", "db/backup_1.tar"]).unwrap();
        assert_eq!(
            parsed.command,
            Commands::Restore {
                file: None,
                key: Some("db/backup_1.tar".into())
            }
        );
        assert!(Cli::try_parse_from(["dbvault", "restore"]).is_err());
        assert!(
            Cli::try_parse_from([
                "dbvault", "restore", "--key", "k", "--file", "/tmp/backup_1.tar"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let parsed = Cli::try_parse_from([
            "dbvault",
            "backup",
            "--part-size",
            "1024",
            "--keep-local-backup",
            "true",
        ])
        .unwrap();
        assert_eq!(parsed.command, Commands::Backup);
        assert_eq!(parsed.args.part_size, 1024);
        assert!(parsed.args.keep_local_backup);
    }
}
