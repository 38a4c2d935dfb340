//! Subprocess boundary: producing an artifact with `pg_dump` and consuming
//! one with `pg_restore`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{ArchiveError, Result};

/// Produces and consumes artifacts for one database engine.
#[async_trait]
pub trait DatabaseTool: Send + Sync {
    /// Writes a snapshot of `db_url` to `dest`.
    async fn dump(&self, db_url: &str, dest: &Path) -> Result<()>;

    /// Loads the snapshot at `src` into `db_url`.
    async fn restore(&self, db_url: &str, src: &Path) -> Result<()>;
}

/// PostgreSQL client tools, invoked directly rather than through a shell.
#[derive(Debug, Clone)]
pub struct PgTools {
    pub pg_dump: PathBuf,
    pub pg_restore: PathBuf,
}

impl Default for PgTools {
    fn default() -> Self {
        Self {
            pg_dump: PathBuf::from("pg_dump"),
            pg_restore: PathBuf::from("pg_restore"),
        }
    }
}

impl PgTools {
    /// `pg_dump -F t -d <url> -f <dest>`: tar-format archive.
    pub fn dump_command(&self, db_url: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.pg_dump);
        cmd.arg("-F").arg("t").arg("-d").arg(db_url).arg("-f").arg(dest);
        cmd
    }

    /// Drops existing objects before recreating them and stops at the first
    /// error.
    pub fn restore_command(&self, db_url: &str, src: &Path) -> Command {
        let mut cmd = Command::new(&self.pg_restore);
        cmd.arg(format!("--dbname={db_url}"))
            .arg("--clean")
            .arg("--if-exists")
            .arg("--exit-on-error")
            .arg(src);
        cmd
    }
}

#[async_trait]
impl DatabaseTool for PgTools {
    async fn dump(&self, db_url: &str, dest: &Path) -> Result<()> {
        let label = format!("{} -> {}", self.pg_dump.display(), dest.display());
        run_command(self.dump_command(db_url, dest), &label).await?;
        Ok(())
    }

    async fn restore(&self, db_url: &str, src: &Path) -> Result<()> {
        let label = format!("{} <- {}", self.pg_restore.display(), src.display());
        run_command(self.restore_command(db_url, src), &label).await?;
        Ok(())
    }
}

/// Runs `cmd` to completion and returns its stdout. A spawn failure or a
/// nonzero exit becomes [`ArchiveError::Subprocess`] with captured stderr.
/// `label` names the command in errors; it must not contain credentials.
pub async fn run_command(mut cmd: Command, label: &str) -> Result<String> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ArchiveError::Subprocess {
            command: label.to_string(),
            status: "spawn failed".into(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ArchiveError::Subprocess {
            command: label.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_dump_and_restore_arguments() {
        let tools = PgTools::default();
        let dump = tools.dump_command("postgres://u@h/db", Path::new("/b/backup_1.tar"));
        assert_eq!(
            args(&dump),
            vec!["-F", "t", "-d", "postgres://u@h/db", "-f", "/b/backup_1.tar"]
        );
        let restore = tools.restore_command("postgres://u@h/db", Path::new("/tmp/backup_1.tar"));
        assert_eq!(
            args(&restore),
            vec![
                "--dbname=postgres://u@h/db",
                "--clean",
                "--if-exists",
                "--exit-on-error",
                "/tmp/backup_1.tar"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken pipe >&2; exit 3");
        let err = run_command(cmd, "sh").await.unwrap_err();
        match err {
            ArchiveError::Subprocess { stderr, .. } => assert_eq!(stderr, "broken pipe"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_returns_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf ok");
        assert_eq!(run_command(cmd, "sh").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_missing_binary_is_subprocess_error() {
        let cmd = Command::new("/nonexistent/dbvault-no-such-binary");
        let err = run_command(cmd, "missing").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Subprocess { .. }));
    }
}
