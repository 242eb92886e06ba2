//! External client utility invocation.
//!
//! Command lines carry only connection coordinates (host, port, user,
//! database). The password and TLS mode travel in the child's environment as
//! `PGPASSWORD` / `PGSSLMODE`, so they never show up in process listings.
//! Compressed plain scripts are decompressed in-process and fed to `psql`
//! on stdin.

use crate::backup::{BackupJob, RestoreJob};
use crate::db::ConnectionParams;
use crate::error::{DbError, DbResult};
use crate::models::PgTool;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Upper bound for a single dump or restore run.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// A fully built client utility invocation.
#[derive(Clone)]
pub struct ToolCommand {
    pub tool: PgTool,
    pub args: Vec<String>,
    env: Vec<(&'static str, String)>,
    stdin: Option<Vec<u8>>,
}

impl std::fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCommand")
            .field("tool", &self.tool)
            .field("args", &self.args)
            .field("env", &self.env_keys())
            .field("stdin_bytes", &self.stdin.as_ref().map(Vec::len))
            .finish()
    }
}

impl ToolCommand {
    fn new(tool: PgTool, params: &ConnectionParams) -> Self {
        let mut env = Vec::new();
        if let Some(password) = &params.password {
            env.push(("PGPASSWORD", password.clone()));
        }
        if let Some(mode) = &params.ssl_mode {
            env.push(("PGSSLMODE", mode.clone()));
        }

        let args = vec![
            "-h".to_string(),
            params.host.clone(),
            "-p".to_string(),
            params.port.to_string(),
            "-U".to_string(),
            params.user.clone(),
            "-d".to_string(),
            params.database.clone(),
        ];
        Self {
            tool,
            args,
            env,
            stdin: None,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn arg_if(self, condition: bool, arg: &str) -> Self {
        if condition { self.arg(arg) } else { self }
    }

    /// `pg_dump` for a backup job.
    pub fn pg_dump(params: &ConnectionParams, job: &BackupJob) -> Self {
        let mut cmd = Self::new(PgTool::PgDump, params)
            .arg("-F")
            .arg(job.format.pg_dump_flag());
        if job.format.supports_compression() {
            cmd = cmd.arg("-Z").arg(job.compress_level.to_string());
        }
        cmd = cmd
            .arg_if(job.schema_only, "--schema-only")
            .arg_if(job.data_only, "--data-only");
        for table in &job.tables {
            cmd = cmd.arg("-t").arg(table.as_str());
        }
        for table in &job.exclude_tables {
            cmd = cmd.arg("-T").arg(table.as_str());
        }
        cmd.arg("-f")
            .arg(job.path.to_string_lossy())
            .arg("--verbose")
    }

    /// `psql` replaying a plain SQL file. Stops at the first failing
    /// statement so the exit status reflects it.
    pub fn psql(params: &ConnectionParams, job: &RestoreJob) -> Self {
        Self::psql_reading(params, job, job.path.to_string_lossy().into_owned())
    }

    /// `psql` replaying `script` from stdin, for compressed backups.
    pub fn psql_script(params: &ConnectionParams, job: &RestoreJob, script: String) -> Self {
        let mut cmd = Self::psql_reading(params, job, "-".to_string());
        cmd.stdin = Some(script.into_bytes());
        cmd
    }

    fn psql_reading(params: &ConnectionParams, job: &RestoreJob, source: String) -> Self {
        Self::new(PgTool::Psql, params)
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-f")
            .arg(source)
            .arg_if(!job.create_database, "--single-transaction")
    }

    /// `pg_restore` for custom, tar and directory archives.
    pub fn pg_restore(params: &ConnectionParams, job: &RestoreJob) -> Self {
        Self::new(PgTool::PgRestore, params)
            .arg_if(job.clean, "--clean")
            .arg_if(job.data_only, "--data-only")
            .arg_if(job.schema_only, "--schema-only")
            .arg("--verbose")
            .arg(job.path.to_string_lossy())
    }

    pub fn env_keys(&self) -> Vec<&'static str> {
        self.env.iter().map(|(key, _)| *key).collect()
    }

    /// Run to completion within `limit`.
    pub async fn run(&self, limit: Duration) -> DbResult<ToolOutput> {
        info!(tool = %self.tool, "Running client utility");
        let output = run_process(
            self.tool.binary(),
            &self.args,
            self.env.iter().map(|(k, v)| (*k, v.as_str())),
            self.stdin.as_deref(),
            limit,
        )
        .await?;
        if !output.stderr.is_empty() {
            info!(tool = %self.tool, code = ?output.code, "Client utility finished with diagnostics");
        }
        Ok(output)
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool: String,
    /// None when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// Restore utilities exit 1 for warnings; only treat that as failure
    /// when the diagnostics mention an error. `psql` with `ON_ERROR_STOP`
    /// exits 3 after a failed statement.
    pub fn restore_succeeded(&self) -> bool {
        match self.code {
            Some(0) => true,
            Some(1) => !self.stderr.to_lowercase().contains("error"),
            _ => false,
        }
    }

    /// Process failure carrying the captured streams.
    pub fn into_error(self) -> DbError {
        let message = match self.stderr.trim() {
            "" => match self.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            },
            stderr => stderr.to_string(),
        };
        warn!(tool = %self.tool, code = ?self.code, "Client utility failed");
        DbError::process_output(self.tool, message, self.stderr, self.stdout)
    }
}

/// Spawn `program`, feed it `input` on stdin, capture its output, and kill
/// it if `limit` elapses.
pub async fn run_process<'a, I, S>(
    program: &str,
    args: I,
    env: impl IntoIterator<Item = (&'a str, &'a str)>,
    input: Option<&[u8]>,
    limit: Duration,
) -> DbResult<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let input = input.map(<[u8]>::to_vec);
    let run = async move {
        let mut child = cmd.spawn()?;
        if let (Some(bytes), Some(mut pipe)) = (input, child.stdin.take()) {
            // Written concurrently so a full stdout pipe cannot stall the child.
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&bytes).await {
                    debug!(error = %e, "Child closed stdin early");
                }
            });
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(limit, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(DbError::process(
                program,
                format!("Failed to start {}: {}", program, e),
            ));
        }
        Err(_) => {
            return Err(DbError::timeout(
                format!("{} operation", program),
                limit.as_secs(),
            ));
        }
    };

    Ok(ToolOutput {
        tool: program.to_string(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupFormat;
    use sqlx::postgres::PgConnectOptions;
    use std::path::PathBuf;

    fn params(password: Option<&str>, ssl_mode: Option<&str>) -> ConnectionParams {
        ConnectionParams {
            host: "db.example.com".to_string(),
            port: 6432,
            user: "admin@srv".to_string(),
            password: password.map(str::to_string),
            database: "shop".to_string(),
            ssl_mode: ssl_mode.map(str::to_string),
            options: PgConnectOptions::new(),
        }
    }

    fn backup_job(format: BackupFormat) -> BackupJob {
        BackupJob {
            database: "shop".to_string(),
            path: PathBuf::from("/b/shop.dump"),
            format,
            compress_level: 6,
            schema_only: true,
            data_only: false,
            tables: vec!["orders".to_string()],
            exclude_tables: vec!["audit".to_string()],
        }
    }

    fn restore_job(path: &str, create_database: bool) -> RestoreJob {
        RestoreJob {
            database: "shop".to_string(),
            path: PathBuf::from(path),
            create_database,
            clean: true,
            data_only: false,
            schema_only: true,
        }
    }

    #[test]
    fn test_pg_dump_arguments_in_order() {
        let cmd = ToolCommand::pg_dump(&params(Some("s3cret"), None), &backup_job(BackupFormat::Custom));
        assert_eq!(
            cmd.args,
            vec![
                "-h", "db.example.com", "-p", "6432", "-U", "admin@srv", "-d", "shop", "-F", "c",
                "-Z", "6", "--schema-only", "-t", "orders", "-T", "audit", "-f", "/b/shop.dump",
                "--verbose",
            ]
        );
    }

    #[test]
    fn test_pg_dump_tar_has_no_compression() {
        let cmd = ToolCommand::pg_dump(&params(None, None), &backup_job(BackupFormat::Tar));
        assert!(!cmd.args.contains(&"-Z".to_string()));
        assert!(cmd.args.windows(2).any(|w| w == ["-F", "t"]));
    }

    #[test]
    fn test_secrets_only_in_environment() {
        let cmd = ToolCommand::pg_dump(
            &params(Some("s3cret"), Some("require")),
            &backup_job(BackupFormat::Custom),
        );
        assert!(cmd.args.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(cmd.env_keys(), vec!["PGPASSWORD", "PGSSLMODE"]);
        assert!(!format!("{:?}", cmd).contains("s3cret"));

        let cmd = ToolCommand::pg_dump(&params(None, None), &backup_job(BackupFormat::Custom));
        assert!(cmd.env_keys().is_empty());
    }

    #[test]
    fn test_psql_single_transaction_unless_creating() {
        let cmd = ToolCommand::psql(&params(None, None), &restore_job("/b/x.sql", false));
        assert_eq!(cmd.tool, PgTool::Psql);
        assert_eq!(
            &cmd.args[8..],
            ["-v", "ON_ERROR_STOP=1", "-f", "/b/x.sql", "--single-transaction"]
        );
        assert!(cmd.stdin.is_none());

        let cmd = ToolCommand::psql(&params(None, None), &restore_job("/b/x.sql", true));
        assert_eq!(&cmd.args[8..], ["-v", "ON_ERROR_STOP=1", "-f", "/b/x.sql"]);
    }

    #[test]
    fn test_psql_script_reads_stdin() {
        let cmd = ToolCommand::psql_script(
            &params(None, None),
            &restore_job("/b/x.sql.gz", true),
            "SELECT 1;\n".to_string(),
        );
        assert_eq!(&cmd.args[8..], ["-v", "ON_ERROR_STOP=1", "-f", "-"]);
        assert_eq!(cmd.stdin.as_deref(), Some(&b"SELECT 1;\n"[..]));
        assert!(format!("{:?}", cmd).contains("stdin_bytes: Some(10)"));
    }

    #[test]
    fn test_pg_restore_arguments() {
        let cmd = ToolCommand::pg_restore(&params(None, None), &restore_job("/b/x.dump", false));
        assert_eq!(
            &cmd.args[8..],
            ["--clean", "--schema-only", "--verbose", "/b/x.dump"]
        );
    }

    #[test]
    fn test_restore_exit_code_rules() {
        let output = |code, stderr: &str| ToolOutput {
            tool: "pg_restore".to_string(),
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        };
        assert!(output(Some(0), "pg_restore: error: ignored").restore_succeeded());
        assert!(output(Some(1), "pg_restore: warning: skipping").restore_succeeded());
        assert!(!output(Some(1), "pg_restore: ERROR: relation exists").restore_succeeded());
        assert!(!output(Some(2), "").restore_succeeded());
        assert!(!output(Some(3), "psql:x.sql:4: ERROR:  syntax error").restore_succeeded());
        assert!(!output(None, "").restore_succeeded());
    }

    #[test]
    fn test_into_error_carries_stderr() {
        let err = ToolOutput {
            tool: "pg_dump".to_string(),
            code: Some(1),
            stdout: String::new(),
            stderr: "pg_dump: error: connection refused\n".to_string(),
        }
        .into_error();
        assert_eq!(err.kind(), "process_error");
        assert!(err.to_string().starts_with("pg_dump failed: pg_dump: error"));
        assert!(err.details().contains_key("stderr"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_process_captures_output_and_env() {
        let output = run_process(
            "sh",
            ["-c", "echo \"$PGSSLMODE\"; echo oops >&2; exit 3"],
            [("PGSSLMODE", "require")],
            None,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "require");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_process_times_out() {
        let err = run_process(
            "sh",
            ["-c", "sleep 5"],
            std::iter::empty(),
            None,
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "timeout_error");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_process_feeds_stdin() {
        let script = "SELECT 1;\n".repeat(20_000);
        let output = run_process(
            "sh",
            ["-c", "cat"],
            std::iter::empty(),
            Some(script.as_bytes()),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert!(output.succeeded());
        assert_eq!(output.stdout, script);
    }

    #[tokio::test]
    async fn test_run_process_missing_program() {
        let err = run_process(
            "definitely-not-a-real-binary-xyz",
            std::iter::empty::<&str>(),
            std::iter::empty(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "process_error");
    }
}
