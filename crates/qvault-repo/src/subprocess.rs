//! Drives an external backup-repository tool as a subprocess: a thin
//! wrapper around an external process, one call per operation, with
//! `anyhow` context on every I/O boundary and no retry logic of its own
//! (retries are the scheduler's job, per §4.3).

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;

use crate::{BackupRepo, RepoError, Snapshot};

/// Configuration for the external tool: which binary to run and which
/// repository location/password to pass it.
#[derive(Clone, Debug)]
pub struct SubprocessRepo {
    binary: String,
    repo_url: String,
    password: String,
}

impl SubprocessRepo {
    pub fn new(binary: impl Into<String>, repo_url: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            repo_url: repo_url.into(),
            password: password.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--repo")
            .arg(&self.repo_url)
            .env("REPO_PASSWORD", &self.password)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, RepoError> {
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| RepoError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(RepoError::ToolFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl BackupRepo for SubprocessRepo {
    async fn init(&self) -> Result<(), RepoError> {
        self.run(&["init"]).await?;
        Ok(())
    }

    async fn backup(&self, paths: &[String]) -> Result<String, RepoError> {
        let mut args: Vec<&str> = vec!["backup", "--json"];
        for p in paths {
            args.push(p.as_str());
        }
        let stdout = self.run(&args).await?;
        let value: serde_json::Value = serde_json::from_slice(&stdout)
            .map_err(|e| RepoError::BadOutput(e.to_string()))?;
        value
            .get("snapshot_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| RepoError::BadOutput("missing snapshot_id field".into()))
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>, RepoError> {
        let stdout = self.run(&["snapshots", "--json"]).await?;
        serde_json::from_slice(&stdout).map_err(|e| RepoError::BadOutput(e.to_string()))
    }

    async fn restore(&self, snapshot_id: &str, target: &str) -> Result<(), RepoError> {
        self.run(&["restore", snapshot_id, "--target", target]).await?;
        Ok(())
    }
}

/// Runs `tool --version` purely to confirm the configured binary is on
/// `PATH` and executes; used by `qvault init` before it writes a vault
/// config that nothing could ever back up.
pub async fn check_tool_available(binary: &str) -> anyhow::Result<()> {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("failed to execute repository tool `{binary}`"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_carries_repo_and_password() {
        let repo = SubprocessRepo::new("true", "/tmp/repo", "hunter2");
        let cmd = repo.command(&["snapshots"]);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "true");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["--repo", "/tmp/repo", "snapshots"]);
    }

    #[tokio::test]
    async fn init_against_missing_binary_is_transient() {
        let repo = SubprocessRepo::new("definitely-not-a-real-binary-xyz", "/tmp/repo", "pw");
        let err = repo.init().await.unwrap_err();
        assert!(matches!(err, RepoError::Spawn(_)));
        assert_eq!(err.kind(), qvault_core::ErrorKind::Transient);
    }

    #[tokio::test]
    async fn failing_tool_reports_status_and_stderr() {
        let repo = SubprocessRepo::new("false", "/tmp/repo", "pw");
        let err = repo.init().await.unwrap_err();
        match err {
            RepoError::ToolFailed { status, .. } => assert_ne!(status, 0),
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backup_rejects_unparseable_output() {
        // `echo` writes plain text, not the JSON object backup() expects.
        let repo = SubprocessRepo::new("echo", "/tmp/repo", "pw");
        let err = repo.backup(&["/data".to_string()]).await.unwrap_err();
        assert!(matches!(err, RepoError::BadOutput(_)));
        assert_eq!(err.kind(), qvault_core::ErrorKind::BadEncoding);
    }
}
