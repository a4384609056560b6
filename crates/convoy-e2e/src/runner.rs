//! External test command execution.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

/// How to launch one e2e session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Program and leading arguments; asset paths are appended.
    pub command: Vec<String>,

    /// Kill the session after this many seconds; 0 disables the limit.
    pub timeout_secs: u64,

    /// Working directory, inherited when `None`.
    pub working_dir: Option<PathBuf>,
}

/// Result of a session execution.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Number of asset paths handed to the command.
    pub assets: usize,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl SessionResult {
    /// Whether the session passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Runs the configured test command over a batch of assets.
pub struct E2eRunner;

impl E2eRunner {
    pub async fn execute(config: &SessionConfig, assets: &[PathBuf]) -> anyhow::Result<SessionResult> {
        let start = Instant::now();

        if config.command.is_empty() {
            anyhow::bail!("e2e session has an empty command");
        }

        let exe = &config.command[0];
        let args = &config.command[1..];

        let mut command = Command::new(exe);
        command
            .args(args)
            .args(assets)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        info!(command = %config.command.join(" "), assets = assets.len(), "starting e2e session");
        let child = command.spawn()?;

        let output = if config.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!("e2e session timed out after {} seconds", config.timeout_secs)
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        debug!(exit_code, duration_ms, "e2e session exited");

        Ok(SessionResult {
            exit_code,
            stdout,
            stderr,
            assets: assets.len(),
            duration_ms,
            success: output.status.success(),
        })
    }
}
