//! Shell-command capability provider.
//!
//! Runs `sh -c <command>` in the project directory with the [`TaskRequest`] as
//! JSON on stdin and `WEFT_WORK_ITEM` / `WEFT_TASK` in the environment.
//!
//! - stdout parsing as a [`TaskOutcome`] wins regardless of exit code
//! - otherwise exit 0 is success and any other exit is a failure carrying stderr
//!
//! No timeout is applied here; the command owns its own limits.

use super::{CapabilityProvider, TaskOutcome, TaskRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandProvider {
    command: String,
    working_dir: PathBuf,
}

impl CommandProvider {
    pub fn new(command: &str, working_dir: impl AsRef<Path>) -> Self {
        Self {
            command: command.to_string(),
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    fn parse_output(output: &std::process::Output) -> TaskOutcome {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty()
            && let Ok(outcome) = serde_json::from_str::<TaskOutcome>(stdout.trim())
        {
            return outcome;
        }

        if output.status.success() {
            TaskOutcome::success()
        } else {
            let code = output.status.code().unwrap_or(-1);
            let detail = if stderr.trim().is_empty() {
                format!("command exited with code {}", code)
            } else {
                format!("command exited with code {}: {}", code, stderr.trim())
            };
            TaskOutcome::failure(detail)
        }
    }
}

#[async_trait]
impl CapabilityProvider for CommandProvider {
    async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome> {
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize task request")?;

        tracing::debug!(
            command = %self.command,
            work_item = %request.work_item,
            task = request.task_number,
            "Spawning capability command"
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("WEFT_WORK_ITEM", &request.work_item)
            .env("WEFT_TASK", request.task_number.to_string())
            .spawn()
            .with_context(|| format!("Failed to spawn capability command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that never reads stdin closes the pipe early; that is not a failure.
            if let Err(e) = stdin.write_all(request_json.as_bytes()).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e).context("Failed to write task request to command stdin");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for capability command")?;

        tracing::debug!(
            task = request.task_number,
            exit_code = output.status.code().unwrap_or(-1),
            "Capability command finished"
        );

        Ok(Self::parse_output(&output))
    }
}
