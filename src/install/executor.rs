//! Remote execution through the local OpenSSH client.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CommandOutput, RemoteExecutor, StepFailure, OUTPUT_TAIL_LINES};
use crate::provision::InstanceConnection;
use crate::utils::tail_lines;

/// Runs each script as a single `ssh` invocation.
///
/// The child is killed when the future is dropped, so a Ctrl-C or an
/// exceeded step timeout never leaves a remote session running locally.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: PathBuf,
    step_timeout: Duration,
    verbose: bool,
}

impl SshExecutor {
    pub fn new(program: impl Into<PathBuf>, step_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            step_timeout,
            verbose: false,
        }
    }

    /// Pass `-v` to ssh.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn ssh_args(&self, connection: &InstanceConnection, script: &str) -> Vec<String> {
        let mut args = Vec::new();
        if self.verbose {
            args.push("-v".to_string());
        }
        args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-i".to_string(),
            connection.credential_ref.display().to_string(),
            connection.target(),
            script.to_string(),
        ]);
        args
    }

    async fn run(
        &self,
        connection: &InstanceConnection,
        script: &str,
        input: Option<&str>,
    ) -> std::io::Result<std::process::Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.ssh_args(connection, script))
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            // Dropping the handle closes the pipe
        }

        child.wait_with_output().await
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        connection: &InstanceConnection,
        script: &str,
        input: Option<&str>,
    ) -> Result<CommandOutput, StepFailure> {
        tracing::debug!("Running remote script on {}", connection.target());

        let run = self.run(connection, script, input);
        let output = match tokio::time::timeout(self.step_timeout, run).await {
            Ok(result) => result.map_err(StepFailure::Spawn)?,
            Err(_) => return Err(StepFailure::TimedOut(self.step_timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let tail = tail_lines(&stderr, OUTPUT_TAIL_LINES);
            tracing::warn!(
                "Remote script on {} failed, stderr:\n{}",
                connection.target(),
                tail
            );
            return Err(StepFailure::ExitStatus {
                code: output.status.code(),
                stderr: tail,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
