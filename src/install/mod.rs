//! Remote software installation.
//!
//! An install step is a shell payload applied to a provisioned instance
//! through a [`RemoteExecutor`]. [`run_all`] applies a fixed sequence of
//! steps in order and stops at the first failure.

pub mod executor;
pub mod steps;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::provision::InstanceConnection;
use crate::utils::tail_lines;

pub use executor::SshExecutor;
pub use steps::default_steps;

/// Lines of remote output kept in logs and failure messages.
pub(crate) const OUTPUT_TAIL_LINES: usize = 20;

/// Output from a remote command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Why a single step failed.
#[derive(Error, Debug)]
pub enum StepFailure {
    #[error("failed to start remote command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("remote command exited with {}", describe_exit(.code, .stderr))]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("remote command timed out after {}", crate::utils::format_duration(.0.as_secs()))]
    TimedOut(Duration),
}

fn describe_exit(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    };
    match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(last) => format!("{}: {}", status, last.trim()),
        None => status,
    }
}

/// A step in the sequence failed. `step` is 1-indexed.
#[derive(Error, Debug)]
#[error("Error installing software: step {step} ({name}) failed: {cause}")]
pub struct InstallError {
    pub step: usize,
    pub name: String,
    #[source]
    pub cause: StepFailure,
}

/// Runs a script on a provisioned instance.
///
/// `input` is written to the remote command's stdin. Secrets travel this way
/// so they never appear in the command line.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        connection: &InstanceConnection,
        script: &str,
        input: Option<&str>,
    ) -> Result<CommandOutput, StepFailure>;
}

/// One unit of remote installation.
#[async_trait]
pub trait InstallStep: Send + Sync {
    /// Short name shown in progress output.
    fn name(&self) -> &'static str;

    /// Shell payload executed on the instance. Never contains secrets.
    fn script(&self) -> String;

    /// Line fed to the script's stdin.
    fn secret_input(&self) -> Option<String> {
        None
    }

    async fn apply(
        &self,
        connection: &InstanceConnection,
        executor: &dyn RemoteExecutor,
    ) -> Result<CommandOutput, StepFailure> {
        let input = self.secret_input();
        executor
            .execute(connection, &self.script(), input.as_deref())
            .await
    }
}

/// Apply `steps` in order, stopping at the first failure.
///
/// Steps after a failing one never run and nothing is rolled back.
pub async fn run_all(
    steps: &[Box<dyn InstallStep>],
    connection: &InstanceConnection,
    executor: &dyn RemoteExecutor,
) -> Result<(), InstallError> {
    let total = steps.len();

    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        tracing::info!("[{}/{}] Installing {}...", number, total, step.name());

        match step.apply(connection, executor).await {
            Ok(output) => {
                tracing::debug!(
                    "Step {} ({}) completed\n{}",
                    number,
                    step.name(),
                    tail_lines(&output.stdout, OUTPUT_TAIL_LINES)
                );
                if !output.stderr.trim().is_empty() {
                    tracing::debug!(
                        "Step {} stderr:\n{}",
                        number,
                        tail_lines(&output.stderr, OUTPUT_TAIL_LINES)
                    );
                }
            }
            Err(cause) => {
                tracing::error!("Step {} ({}) failed: {}", number, step.name(), cause);
                return Err(InstallError {
                    step: number,
                    name: step.name().to_string(),
                    cause,
                });
            }
        }
    }

    Ok(())
}
