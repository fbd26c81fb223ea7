use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dispatch::Invocation;
use crate::error::{OrchestratorError, Result};

/// Captured output of a successful engine run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs engine invocations with a hard deadline.
#[derive(Debug, Clone)]
pub struct EngineRunner {
    timeout: Duration,
}

impl EngineRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run to completion and capture stdout/stderr.
    ///
    /// A non-zero exit yields [`OrchestratorError::EngineFailure`] with stderr
    /// untouched. When the deadline passes, or the returned future is dropped,
    /// the child is killed.
    pub async fn run(&self, invocation: &Invocation) -> Result<EngineOutput> {
        info!(
            program = %invocation.program.display(),
            args = ?invocation.args,
            "launching engine"
        );
        let started = Instant::now();

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OrchestratorError::Launch {
                program: invocation.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| OrchestratorError::Launch {
                program: invocation.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(after = ?self.timeout, "engine deadline exceeded, killing child");
                return Err(OrchestratorError::Timeout {
                    after: self.timeout,
                });
            }
        };

        let elapsed = started.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(status = %output.status, ?elapsed, "engine failed");
            return Err(OrchestratorError::EngineFailure {
                code: output.status.code(),
                stderr,
            });
        }

        info!(?elapsed, stdout_bytes = stdout.len(), "engine finished");
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "engine stderr");
        }

        Ok(EngineOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}
