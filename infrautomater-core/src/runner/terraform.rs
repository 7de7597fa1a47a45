//! Subprocess runner for the terraform binary

use super::{ToolError, ToolOutput, ToolRunner};
use crate::models::WorkerConfiguration;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

/// Runs the provisioning binary as a child process with a wall-clock limit
#[derive(Debug, Clone)]
pub struct TerraformRunner {
    binary: String,
    timeout: Duration,
}

impl TerraformRunner {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &WorkerConfiguration) -> Self {
        Self::new(config.terraform_binary.clone(), config.command_timeout())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn spawn_error(&self, source: std::io::Error) -> ToolError {
        if source.kind() == std::io::ErrorKind::NotFound {
            ToolError::BinaryNotFound {
                binary: self.binary.clone(),
            }
        } else {
            ToolError::Spawn {
                binary: self.binary.clone(),
                source,
            }
        }
    }
}

/// Drain a pipe into a string on a separate task
fn collect<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[async_trait]
impl ToolRunner for TerraformRunner {
    async fn run(&self, workspace_dir: &Path, args: &[&str]) -> Result<ToolOutput, ToolError> {
        // A missing working directory also surfaces as NotFound from spawn
        if !workspace_dir.is_dir() {
            return Err(ToolError::Spawn {
                binary: self.binary.clone(),
                source: std::io::Error::other(format!(
                    "workspace {} does not exist",
                    workspace_dir.display()
                )),
            });
        }

        let start_time = Instant::now();

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(workspace_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut stdout_task = collect(child.stdout.take());
        let mut stderr_task = collect(child.stderr.take());

        // One deadline for the exit and both pipes: a descendant holding a
        // pipe open must not outlive the limit
        let deadline = tokio::time::Instant::now() + self.timeout;
        let finished = timeout_at(deadline, async {
            let status = child.wait().await;
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (status, stdout, stderr)
        })
        .await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match finished {
            Ok((Ok(status), stdout, stderr)) => {
                tracing::debug!(
                    binary = %self.binary,
                    args = ?args,
                    exit_code = ?status.code(),
                    duration_ms = duration_ms,
                    "Tool invocation finished"
                );

                Ok(ToolOutput {
                    success: status.success(),
                    stdout,
                    stderr,
                    exit_code: status.code(),
                })
            }
            Ok((Err(source), _, _)) => Err(ToolError::Spawn {
                binary: self.binary.clone(),
                source,
            }),
            Err(_) => {
                // Timeout - kill the process
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();

                tracing::warn!(
                    binary = %self.binary,
                    args = ?args,
                    timeout_seconds = self.timeout.as_secs(),
                    "Tool invocation timed out"
                );

                Err(ToolError::Timeout {
                    timeout: self.timeout,
                })
            }
        }
    }
}
