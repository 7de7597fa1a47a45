//! External provisioning tool invocation

pub mod terraform;

pub use terraform::*;

use crate::error::ErrorClass;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Captured result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code was zero
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    /// Best diagnostic text for a failed invocation
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Invocations that produced no exit status at all.
///
/// A non-zero exit is not an error here; it is a `ToolOutput` with
/// `success == false`.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("provisioning binary '{binary}' not found on PATH")]
    BinaryNotFound { binary: String },

    #[error("command timed out after {} seconds", .timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ToolError::BinaryNotFound { .. } => ErrorClass::Environment,
            ToolError::Timeout { .. } | ToolError::Spawn { .. } => ErrorClass::Transient,
        }
    }
}

/// Runs the provisioning binary
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the tool with `args` inside `workspace_dir`
    ///
    /// # Arguments
    /// * `workspace_dir` - Working directory for the process
    /// * `args` - Arguments passed after the binary name
    async fn run(&self, workspace_dir: &Path, args: &[&str]) -> Result<ToolOutput, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = ToolOutput {
            success: false,
            stdout: "partial".to_string(),
            stderr: "Error: invalid provider\n".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(output.diagnostic(), "Error: invalid provider");

        let quiet = ToolOutput {
            success: false,
            stdout: String::new(),
            stderr: "  ".to_string(),
            exit_code: Some(3),
        };
        assert_eq!(quiet.diagnostic(), "exited with code 3");
    }

    #[test]
    fn test_error_classes() {
        let missing = ToolError::BinaryNotFound {
            binary: "terraform".to_string(),
        };
        assert_eq!(missing.class(), ErrorClass::Environment);
        assert_eq!(
            missing.to_string(),
            "provisioning binary 'terraform' not found on PATH"
        );

        let timeout = ToolError::Timeout {
            timeout: Duration::from_secs(600),
        };
        assert_eq!(timeout.class(), ErrorClass::Transient);
        assert_eq!(timeout.to_string(), "command timed out after 600 seconds");
    }
}
