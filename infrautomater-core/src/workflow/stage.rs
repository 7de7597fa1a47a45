//! Pipeline stages and their outcomes

use crate::error::ErrorClass;
use crate::runner::{ToolError, ToolOutput};
use crate::workspace::PLAN_FILE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the external-tool pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Plan,
    Apply,
    Output,
    Destroy,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Plan => "plan",
            Stage::Apply => "apply",
            Stage::Output => "output",
            Stage::Destroy => "destroy",
        }
    }

    /// Fixed argument list for the stage
    pub fn args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Stage::Init => &["init", "-input=false", "-no-color"],
            Stage::Plan => &["plan", "-input=false", "-no-color"],
            Stage::Apply => &["apply", "-input=false", "-no-color", "-auto-approve"],
            Stage::Output => &["output", "-json", "-no-color"],
            Stage::Destroy => &["destroy", "-input=false", "-no-color", "-auto-approve"],
        };
        let mut args: Vec<String> = args.iter().map(|a| a.to_string()).collect();

        match self {
            Stage::Plan => args.push(format!("-out={}", PLAN_FILE)),
            Stage::Apply => args.push(PLAN_FILE.to_string()),
            _ => {}
        }
        args
    }

    /// Arguments previewing a destroy without changing anything
    pub fn destroy_preview_args() -> Vec<String> {
        ["plan", "-destroy", "-input=false", "-no-color"]
            .iter()
            .map(|a| a.to_string())
            .collect()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a stage did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub class: ErrorClass,
    pub message: String,
}

impl StageFailure {
    /// Failure from an invocation that exited non-zero
    pub fn from_exit(stage: Stage, output: &ToolOutput) -> Self {
        let code = output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        Self {
            stage,
            class: ErrorClass::Transient,
            message: format!("exit code {}: {}", code, output.diagnostic()),
        }
    }

    /// Failure from an invocation that never produced an exit status
    pub fn from_tool_error(stage: Stage, error: &ToolError) -> Self {
        let message = match error.class() {
            ErrorClass::Environment => format!("environment error: {}", error),
            _ => error.to_string(),
        };
        Self {
            stage,
            class: error.class(),
            message,
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Result of a full pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Succeeded { output: String },
    Failed(StageFailure),
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowOutcome::Succeeded { .. })
    }

    /// Output text on success, stage-prefixed error text on failure
    pub fn text(&self) -> String {
        match self {
            WorkflowOutcome::Succeeded { output } => output.clone(),
            WorkflowOutcome::Failed(failure) => failure.to_string(),
        }
    }
}
