//! The fixed init → plan → apply → output pipeline

use super::outputs::format_outputs;
use super::stage::{Stage, StageFailure, WorkflowOutcome};
use crate::models::{ExecutionMode, WorkerConfiguration};
use crate::runner::{ToolOutput, ToolRunner};
use std::path::Path;
use std::sync::Arc;

/// Prefix of every dry-run success text
pub const DRY_RUN_MARKER: &str = "[DRY RUN]";

/// Runs the provisioning pipeline against one rendered workspace
pub struct ProvisioningWorkflow {
    runner: Arc<dyn ToolRunner>,
    mode: ExecutionMode,
    /// Maximum characters of plan output reported in dry-run mode
    plan_summary_limit: usize,
}

impl ProvisioningWorkflow {
    pub fn new(runner: Arc<dyn ToolRunner>, mode: ExecutionMode, plan_summary_limit: usize) -> Self {
        Self {
            runner,
            mode,
            plan_summary_limit,
        }
    }

    pub fn from_config(runner: Arc<dyn ToolRunner>, config: &WorkerConfiguration) -> Self {
        Self::new(runner, config.mode, config.plan_summary_limit)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn plan_summary_limit(&self) -> usize {
        self.plan_summary_limit
    }

    /// Run one stage, turning anything but a zero exit into a failure
    pub async fn run_stage(
        &self,
        stage: Stage,
        workspace_dir: &Path,
        args: &[String],
    ) -> Result<ToolOutput, StageFailure> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        tracing::info!(stage = %stage, dir = %workspace_dir.display(), "Running stage");

        match self.runner.run(workspace_dir, &args).await {
            Ok(output) if output.success => Ok(output),
            Ok(output) => Err(StageFailure::from_exit(stage, &output)),
            Err(e) => Err(StageFailure::from_tool_error(stage, &e)),
        }
    }

    /// Execute the pipeline, stopping at the first failing stage
    pub async fn execute(&self, workspace_dir: &Path) -> WorkflowOutcome {
        match self.execute_stages(workspace_dir).await {
            Ok(output) => WorkflowOutcome::Succeeded { output },
            Err(failure) => {
                tracing::warn!(
                    stage = %failure.stage,
                    class = %failure.class,
                    "Pipeline failed: {}",
                    failure.message
                );
                WorkflowOutcome::Failed(failure)
            }
        }
    }

    async fn execute_stages(&self, workspace_dir: &Path) -> Result<String, StageFailure> {
        self.run_stage(Stage::Init, workspace_dir, &Stage::Init.args())
            .await?;

        let plan = self
            .run_stage(Stage::Plan, workspace_dir, &Stage::Plan.args())
            .await?;

        if self.mode.is_dry_run() {
            tracing::info!(dir = %workspace_dir.display(), "Dry run - skipping apply");
            return Ok(dry_run_summary(&plan.stdout, self.plan_summary_limit));
        }

        let apply = self
            .run_stage(Stage::Apply, workspace_dir, &Stage::Apply.args())
            .await?;

        Ok(self.collect_outputs(workspace_dir, &apply.stdout).await)
    }

    /// Read structured outputs, falling back to the apply text.
    ///
    /// The resource already exists at this point, so an unreadable output
    /// never turns the run into a failure.
    async fn collect_outputs(&self, workspace_dir: &Path, apply_stdout: &str) -> String {
        match self
            .run_stage(Stage::Output, workspace_dir, &Stage::Output.args())
            .await
        {
            Ok(output) => match format_outputs(&output.stdout) {
                Some(formatted) => formatted,
                None => {
                    tracing::warn!("Could not parse tool outputs, using apply output");
                    apply_stdout.trim().to_string()
                }
            },
            Err(failure) => {
                tracing::warn!("Output collection failed ({}), using apply output", failure);
                apply_stdout.trim().to_string()
            }
        }
    }
}

/// Dry-run report: the plan's change line first, then the truncated plan
pub fn dry_run_summary(plan_stdout: &str, limit: usize) -> String {
    let changes = plan_stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Plan:") || line.starts_with("No changes."));

    let mut summary = String::from(DRY_RUN_MARKER);
    if let Some(changes) = changes {
        summary.push(' ');
        summary.push_str(changes);
    }

    let plan = truncate_chars(plan_stdout.trim(), limit);
    if !plan.is_empty() {
        summary.push('\n');
        summary.push_str(&plan);
    }
    summary
}

/// Keep at most `limit` characters, marking the cut
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}
