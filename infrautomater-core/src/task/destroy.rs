//! Destruction task: tear down a request's resource and its workspace

use super::{persist_with_recovery, RequestLease, RetryPolicy, TaskError, TaskReport};
use crate::models::{RequestStatus, TaskResult, TaskStatus, WorkerConfiguration};
use crate::runner::ToolRunner;
use crate::services::logging::log_task_outcome;
use crate::store::RequestStore;
use crate::workflow::{dry_run_summary, ProvisioningWorkflow, Stage};
use crate::workspace::WorkspaceLayout;
use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

pub struct DestructionTask {
    store: Arc<dyn RequestStore>,
    layout: WorkspaceLayout,
    workflow: ProvisioningWorkflow,
    policy: RetryPolicy,
}

impl DestructionTask {
    pub fn new(
        store: Arc<dyn RequestStore>,
        layout: WorkspaceLayout,
        workflow: ProvisioningWorkflow,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            layout,
            workflow,
            policy,
        }
    }

    pub fn from_config(
        store: Arc<dyn RequestStore>,
        runner: Arc<dyn ToolRunner>,
        config: &WorkerConfiguration,
    ) -> Self {
        Self::new(
            store,
            WorkspaceLayout::new(&config.workspaces_root),
            ProvisioningWorkflow::from_config(runner, config),
            RetryPolicy::from_settings(&config.retry),
        )
    }

    /// Run one destruction attempt.
    ///
    /// A missing request or workspace is reported as an error without
    /// touching the store. A failing destroy keeps the status and the
    /// workspace so the attempt can be inspected or repeated. In dry-run
    /// mode only a destroy plan runs, so the request ends `skipped` with
    /// its status and workspace untouched.
    pub async fn run(&self, request_id: i64, attempt: u32) -> TaskReport {
        let span = tracing::info_span!("destroy", request_id, attempt);
        let report = self.run_attempt(request_id, attempt).instrument(span).await;
        log_task_outcome("destroy", attempt, &report.result);
        report
    }

    async fn run_attempt(&self, request_id: i64, attempt: u32) -> TaskReport {
        let _lease = match RequestLease::acquire(&self.layout.lock_dir(), request_id) {
            Ok(lease) => lease,
            Err(e) => return self.error_report(request_id, attempt, TaskError::from(e)),
        };

        let mut request = match self.store.load_request(request_id) {
            Ok(Some(request)) => request,
            Ok(None) => {
                return self.error_report(request_id, attempt, TaskError::RequestNotFound(request_id))
            }
            Err(e) => return self.error_report(request_id, attempt, TaskError::from(e)),
        };

        if !self.layout.exists(request_id) {
            return self.error_report(request_id, attempt, TaskError::WorkspaceNotFound(request_id));
        }

        let dir = self.layout.workspace_dir(request_id);
        let dry_run = self.workflow.mode().is_dry_run();
        let args = if dry_run {
            Stage::destroy_preview_args()
        } else {
            Stage::Destroy.args()
        };

        match self.workflow.run_stage(Stage::Destroy, &dir, &args).await {
            Ok(output) if dry_run => {
                // Nothing was destroyed: keep the status and the state files
                let note = format!(
                    "Destroy preview\n{}",
                    dry_run_summary(&output.stdout, self.workflow.plan_summary_limit())
                );
                request.append_note(Utc::now(), &note);
                persist_with_recovery(self.store.as_ref(), &request);

                TaskReport::done(TaskResult::with_message(
                    TaskStatus::Skipped,
                    request_id,
                    note,
                ))
            }
            Ok(_) => {
                let note = "Destroyed successfully";
                request.status = RequestStatus::Destroyed;
                request.append_note(Utc::now(), note);
                persist_with_recovery(self.store.as_ref(), &request);

                // The resource is gone; a leftover directory is only clutter
                if let Err(e) = self.layout.remove(request_id) {
                    tracing::warn!(dir = %dir.display(), "Failed to remove workspace: {}", e);
                }

                TaskReport::done(TaskResult::with_message(
                    TaskStatus::Destroyed,
                    request_id,
                    note,
                ))
            }
            Err(failure) => {
                let error = TaskError::from(failure);
                request.append_note(Utc::now(), &format!("Destruction failed: {}", error));
                persist_with_recovery(self.store.as_ref(), &request);

                let delay = self.policy.next_delay(attempt, error.class());
                TaskReport::retry(
                    TaskResult::with_message(TaskStatus::Failed, request_id, error.to_string()),
                    delay,
                )
            }
        }
    }

    fn error_report(&self, request_id: i64, attempt: u32, error: TaskError) -> TaskReport {
        let delay = self.policy.next_delay(attempt, error.class());
        tracing::warn!(class = %error.class(), "Destruction not started: {}", error);
        TaskReport::retry(
            TaskResult::with_message(TaskStatus::Error, request_id, error.to_string()),
            delay,
        )
    }
}
