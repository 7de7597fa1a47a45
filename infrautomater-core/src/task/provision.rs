//! Provisioning task: request state machine around the pipeline

use super::{persist_with_recovery, LeaseError, RequestLease, RetryPolicy, TaskError, TaskReport};
use crate::models::{RequestStatus, ResourceRequest, TaskResult, TaskStatus, WorkerConfiguration};
use crate::runner::ToolRunner;
use crate::services::logging::log_task_outcome;
use crate::store::RequestStore;
use crate::workflow::{ProvisioningWorkflow, WorkflowOutcome};
use crate::workspace::{RenderSettings, WorkspaceLayout, WorkspaceRenderer};
use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

/// First attempts need an approval; retries pick up their own failure
fn is_eligible(status: RequestStatus, attempt: u32) -> bool {
    match status {
        RequestStatus::Approved => true,
        RequestStatus::Failed => attempt > 1,
        _ => false,
    }
}

/// Drives one request from `approved` to `provisioned` or `failed`
pub struct ProvisioningTask {
    store: Arc<dyn RequestStore>,
    renderer: WorkspaceRenderer,
    workflow: ProvisioningWorkflow,
    policy: RetryPolicy,
}

impl ProvisioningTask {
    pub fn new(
        store: Arc<dyn RequestStore>,
        renderer: WorkspaceRenderer,
        workflow: ProvisioningWorkflow,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            renderer,
            workflow,
            policy,
        }
    }

    pub fn from_config(
        store: Arc<dyn RequestStore>,
        runner: Arc<dyn ToolRunner>,
        config: &WorkerConfiguration,
    ) -> Self {
        let renderer = WorkspaceRenderer::new(
            WorkspaceLayout::new(&config.workspaces_root),
            RenderSettings::from_config(config),
        );
        Self::new(
            store,
            renderer,
            ProvisioningWorkflow::from_config(runner, config),
            RetryPolicy::from_settings(&config.retry),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one attempt for a request.
    ///
    /// `attempt` is 1 for the run triggered by approval and grows with each
    /// retry. Never panics and never returns an error: every branch ends in a
    /// report, with `retry_after` set when the queue should run it again.
    pub async fn run(&self, request_id: i64, attempt: u32) -> TaskReport {
        let span = tracing::info_span!("provision", request_id, attempt);
        let report = self.run_attempt(request_id, attempt).instrument(span).await;
        log_task_outcome("provision", attempt, &report.result);
        report
    }

    async fn run_attempt(&self, request_id: i64, attempt: u32) -> TaskReport {
        let _lease = match RequestLease::acquire(&self.renderer.layout().lock_dir(), request_id) {
            Ok(lease) => lease,
            Err(LeaseError::Busy(_)) => {
                // Another task owns the request; it will settle the status
                return TaskReport::done(TaskResult::with_message(
                    TaskStatus::Skipped,
                    request_id,
                    "Request is being handled by another task",
                ));
            }
            Err(e) => return self.error_report(request_id, attempt, TaskError::from(e)),
        };

        let mut request = match self.store.load_request(request_id) {
            Ok(Some(request)) => request,
            Ok(None) => {
                return self.error_report(request_id, attempt, TaskError::RequestNotFound(request_id))
            }
            Err(e) => return self.error_report(request_id, attempt, TaskError::from(e)),
        };

        if !is_eligible(request.status, attempt) {
            tracing::info!(status = %request.status, "Request not eligible, skipping");
            return TaskReport::done(TaskResult::with_message(
                TaskStatus::Skipped,
                request_id,
                format!("Request status is {}", request.status),
            ));
        }

        request.status = RequestStatus::Provisioning;
        if let Err(e) = self.store.save_request(&request) {
            return self.fail(request, attempt, TaskError::from(e));
        }

        match self.provision(&request).await {
            Ok(note) => self.succeed(request, &note),
            Err(e) => self.fail(request, attempt, e),
        }
    }

    /// Render and run the pipeline, returning the success note
    async fn provision(&self, request: &ResourceRequest) -> Result<String, TaskError> {
        let rendered = self.renderer.render_request(request)?;
        tracing::info!(dir = %rendered.dir.display(), "Workspace rendered: {}", rendered.summary);

        match self.workflow.execute(&rendered.dir).await {
            WorkflowOutcome::Succeeded { output } => Ok(format!(
                "Provisioned successfully: {}\n{}",
                rendered.summary, output
            )),
            WorkflowOutcome::Failed(failure) => Err(TaskError::from(failure)),
        }
    }

    fn succeed(&self, mut request: ResourceRequest, note: &str) -> TaskReport {
        request.status = RequestStatus::Provisioned;
        request.append_note(Utc::now(), note);

        let outcome = persist_with_recovery(self.store.as_ref(), &request);
        if !outcome.is_durable() {
            tracing::error!("Resource provisioned but its status was not recorded");
        }

        TaskReport::done(TaskResult::with_message(
            TaskStatus::Provisioned,
            request.id,
            note,
        ))
    }

    fn fail(&self, mut request: ResourceRequest, attempt: u32, error: TaskError) -> TaskReport {
        let class = error.class();
        let message = error.to_string();

        request.status = RequestStatus::Failed;
        request.append_note(Utc::now(), &format!("Provisioning failed: {}", message));
        persist_with_recovery(self.store.as_ref(), &request);

        let delay = self.policy.next_delay(attempt, class);
        match delay {
            Some(delay) => tracing::warn!(
                class = %class,
                retry_in_seconds = delay.as_secs(),
                "Attempt failed, retry scheduled: {}",
                message
            ),
            None if class.is_retryable() => {
                tracing::error!(class = %class, "Retries exhausted: {}", message)
            }
            None => tracing::error!(class = %class, "Attempt failed permanently: {}", message),
        }

        TaskReport::retry(
            TaskResult::with_message(TaskStatus::Failed, request.id, message),
            delay,
        )
    }

    /// Failures before the request could be marked `provisioning`
    fn error_report(&self, request_id: i64, attempt: u32, error: TaskError) -> TaskReport {
        let delay = self.policy.next_delay(attempt, error.class());
        TaskReport::retry(
            TaskResult::with_message(TaskStatus::Error, request_id, error.to_string()),
            delay,
        )
    }
}
