//! Worker pool draining the task queue with bounded concurrency

use super::{Job, JobKind, Reconciler, TaskQueue};
use crate::models::{RequestStatus, WorkerConfiguration};
use crate::runner::ToolRunner;
use crate::store::RequestStore;
use crate::task::{DestructionTask, ProvisioningTask, TaskReport};
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};

/// Runs queued jobs, at most `concurrency` at a time, and requeues the
/// ones whose task asked for a retry.
pub struct Worker {
    queue: Arc<TaskQueue>,
    store: Arc<dyn RequestStore>,
    provisioning: Arc<ProvisioningTask>,
    destruction: Arc<DestructionTask>,
    reconciler: Option<Reconciler>,
    permits: Arc<Semaphore>,
    /// Jobs queued or running, keyed by request and kind
    scheduled: DashMap<(i64, JobKind), Instant>,
    /// Jobs currently executing, keyed like `scheduled`
    in_flight: DashMap<(i64, JobKind), Instant>,
}

impl Worker {
    pub fn new(
        queue: Arc<TaskQueue>,
        store: Arc<dyn RequestStore>,
        provisioning: ProvisioningTask,
        destruction: DestructionTask,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            store,
            provisioning: Arc::new(provisioning),
            destruction: Arc::new(destruction),
            reconciler: None,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            scheduled: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    pub fn from_config(
        store: Arc<dyn RequestStore>,
        runner: Arc<dyn ToolRunner>,
        config: &WorkerConfiguration,
    ) -> Self {
        let provisioning = ProvisioningTask::from_config(store.clone(), runner.clone(), config);
        let destruction = DestructionTask::from_config(store.clone(), runner, config);
        Self::new(
            Arc::new(TaskQueue::new()),
            store,
            provisioning,
            destruction,
            config.worker_concurrency,
        )
    }

    /// Also re-drive stale requests on every poll of [`Worker::serve`]
    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Enqueue a job unless the same job is already queued or running
    pub fn submit(&self, kind: JobKind, request_id: i64) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.scheduled.entry((request_id, kind)) {
            Entry::Occupied(_) => {
                tracing::debug!(request_id, kind = %kind, "Job already scheduled");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                match kind {
                    JobKind::Provision => self.queue.submit_provisioning(request_id),
                    JobKind::Destroy => self.queue.submit_destruction(request_id),
                }
                true
            }
        }
    }

    pub fn is_in_flight(&self, request_id: i64, kind: JobKind) -> bool {
        self.in_flight.contains_key(&(request_id, kind))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run until the queue is empty and nothing is executing, waiting out
    /// retry delays. Returns every attempt's report in completion order.
    pub async fn drain(self: &Arc<Self>) -> Vec<TaskReport> {
        let mut running = JoinSet::new();
        let mut reports = Vec::new();

        loop {
            self.launch_ready(&mut running);
            let next_due = self.next_wakeup();

            if running.is_empty() {
                match next_due {
                    Some(at) => {
                        sleep_until(at).await;
                        continue;
                    }
                    None => break,
                }
            }

            tokio::select! {
                Some(joined) = running.join_next() => {
                    if let Some(report) = collect(joined) {
                        reports.push(report);
                    }
                }
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {}
            }
        }

        reports
    }

    /// Long-running loop: poll the store for approved requests every
    /// `poll_interval` and execute jobs until `shutdown` resolves.
    /// Tasks already running are awaited before returning.
    pub async fn serve<F>(self: &Arc<Self>, poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(poll_interval);
        let mut running = JoinSet::new();
        tokio::pin!(shutdown);

        tracing::info!(
            poll_interval_seconds = poll_interval.as_secs(),
            "Worker started"
        );

        loop {
            self.launch_ready(&mut running);
            let next_due = self.next_wakeup();

            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.poll_store(),
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    collect(joined);
                }
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {}
            }
        }

        tracing::info!(running = running.len(), "Worker stopping, waiting for running tasks");
        while let Some(joined) = running.join_next().await {
            collect(joined);
        }
    }

    /// Submit approved requests and re-drive stale ones
    fn poll_store(&self) {
        if let Some(reconciler) = &self.reconciler {
            if let Err(e) = reconciler.redrive(self, Utc::now()) {
                tracing::warn!("Stale request check failed: {}", e);
            }
        }

        match self.store.list_requests(Some(RequestStatus::Approved)) {
            Ok(requests) => {
                for request in requests {
                    self.submit(JobKind::Provision, request.id);
                }
            }
            Err(e) => tracing::warn!("Polling approved requests failed: {}", e),
        }
    }

    /// When the earliest queued job becomes due. `None` while every permit
    /// is taken, since only a finishing task can free one.
    fn next_wakeup(&self) -> Option<Instant> {
        if self.permits.available_permits() == 0 {
            return None;
        }
        self.queue.next_due()
    }

    /// Start every due job a permit is available for
    fn launch_ready(self: &Arc<Self>, running: &mut JoinSet<TaskReport>) {
        while let Ok(permit) = self.permits.clone().try_acquire_owned() {
            let Some(job) = self.queue.pop_ready(Instant::now()) else {
                break;
            };

            let worker = Arc::clone(self);
            running.spawn(async move {
                let _permit = permit;
                worker.execute(job).await
            });
        }
    }

    /// Run one job and requeue it when its task asks for a retry
    pub async fn execute(&self, job: Job) -> TaskReport {
        let key = (job.request_id, job.kind);
        self.in_flight.insert(key, Instant::now());

        let report = match job.kind {
            JobKind::Provision => self.provisioning.run(job.request_id, job.attempt).await,
            JobKind::Destroy => self.destruction.run(job.request_id, job.attempt).await,
        };

        self.in_flight.remove(&key);

        match report.retry_after {
            Some(delay) => {
                tracing::info!(
                    request_id = job.request_id,
                    kind = %job.kind,
                    next_attempt = job.attempt + 1,
                    delay_seconds = delay.as_secs(),
                    "Requeueing job"
                );
                self.queue.push(job.retry_after(delay));
            }
            None => {
                self.scheduled.remove(&key);
            }
        }

        report
    }
}

fn collect(joined: Result<TaskReport, JoinError>) -> Option<TaskReport> {
    match joined {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::error!("Task execution panicked: {}", e);
            None
        }
    }
}
