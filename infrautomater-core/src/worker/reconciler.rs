//! Recovery of requests left in `provisioning` by a dead worker

use super::{JobKind, Worker};
use crate::models::{RequestStatus, ResourceRequest, WorkerConfiguration};
use crate::store::{RequestStore, StoreError};
use crate::task::{LeaseError, RequestLease};
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;

pub struct Reconciler {
    store: Arc<dyn RequestStore>,
    lock_dir: PathBuf,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RequestStore>, lock_dir: PathBuf, stale_after: Duration) -> Self {
        Self {
            store,
            lock_dir,
            stale_after,
        }
    }

    pub fn from_config(store: Arc<dyn RequestStore>, config: &WorkerConfiguration) -> Self {
        Self::new(
            store,
            config.workspaces_root.join(".locks"),
            Duration::minutes(config.stale_after_minutes),
        )
    }

    /// Requests in `provisioning` whose last update is older than the
    /// threshold and that no live task holds a lease on
    pub fn find_stale(&self, now: DateTime<Utc>) -> Result<Vec<ResourceRequest>, StoreError> {
        let cutoff = now - self.stale_after;
        let stale = self
            .store
            .list_requests(Some(RequestStatus::Provisioning))?
            .into_iter()
            .filter(|request| request.updated_at <= cutoff)
            .filter(|request| !self.is_held(request.id))
            .collect();
        Ok(stale)
    }

    fn is_held(&self, request_id: i64) -> bool {
        match RequestLease::acquire(&self.lock_dir, request_id) {
            Ok(_) => false,
            Err(LeaseError::Busy(_)) => true,
            Err(e) => {
                tracing::warn!(request_id, "Could not check lease: {}", e);
                true
            }
        }
    }

    /// Move stale requests back to `approved` and submit them to the worker.
    ///
    /// Returns the ids that were re-driven.
    pub fn redrive(&self, worker: &Worker, now: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let mut redriven = Vec::new();

        for mut request in self.find_stale(now)? {
            if worker.is_in_flight(request.id, JobKind::Provision) {
                continue;
            }

            let stuck_minutes = (now - request.updated_at).num_minutes();
            request.status = RequestStatus::Approved;
            request.append_note(
                now,
                &format!(
                    "Re-queued after {} minutes stuck in provisioning",
                    stuck_minutes
                ),
            );
            self.store.save_request(&request)?;

            tracing::warn!(request_id = request.id, stuck_minutes, "Re-driving stale request");
            worker.submit(JobKind::Provision, request.id);
            redriven.push(request.id);
        }

        Ok(redriven)
    }
}
