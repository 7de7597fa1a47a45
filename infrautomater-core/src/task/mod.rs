//! Retryable units of work bound to one resource request

pub mod destroy;
pub mod lease;
pub mod provision;
pub mod retry;

pub use destroy::*;
pub use lease::*;
pub use provision::*;
pub use retry::*;

use crate::error::ErrorClass;
use crate::models::{ResourceRequest, TaskResult};
use crate::services::logging::log_persistence_loss;
use crate::store::{RequestStore, StoreError};
use crate::workflow::StageFailure;
use crate::workspace::RenderError;
use std::time::Duration;
use thiserror::Error;

/// Failures that end a task attempt early
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Request not found")]
    RequestNotFound(i64),

    #[error("Workspace not found")]
    WorkspaceNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("{0}")]
    Stage(StageFailure),
}

impl TaskError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TaskError::RequestNotFound(_) | TaskError::WorkspaceNotFound(_) => {
                ErrorClass::Validation
            }
            TaskError::Store(_) => ErrorClass::Persistence,
            TaskError::Lease(e) => e.class(),
            TaskError::Render(e) => e.class(),
            TaskError::Stage(failure) => failure.class,
        }
    }
}

impl From<StageFailure> for TaskError {
    fn from(failure: StageFailure) -> Self {
        TaskError::Stage(failure)
    }
}

/// Result of a best-effort status write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The first write succeeded
    Committed,
    /// The first write failed and the follow-up write succeeded
    Recovered,
    /// Both writes failed; carries the last error text
    Lost(String),
}

impl PersistOutcome {
    pub fn is_durable(&self) -> bool {
        !matches!(self, PersistOutcome::Lost(_))
    }
}

/// What a task attempt reports back to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub result: TaskResult,
    /// Set when the same job should run again after this delay
    pub retry_after: Option<Duration>,
}

impl TaskReport {
    pub fn done(result: TaskResult) -> Self {
        Self {
            result,
            retry_after: None,
        }
    }

    pub fn retry(result: TaskResult, delay: Option<Duration>) -> Self {
        Self {
            result,
            retry_after: delay,
        }
    }
}

/// Write a request's status and notes, falling back to a second write.
///
/// The fallback reloads the stored row and copies status and notes onto
/// it, so a failure that came from a stale in-memory copy can still land.
/// Neither failure is propagated; the caller's outcome stands.
pub fn persist_with_recovery(store: &dyn RequestStore, request: &ResourceRequest) -> PersistOutcome {
    let primary = match store.save_request(request) {
        Ok(()) => return PersistOutcome::Committed,
        Err(e) => e,
    };

    tracing::warn!(
        request_id = request.id,
        status = %request.status,
        "Status write failed, retrying once: {}",
        primary
    );

    let secondary = store.load_request(request.id).and_then(|stored| {
        let mut current = stored.unwrap_or_else(|| request.clone());
        current.status = request.status;
        current.admin_notes = request.admin_notes.clone();
        store.save_request(&current)
    });

    match secondary {
        Ok(()) => PersistOutcome::Recovered,
        Err(secondary) => {
            log_persistence_loss(request.id, &primary.to_string(), &secondary.to_string());
            PersistOutcome::Lost(secondary.to_string())
        }
    }
}
