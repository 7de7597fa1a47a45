//! Access to resource requests owned by the approval system

pub mod json;

pub use json::*;

use crate::models::{RequestStatus, ResourceRequest};
use thiserror::Error;

/// Errors raised by a request store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("request store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("request store unavailable: {0}")]
    Unavailable(String),
}

/// Read/write access to resource requests.
///
/// Every `save_request` is a single atomic commit of the whole record.
pub trait RequestStore: Send + Sync {
    /// Load a request by id, `None` when it does not exist
    fn load_request(&self, id: i64) -> Result<Option<ResourceRequest>, StoreError>;

    /// Persist a request, replacing the stored copy with the same id
    fn save_request(&self, request: &ResourceRequest) -> Result<(), StoreError>;

    /// List requests, optionally filtered by status
    fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ResourceRequest>, StoreError>;
}
