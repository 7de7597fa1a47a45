//! Per-request mutual exclusion across tasks and worker processes

use crate::error::ErrorClass;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("request {0} is held by another task")]
    Busy(i64),

    #[error("failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LeaseError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Transient
    }
}

/// Exclusive hold on one request id, released on drop.
///
/// Backed by an advisory file lock under the workspaces root, so it also
/// excludes tasks running in other processes on the same host.
#[derive(Debug)]
pub struct RequestLease {
    request_id: i64,
    path: PathBuf,
    holder: Uuid,
    file: File,
}

impl RequestLease {
    /// Take the lease without waiting
    pub fn acquire(lock_dir: &Path, request_id: i64) -> Result<Self, LeaseError> {
        let path = lock_dir.join(format!("request-{}.lock", request_id));
        let io_err = |source| LeaseError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(lock_dir).map_err(io_err)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(LeaseError::Busy(request_id));
            }
            return Err(io_err(e));
        }

        let holder = Uuid::new_v4();
        // The token only helps operators inspecting a stuck lock
        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{} pid={}", holder, std::process::id()).map_err(io_err)?;

        tracing::debug!(request_id, holder = %holder, "Lease acquired");

        Ok(Self {
            request_id,
            path,
            holder,
            file,
        })
    }

    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    pub fn holder(&self) -> Uuid {
        self.holder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RequestLease {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(request_id = self.request_id, "Failed to release lease: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lease_is_exclusive_per_request() {
        let dir = tempdir().unwrap();
        let locks = dir.path().join(".locks");

        let lease = RequestLease::acquire(&locks, 7).unwrap();
        assert_eq!(lease.request_id(), 7);
        assert!(lease.path().ends_with("request-7.lock"));

        let err = RequestLease::acquire(&locks, 7).unwrap_err();
        assert!(matches!(err, LeaseError::Busy(7)));

        // Other requests are unaffected
        let other = RequestLease::acquire(&locks, 8).unwrap();
        assert_ne!(other.holder(), lease.holder());
    }

    #[test]
    fn test_lease_released_on_drop() {
        let dir = tempdir().unwrap();

        let lease = RequestLease::acquire(dir.path(), 1).unwrap();
        let first = lease.holder();
        drop(lease);

        let again = RequestLease::acquire(dir.path(), 1).unwrap();
        assert_ne!(again.holder(), first);
        let token = std::fs::read_to_string(again.path()).unwrap();
        assert!(token.starts_with(&again.holder().to_string()));
    }
}
