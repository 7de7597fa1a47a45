//! Resource request storage in a single JSON file

use super::{RequestStore, StoreError};
use crate::models::{RequestStatus, ResourceRequest};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Root JSON document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequestDocument {
    pub requests: Vec<ResourceRequest>,
}

/// Request store backed by a JSON file.
///
/// Nothing is cached: every load re-reads the file under a shared lock and
/// every save is a read-modify-write under an exclusive lock, so several
/// worker processes on one host can share the file.
pub struct JsonRequestStore {
    store_path: PathBuf,
}

impl JsonRequestStore {
    /// Open (or create) the store at `store_path`
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self, StoreError> {
        let store_path = store_path.as_ref().to_path_buf();

        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self { store_path })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    fn parse(contents: &str) -> Result<RequestDocument, StoreError> {
        if contents.trim().is_empty() {
            return Ok(RequestDocument::default());
        }
        Ok(serde_json::from_str(contents)?)
    }

    /// Read the document with a shared lock
    fn read_document(&self) -> Result<RequestDocument, StoreError> {
        let file = match File::open(&self.store_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RequestDocument::default())
            }
            Err(e) => return Err(e.into()),
        };

        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        reader.read_to_string(&mut contents)?;

        file.unlock()?;

        Self::parse(&contents)
    }

    /// Apply `update` to the document under an exclusive lock and write it back
    fn modify_document<F>(&self, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RequestDocument),
    {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.store_path)?;

        file.lock_exclusive()?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut document = Self::parse(&contents)?;

        update(&mut document);

        let json = serde_json::to_string_pretty(&document)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.sync_data()?;

        // Lock released when the file is dropped
        Ok(())
    }

    /// Insert a request, or replace the stored one with the same id
    pub fn upsert_request(&self, request: ResourceRequest) -> Result<(), StoreError> {
        self.modify_document(|document| {
            match document.requests.iter_mut().find(|r| r.id == request.id) {
                Some(existing) => *existing = request,
                None => document.requests.push(request),
            }
        })
    }
}

impl RequestStore for JsonRequestStore {
    fn load_request(&self, id: i64) -> Result<Option<ResourceRequest>, StoreError> {
        let document = self.read_document()?;
        Ok(document.requests.into_iter().find(|r| r.id == id))
    }

    fn save_request(&self, request: &ResourceRequest) -> Result<(), StoreError> {
        let mut request = request.clone();
        request.updated_at = Utc::now();
        self.upsert_request(request)
    }

    fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ResourceRequest>, StoreError> {
        let mut requests: Vec<_> = self
            .read_document()?
            .requests
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        requests.sort_by_key(|r| r.id);
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_initialization() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("nested").join("requests.json");

        let store = JsonRequestStore::new(&store_path).unwrap();

        // File may not exist until first save, but parent directory should exist
        assert!(store_path.parent().unwrap().exists());
        assert!(store.list_requests(None).unwrap().is_empty());
        assert!(store.load_request(1).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_request() {
        let dir = tempdir().unwrap();
        let store = JsonRequestStore::new(dir.path().join("requests.json")).unwrap();

        let mut request = ResourceRequest::new(4, 9, "database", "orders");
        request
            .config
            .insert("engine".to_string(), serde_json::json!("mysql"));
        let created = request.updated_at;
        store.save_request(&request).unwrap();

        let loaded = store.load_request(4).unwrap().unwrap();
        assert_eq!(loaded.name, "orders");
        assert_eq!(loaded.config["engine"], "mysql");
        assert!(loaded.updated_at >= created);

        request.status = RequestStatus::Approved;
        store.save_request(&request).unwrap();
        let reloaded = store.load_request(4).unwrap().unwrap();
        assert_eq!(reloaded.status, RequestStatus::Approved);
        assert_eq!(store.list_requests(None).unwrap().len(), 1);
    }

    #[test]
    fn test_list_requests_filters_by_status() {
        let dir = tempdir().unwrap();
        let store = JsonRequestStore::new(dir.path().join("requests.json")).unwrap();

        for (id, status) in [
            (3, RequestStatus::Approved),
            (1, RequestStatus::Approved),
            (2, RequestStatus::Rejected),
        ] {
            let mut request = ResourceRequest::new(id, 1, "s3", "bucket");
            request.status = status;
            store.save_request(&request).unwrap();
        }

        let approved = store.list_requests(Some(RequestStatus::Approved)).unwrap();
        let ids: Vec<_> = approved.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_two_handles_see_each_others_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requests.json");
        let first = JsonRequestStore::new(&path).unwrap();
        let second = JsonRequestStore::new(&path).unwrap();

        first
            .save_request(&ResourceRequest::new(1, 1, "s3", "a"))
            .unwrap();
        second
            .save_request(&ResourceRequest::new(2, 1, "s3", "b"))
            .unwrap();

        assert_eq!(first.list_requests(None).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonRequestStore::new(&path).unwrap();
        assert!(matches!(store.load_request(1), Err(StoreError::Corrupt(_))));
    }
}
