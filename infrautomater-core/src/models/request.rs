//! Resource request data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a resource request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted by a team, awaiting review
    Pending,
    /// Approved by an admin, ready for provisioning
    Approved,
    /// Rejected by an admin
    Rejected,
    /// A provisioning task is running against the request
    Provisioning,
    /// Resource exists
    Provisioned,
    /// Last provisioning attempt failed
    Failed,
    /// Resource was torn down
    Destroyed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Provisioning => "provisioning",
            RequestStatus::Provisioned => "provisioned",
            RequestStatus::Failed => "failed",
            RequestStatus::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of resource kinds the worker knows how to provision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceType {
    #[serde(rename = "database")]
    Database,
    #[serde(rename = "s3")]
    ObjectStorage,
    #[serde(rename = "k8s_namespace")]
    NamespaceQuota,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Database,
        ResourceType::ObjectStorage,
        ResourceType::NamespaceQuota,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Database => "database",
            ResourceType::ObjectStorage => "s3",
            ResourceType::NamespaceQuota => "k8s_namespace",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a request names a resource type outside the closed set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// A team's request for a cloud resource.
///
/// The record is owned by the approval system; the worker only reads it and
/// writes back `status` and `admin_notes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequest {
    pub id: i64,
    pub team_id: i64,
    /// Raw resource type as submitted; parsed into [`ResourceType`] on use
    pub resource_type: String,
    /// Human-assigned name, untrusted
    pub name: String,
    /// Free-form provisioning parameters
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub status: RequestStatus,
    /// Append-only audit trail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRequest {
    /// Create a new pending request
    pub fn new(id: i64, team_id: i64, resource_type: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            team_id,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            config: serde_json::Map::new(),
            status: RequestStatus::Pending,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parse the stored resource type
    pub fn kind(&self) -> Result<ResourceType, UnknownResourceType> {
        self.resource_type.parse()
    }

    /// Append one timestamped block to the audit trail
    pub fn append_note(&mut self, at: DateTime<Utc>, text: &str) {
        let block = format!("[{}] {}", at.format("%Y-%m-%dT%H:%M:%SZ"), text.trim_end());
        match self.admin_notes.as_mut() {
            Some(notes) if !notes.is_empty() => {
                notes.push_str("\n\n");
                notes.push_str(&block);
            }
            _ => self.admin_notes = Some(block),
        }
    }

    pub fn notes(&self) -> &str {
        self.admin_notes.as_deref().unwrap_or("")
    }
}

/// Status reported by a task run.
///
/// Observability only; the persisted request row is authoritative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Provisioned,
    Destroyed,
    Failed,
    Skipped,
    Error,
}

/// Result value handed back to the approval system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub request_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResult {
    pub fn new(status: TaskStatus, request_id: i64) -> Self {
        Self {
            status,
            request_id,
            message: None,
        }
    }

    pub fn with_message(status: TaskStatus, request_id: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            request_id,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resource_type_parsing() {
        assert_eq!("database".parse::<ResourceType>(), Ok(ResourceType::Database));
        assert_eq!("s3".parse::<ResourceType>(), Ok(ResourceType::ObjectStorage));
        assert_eq!("k8s_namespace".parse::<ResourceType>(), Ok(ResourceType::NamespaceQuota));

        let err = "bogus".parse::<ResourceType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown resource type: bogus");
        // No case folding or aliasing
        assert!("Database".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RequestStatus::Provisioning).unwrap();
        assert_eq!(json, "\"provisioning\"");

        let result = TaskResult::new(TaskStatus::Skipped, 7);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["request_id"], 7);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_append_note_keeps_existing_text() {
        let mut request = ResourceRequest::new(1, 1, "s3", "bucket");
        request.admin_notes = Some("Looks good".to_string());

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        request.append_note(at, "Provisioned successfully: done");
        request.append_note(at, "Provisioning failed: boom\n");

        assert_eq!(
            request.notes(),
            "Looks good\n\n[2024-05-01T12:00:00Z] Provisioned successfully: done\n\n\
             [2024-05-01T12:00:00Z] Provisioning failed: boom"
        );
    }

    #[test]
    fn test_append_note_on_empty_notes() {
        let mut request = ResourceRequest::new(1, 1, "s3", "bucket");
        request.admin_notes = Some(String::new());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        request.append_note(at, "first");
        assert_eq!(request.notes(), "[2024-05-01T12:00:00Z] first");
    }
}
