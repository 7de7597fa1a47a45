//! Per-request terraform workspaces

pub mod hcl;
pub mod renderer;
pub mod variables;

pub use renderer::*;

use crate::error::ErrorClass;
use crate::models::ResourceType;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File names inside a workspace
pub const PROVIDER_FILE: &str = "provider.tf";
pub const MAIN_FILE: &str = "main.tf";
pub const VARIABLES_FILE: &str = "terraform.tfvars";
pub const PLAN_FILE: &str = "tfplan";

/// Errors raised while rendering a workspace
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("{resource_type} config field '{field}' cannot be defaulted: {reason}")]
    MissingField {
        resource_type: ResourceType,
        field: &'static str,
        reason: String,
    },

    #[error("config field '{field}' is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RenderError::Write { .. } => ErrorClass::Transient,
            _ => ErrorClass::Validation,
        }
    }
}

/// Directory layout under the workspaces root.
///
/// Each request owns exactly one directory, `request-<id>`.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace directory of a request
    pub fn workspace_dir(&self, request_id: i64) -> PathBuf {
        self.root.join(format!("request-{}", request_id))
    }

    /// Directory holding per-request lease files
    pub fn lock_dir(&self) -> PathBuf {
        self.root.join(".locks")
    }

    pub fn exists(&self, request_id: i64) -> bool {
        self.workspace_dir(request_id).is_dir()
    }

    /// Delete a request's workspace
    pub fn remove(&self, request_id: i64) -> std::io::Result<()> {
        std::fs::remove_dir_all(self.workspace_dir(request_id))
    }
}
