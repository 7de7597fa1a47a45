//! Workspace rendering: provider, module invocation, and variable values

use super::hcl::quote;
use super::variables::{self, ResolvedVariables, VariableDefaults};
use super::{RenderError, WorkspaceLayout, MAIN_FILE, PROVIDER_FILE, VARIABLES_FILE};
use crate::models::{ResourceRequest, ResourceType, WorkerConfiguration};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Variables whose values must never show up in plan output
const SENSITIVE_VARIABLES: &[&str] = &["password"];

/// Deployment settings the renderer needs
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Directory containing one terraform module per resource type
    pub modules_root: PathBuf,
    pub default_region: String,
    pub kubeconfig_path: PathBuf,
}

impl RenderSettings {
    pub fn from_config(config: &WorkerConfiguration) -> Self {
        Self {
            modules_root: config.modules_root.clone(),
            default_region: config.default_region.clone(),
            kubeconfig_path: config.kubeconfig_path.clone(),
        }
    }
}

/// A rendered workspace ready for the pipeline
#[derive(Debug, Clone)]
pub struct RenderedWorkspace {
    pub dir: PathBuf,
    /// One-line description of the resource, e.g. `S3 bucket logs in eu-west-1`
    pub summary: String,
}

enum Provider {
    Aws,
    Kubernetes,
}

fn provider(kind: ResourceType) -> Provider {
    match kind {
        ResourceType::Database | ResourceType::ObjectStorage => Provider::Aws,
        ResourceType::NamespaceQuota => Provider::Kubernetes,
    }
}

/// Module directory under the modules root
pub fn module_name(kind: ResourceType) -> &'static str {
    match kind {
        ResourceType::Database => "database",
        ResourceType::ObjectStorage => "s3_bucket",
        ResourceType::NamespaceQuota => "k8s_namespace",
    }
}

/// Outputs declared for a resource type, with their sensitivity
pub fn outputs(kind: ResourceType) -> &'static [(&'static str, bool)] {
    match kind {
        ResourceType::Database => &[
            ("endpoint", false),
            ("port", false),
            ("db_name", false),
            ("username", false),
            ("password", true),
        ],
        ResourceType::ObjectStorage => &[
            ("bucket_name", false),
            ("bucket_arn", false),
            ("region", false),
        ],
        ResourceType::NamespaceQuota => &[("namespace", false), ("resource_quota", false)],
    }
}

/// Writes the configuration files of a request's workspace
#[derive(Debug, Clone)]
pub struct WorkspaceRenderer {
    layout: WorkspaceLayout,
    settings: RenderSettings,
}

impl WorkspaceRenderer {
    pub fn new(layout: WorkspaceLayout, settings: RenderSettings) -> Self {
        Self { layout, settings }
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Render the workspace for a stored request
    pub fn render_request(&self, request: &ResourceRequest) -> Result<RenderedWorkspace, RenderError> {
        let kind = request
            .kind()
            .map_err(|e| RenderError::UnknownResourceType(e.0))?;
        self.render(request.id, kind, &request.name, &request.config, request.team_id)
    }

    /// Render (or re-render) a workspace.
    ///
    /// All values are resolved before anything touches the disk, so a
    /// request with unusable config leaves no files behind. Generated
    /// secrets are new on every call.
    pub fn render(
        &self,
        request_id: i64,
        kind: ResourceType,
        name: &str,
        config: &Map<String, Value>,
        team_id: i64,
    ) -> Result<RenderedWorkspace, RenderError> {
        let defaults = VariableDefaults {
            region: &self.settings.default_region,
            kubeconfig_path: &self.settings.kubeconfig_path,
        };
        let resolved = variables::resolve(kind, request_id, name, config, team_id, &defaults)?;

        let dir = self.layout.workspace_dir(request_id);
        std::fs::create_dir_all(&dir).map_err(|source| RenderError::Write {
            path: dir.clone(),
            source,
        })?;

        let module_source = self.settings.modules_root.join(module_name(kind));

        write_file(&dir.join(PROVIDER_FILE), &provider_file(kind))?;
        write_file(
            &dir.join(MAIN_FILE),
            &main_file(kind, request_id, &module_source, &resolved),
        )?;
        write_file(&dir.join(VARIABLES_FILE), &variables_file(&resolved))?;

        tracing::debug!(
            request_id = request_id,
            resource_type = %kind,
            dir = %dir.display(),
            "Rendered workspace"
        );

        Ok(RenderedWorkspace {
            dir,
            summary: resolved.summary,
        })
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), RenderError> {
    std::fs::write(path, contents).map_err(|source| RenderError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn provider_file(kind: ResourceType) -> String {
    match provider(kind) {
        Provider::Aws => r#"terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

provider "aws" {
  region = var.aws_region

  default_tags {
    tags = {
      ManagedBy = "infrautomater"
      RequestId = tostring(var.request_id)
      TeamId    = tostring(var.team_id)
    }
  }
}
"#
        .to_string(),
        Provider::Kubernetes => r#"terraform {
  required_providers {
    kubernetes = {
      source  = "hashicorp/kubernetes"
      version = "~> 2.23"
    }
  }
}

provider "kubernetes" {
  config_path = var.kubeconfig_path
}
"#
        .to_string(),
    }
}

fn main_file(
    kind: ResourceType,
    request_id: i64,
    module_source: &Path,
    resolved: &ResolvedVariables,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Generated by infrautomater for request {}. Changes are overwritten on retry.\n",
        request_id
    );

    for (key, value) in &resolved.values {
        let _ = writeln!(out, "variable \"{}\" {{", key);
        let _ = writeln!(out, "  type = {}", value.type_name());
        if SENSITIVE_VARIABLES.contains(key) {
            let _ = writeln!(out, "  sensitive = true");
        }
        let _ = writeln!(out, "}}\n");
    }

    let _ = writeln!(out, "module \"resource\" {{");
    let _ = writeln!(
        out,
        "  source = {}\n",
        quote(&module_source.display().to_string())
    );
    for (key, _) in &resolved.values {
        let _ = writeln!(out, "  {} = var.{}", key, key);
    }
    let _ = writeln!(out, "}}");

    for (output, sensitive) in outputs(kind) {
        let _ = writeln!(out, "\noutput \"{}\" {{", output);
        let _ = writeln!(out, "  value = module.resource.{}", output);
        if *sensitive {
            let _ = writeln!(out, "  sensitive = true");
        }
        let _ = writeln!(out, "}}");
    }

    out
}

fn variables_file(resolved: &ResolvedVariables) -> String {
    resolved
        .values
        .iter()
        .map(|(key, value)| format!("{} = {}\n", key, value.render()))
        .collect()
}
