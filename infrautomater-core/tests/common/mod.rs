//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use infrautomater_core::models::{
    ExecutionMode, RequestStatus, ResourceRequest, WorkerConfiguration,
};
use infrautomater_core::runner::{ToolError, ToolOutput, ToolRunner};
use infrautomater_core::store::{JsonRequestStore, RequestStore};
use infrautomater_core::task::{DestructionTask, ProvisioningTask};
use infrautomater_core::worker::{Reconciler, Worker};
use infrautomater_core::workspace::WorkspaceLayout;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const PLAN_STDOUT: &str = "  # module.resource.aws_s3_bucket.this will be created\n\
                               Plan: 1 to add, 0 to change, 0 to destroy.\n";
pub const OUTPUT_JSON: &str = r#"{"id": {"sensitive": false, "type": "string", "value": "res-1"}}"#;

#[derive(Debug, Clone)]
pub enum Reply {
    Exit(i32, String, String),
    NotFound,
    Timeout,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Exit(0, stdout.to_string(), String::new())
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Reply::Exit(code, String::new(), stderr.to_string())
    }
}

/// Fake provisioning binary.
///
/// Replies are queued per subcommand; once a queue is empty the
/// subcommand succeeds with canned output. Every invocation is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(std::path::PathBuf, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn script(&self, subcommand: &str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every invocation as a space-joined argument string
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args.join(" "))
            .collect()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args[0].clone())
            .collect()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.subcommands().iter().filter(|s| *s == subcommand).count()
    }

    fn default_reply(subcommand: &str) -> Reply {
        match subcommand {
            "plan" => Reply::ok(PLAN_STDOUT),
            "apply" => Reply::ok("Apply complete! Resources: 1 added, 0 changed, 0 destroyed.\n"),
            "output" => Reply::ok(OUTPUT_JSON),
            "destroy" => Reply::ok("Destroy complete! Resources: 1 destroyed.\n"),
            other => Reply::ok(&format!("{} ok\n", other)),
        }
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, workspace_dir: &Path, args: &[&str]) -> Result<ToolOutput, ToolError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let subcommand = args[0].clone();
        self.calls
            .lock()
            .unwrap()
            .push((workspace_dir.to_path_buf(), args));

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&subcommand)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Self::default_reply(&subcommand));

        match reply {
            Reply::Exit(code, stdout, stderr) => Ok(ToolOutput {
                success: code == 0,
                stdout,
                stderr,
                exit_code: Some(code),
            }),
            Reply::NotFound => Err(ToolError::BinaryNotFound {
                binary: "terraform".to_string(),
            }),
            Reply::Timeout => Err(ToolError::Timeout {
                timeout: Duration::from_secs(600),
            }),
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<JsonRequestStore>,
    pub runner: Arc<ScriptedRunner>,
    pub config: WorkerConfiguration,
}

impl Fixture {
    pub fn new(mode: ExecutionMode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfiguration {
            mode,
            workspaces_root: dir.path().join("workspaces"),
            modules_root: dir.path().join("modules"),
            store_path: dir.path().join("requests.json"),
            ..Default::default()
        };
        let store = Arc::new(JsonRequestStore::new(&config.store_path).unwrap());

        Self {
            dir,
            store,
            runner: Arc::new(ScriptedRunner::default()),
            config,
        }
    }

    pub fn dry_run() -> Self {
        Self::new(ExecutionMode::DryRun)
    }

    pub fn live() -> Self {
        Self::new(ExecutionMode::Live)
    }

    /// Store a request with the given status and config
    pub fn insert(
        &self,
        id: i64,
        resource_type: &str,
        name: &str,
        status: RequestStatus,
        config: serde_json::Value,
    ) -> ResourceRequest {
        let mut request = ResourceRequest::new(id, 10, resource_type, name);
        request.status = status;
        if let serde_json::Value::Object(map) = config {
            request.config = map;
        }
        self.store.upsert_request(request.clone()).unwrap();
        request
    }

    pub fn request(&self, id: i64) -> ResourceRequest {
        self.store.load_request(id).unwrap().unwrap()
    }

    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.config.workspaces_root)
    }

    pub fn provisioning_task(&self) -> ProvisioningTask {
        ProvisioningTask::from_config(self.store.clone(), self.runner.clone(), &self.config)
    }

    pub fn destruction_task(&self) -> DestructionTask {
        DestructionTask::from_config(self.store.clone(), self.runner.clone(), &self.config)
    }

    pub fn worker(&self) -> Arc<Worker> {
        Arc::new(Worker::from_config(
            self.store.clone(),
            self.runner.clone(),
            &self.config,
        ))
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::from_config(self.store.clone(), &self.config)
    }
}

/// Number of timestamped blocks in an audit trail
pub fn note_blocks(notes: &str) -> Vec<&str> {
    notes
        .split("\n\n[")
        .filter(|block| !block.is_empty())
        .collect()
}
