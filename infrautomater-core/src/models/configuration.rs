//! Worker configuration data structures

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Logging level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Whether the pipeline applies changes or only plans them
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Plan only; apply is never invoked
    #[default]
    DryRun,
    /// Plan and apply
    Live,
}

impl ExecutionMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, ExecutionMode::DryRun)
    }
}

/// Retry settings for provisioning and destruction tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 60,
        }
    }
}

/// Deployment-wide worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfiguration {
    /// Dry-run or live execution
    pub mode: ExecutionMode,
    /// Provisioning binary, looked up on PATH when not absolute
    pub terraform_binary: String,
    /// Wall-clock limit per tool invocation
    pub command_timeout_seconds: u64,
    /// Parent directory of every `request-<id>` workspace
    pub workspaces_root: PathBuf,
    /// Directory holding the per-resource-type terraform modules
    pub modules_root: PathBuf,
    /// JSON request store
    pub store_path: PathBuf,
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Maximum characters of plan output kept in a dry-run note
    pub plan_summary_limit: usize,
    /// Region used when a request does not name one
    pub default_region: String,
    /// Kubeconfig used for namespace requests without an override
    pub kubeconfig_path: PathBuf,
    /// Tasks executed concurrently by one worker process
    pub worker_concurrency: usize,
    /// Age after which a `provisioning` request is considered stuck
    pub stale_after_minutes: i64,
    /// How often `run` polls the store for approved requests
    pub poll_interval_seconds: u64,
    pub retry: RetrySettings,
}

impl Default for WorkerConfiguration {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("infrautomater");
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            mode: ExecutionMode::DryRun,
            terraform_binary: "terraform".to_string(),
            command_timeout_seconds: 600, // 10 minutes
            workspaces_root: data_dir.join("workspaces"),
            modules_root: data_dir.join("modules"),
            store_path: data_dir.join("requests.json"),
            log_level: LogLevel::Info,
            plan_summary_limit: 2000,
            default_region: "us-east-1".to_string(),
            kubeconfig_path: home.join(".kube").join("config"),
            worker_concurrency: 4,
            stale_after_minutes: 30,
            poll_interval_seconds: 10,
            retry: RetrySettings::default(),
        }
    }
}

impl WorkerConfiguration {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: WorkerConfiguration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(WorkerConfiguration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("infrautomater").join("worker.toml"))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.command_timeout_seconds == 0 || self.command_timeout_seconds > 3600 {
            errors.push("command_timeout_seconds must be between 1 and 3600".to_string());
        }

        if self.terraform_binary.trim().is_empty() {
            errors.push("terraform_binary cannot be empty".to_string());
        }

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }

        if self.worker_concurrency == 0 || self.worker_concurrency > 64 {
            errors.push("worker_concurrency must be between 1 and 64".to_string());
        }

        if self.plan_summary_limit == 0 {
            errors.push("plan_summary_limit must be greater than 0".to_string());
        }

        if self.stale_after_minutes <= 0 {
            errors.push("stale_after_minutes must be positive".to_string());
        }

        if self.default_region.trim().is_empty() {
            errors.push("default_region cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_configuration() {
        let config = WorkerConfiguration::default();
        assert_eq!(config.mode, ExecutionMode::DryRun);
        assert_eq!(config.command_timeout_seconds, 600);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_seconds, 60);
        assert_eq!(config.plan_summary_limit, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configuration_validation() {
        let config = WorkerConfiguration {
            command_timeout_seconds: 0,
            terraform_binary: " ".to_string(),
            worker_concurrency: 500,
            retry: RetrySettings {
                max_attempts: 0,
                backoff_seconds: 60,
            },
            ..WorkerConfiguration::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("command_timeout_seconds")));
        assert!(errors.iter().any(|e| e.contains("terraform_binary")));
        assert!(errors.iter().any(|e| e.contains("worker_concurrency")));
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: WorkerConfiguration = toml::from_str("mode = \"live\"\n").unwrap();
        assert_eq!(config.mode, ExecutionMode::Live);
        assert_eq!(config.terraform_binary, "terraform");
        assert_eq!(config.retry, RetrySettings::default());
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("worker.toml");

        let config = WorkerConfiguration {
            mode: ExecutionMode::Live,
            default_region: "eu-west-1".to_string(),
            ..WorkerConfiguration::default()
        };

        config.save_to_file(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = WorkerConfiguration::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.mode, ExecutionMode::Live);
        assert_eq!(loaded.default_region, "eu-west-1");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempdir().unwrap();
        let loaded =
            WorkerConfiguration::load_from_file(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, WorkerConfiguration::default());
    }
}
