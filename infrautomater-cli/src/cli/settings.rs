//! Configuration loading and command-line overrides

use anyhow::{anyhow, Context, Result};
use infrautomater_core::models::{ExecutionMode, LogLevel, WorkerConfiguration};
use infrautomater_core::runner::{TerraformRunner, ToolRunner};
use infrautomater_core::store::{JsonRequestStore, RequestStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Execution mode forced from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOverride {
    DryRun,
    Live,
}

/// Effective configuration for one process
pub struct Settings {
    pub config: WorkerConfiguration,
    pub config_path: PathBuf,
}

impl Settings {
    /// Load the configuration file (defaults when it does not exist) and
    /// apply command-line overrides
    pub fn load(
        path: Option<&Path>,
        mode: Option<ModeOverride>,
        log_level: Option<LogLevel>,
    ) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => WorkerConfiguration::default_config_path()
                .map_err(|e| anyhow!("Failed to resolve config path: {}", e))?,
        };

        let mut config = WorkerConfiguration::load_from_file(&config_path).map_err(|e| {
            anyhow!(
                "Failed to load configuration from {}: {}",
                config_path.display(),
                e
            )
        })?;

        match mode {
            Some(ModeOverride::Live) => config.mode = ExecutionMode::Live,
            Some(ModeOverride::DryRun) => config.mode = ExecutionMode::DryRun,
            None => {}
        }
        if let Some(level) = log_level {
            config.log_level = level;
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Fail with every problem found when the configuration is unusable
    pub fn ensure_valid(&self) -> Result<()> {
        self.config
            .validate()
            .map_err(|errors| anyhow!("Invalid configuration:\n  {}", errors.join("\n  ")))
    }

    pub fn store(&self) -> Result<Arc<dyn RequestStore>> {
        let store = JsonRequestStore::new(&self.config.store_path).with_context(|| {
            format!(
                "Failed to open request store {}",
                self.config.store_path.display()
            )
        })?;
        Ok(Arc::new(store))
    }

    pub fn runner(&self) -> Arc<dyn ToolRunner> {
        Arc::new(TerraformRunner::from_config(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        std::fs::write(&path, "mode = \"live\"\nlog_level = \"warn\"\n").unwrap();

        let settings = Settings::load(Some(&path), None, None).unwrap();
        assert_eq!(settings.config.mode, ExecutionMode::Live);
        assert_eq!(settings.config.log_level, LogLevel::Warn);

        let settings =
            Settings::load(Some(&path), Some(ModeOverride::DryRun), Some(LogLevel::Debug)).unwrap();
        assert_eq!(settings.config.mode, ExecutionMode::DryRun);
        assert_eq!(settings.config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.toml")), None, None).unwrap();
        assert_eq!(settings.config.mode, ExecutionMode::DryRun);
        assert!(settings.ensure_valid().is_ok());
    }

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        std::fs::write(&path, "command_timeout_seconds = 0\nworker_concurrency = 0\n").unwrap();

        let err = Settings::load(Some(&path), None, None)
            .unwrap()
            .ensure_valid()
            .unwrap_err()
            .to_string();
        assert!(err.contains("command_timeout_seconds"));
        assert!(err.contains("worker_concurrency"));
    }
}
