//! Configuration module
//!
//! Settings are layered: built-in defaults, then the config file, then
//! `TEST_CASCADE_*` environment variables, then command-line flags.

pub mod env;
pub mod file;
pub mod profile;

pub use env::EnvConfig;
pub use file::ConfigFile;
pub use profile::TestProfile;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::executor::DependencyPolicy;
use crate::output::{ConsoleOptions, OutputFormat};
use crate::utils::LogLevel;

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Timeout for tests that do not declare one
    pub default_timeout_secs: u64,

    /// Minimum time between console repaints
    pub refresh_interval_ms: u64,

    /// Log messages shown per test in the console
    pub log_tail: usize,

    /// What happens to tests whose dependencies failed
    pub dependency_policy: DependencyPolicy,

    /// Output format for the final summary
    pub format: String,

    /// Colored output
    pub colorize: bool,

    /// Engine log level
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            refresh_interval_ms: 500,
            log_tail: 10,
            dependency_policy: DependencyPolicy::Wait,
            format: "table".to_string(),
            colorize: true,
            log_level: LogLevel::Warn,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment overrides on top of this configuration
    pub fn merge_env(mut self, env: &EnvConfig) -> Self {
        if let Some(timeout) = env.timeout {
            self.default_timeout_secs = timeout;
        }
        if let Some(policy) = env.policy {
            self.dependency_policy = policy;
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        if let Some(level) = env.log_level {
            self.log_level = level;
        }
        if let Some(refresh) = env.refresh_ms {
            self.refresh_interval_ms = refresh;
        }
        if env.no_color == Some(true) {
            self.colorize = false;
        }
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.format.parse().map_err(anyhow::Error::msg)
    }

    pub fn console_options(&self) -> ConsoleOptions {
        ConsoleOptions {
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            log_tail: self.log_tail,
            colorize: self.colorize,
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
