//! Environment variable configuration
//!
//! Provides `TEST_CASCADE_*` overrides for the file configuration.

use std::env;

use crate::executor::DependencyPolicy;
use crate::utils::LogLevel;

/// Environment variable prefix
const ENV_PREFIX: &str = "TEST_CASCADE";

/// Configuration read from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Default test timeout in seconds from TEST_CASCADE_TIMEOUT
    pub timeout: Option<u64>,
    /// Dependency policy from TEST_CASCADE_POLICY
    pub policy: Option<DependencyPolicy>,
    /// Output format from TEST_CASCADE_FORMAT
    pub format: Option<String>,
    /// Log level from TEST_CASCADE_LOG
    pub log_level: Option<LogLevel>,
    /// Config file from TEST_CASCADE_CONFIG
    pub config_file: Option<String>,
    /// Disable colors from TEST_CASCADE_NO_COLOR
    pub no_color: Option<bool>,
    /// Console refresh interval from TEST_CASCADE_REFRESH_MS
    pub refresh_ms: Option<u64>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            timeout: get_env_parse("TIMEOUT"),
            policy: get_env_parse("POLICY"),
            format: get_env("FORMAT"),
            log_level: get_env_parse("LOG"),
            config_file: get_env("CONFIG"),
            no_color: get_env_bool("NO_COLOR"),
            refresh_ms: get_env_parse("REFRESH_MS"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.timeout.is_some()
            || self.policy.is_some()
            || self.format.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
            || self.no_color.is_some()
            || self.refresh_ms.is_some()
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables in tests
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn timeout(self, timeout: u64) -> Self {
        self.set("TIMEOUT", timeout.to_string())
    }

    pub fn policy(self, policy: DependencyPolicy) -> Self {
        self.set("POLICY", policy.to_string())
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        self.set("FORMAT", format)
    }

    pub fn log_level(self, level: impl Into<String>) -> Self {
        self.set("LOG", level)
    }

    pub fn no_color(self, no_color: bool) -> Self {
        self.set("NO_COLOR", no_color.to_string())
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all TEST_CASCADE environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_TIMEOUT      Default test timeout in seconds");
    println!("  {ENV_PREFIX}_POLICY       Dependency policy (wait, fail)");
    println!("  {ENV_PREFIX}_FORMAT       Output format (table, json, json-pretty, csv, summary)");
    println!("  {ENV_PREFIX}_LOG          Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_CONFIG       Path to configuration file");
    println!("  {ENV_PREFIX}_NO_COLOR     Disable colored output (true/false)");
    println!("  {ENV_PREFIX}_REFRESH_MS   Console refresh interval in milliseconds");
    println!("  RUST_LOG                  Full tracing filter, overrides {ENV_PREFIX}_LOG");
}
