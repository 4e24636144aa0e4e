//! Test profiles
//!
//! A profile is a named selection of tests by full-id prefix, optionally
//! with its own default timeout and dependency policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::executor::DependencyPolicy;

/// Named test selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestProfile {
    /// Profile name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Full-id prefixes to include; empty selects every test
    #[serde(default)]
    pub include: Vec<String>,
    /// Default timeout per test in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Dependency policy override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<DependencyPolicy>,
}

impl TestProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            include: Vec::new(),
            timeout_secs: None,
            policy: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn include(mut self, prefix: impl Into<String>) -> Self {
        self.include.push(prefix.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Every registered test
    pub fn all() -> Self {
        Self::new("all").description("Run every registered test")
    }

    /// Fast passing checks only
    pub fn smoke() -> Self {
        Self {
            timeout_secs: Some(5),
            ..Self::new("smoke")
                .description("Quick passing samples with a short timeout")
                .include("sample.basic.asserts")
                .include("sample.basic.async_completion")
                .include("sample.fixtures.")
        }
    }

    /// Failure reporting showcase, failing dependents instead of starving them
    pub fn failures() -> Self {
        Self {
            policy: Some(DependencyPolicy::Fail),
            ..Self::new("failures")
                .description("Failing samples with dependency failures propagated")
                .include("sample.failing.")
        }
    }

    pub fn predefined() -> Vec<TestProfile> {
        vec![Self::all(), Self::smoke(), Self::failures()]
    }

    /// Find a predefined profile by name
    pub fn builtin(name: &str) -> Option<TestProfile> {
        Self::predefined().into_iter().find(|p| p.name == name)
    }
}
