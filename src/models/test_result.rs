//! Test status models
//!
//! Defines the status state machine values, log entries, point-in-time test
//! snapshots and the run summary a host builds after a suite settles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Test execution status
///
/// The declaration order is meaningful: `Idle < WaitingForDependencies <
/// Running < FinishedError < FinishedSuccessfully`. Observers aggregate a
/// namespace by taking the minimum status of its tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Idle,
    WaitingForDependencies,
    Running,
    FinishedError,
    FinishedSuccessfully,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Idle | TestStatus::WaitingForDependencies => "[ ]",
            TestStatus::Running => "[.]",
            TestStatus::FinishedError => "[!]",
            TestStatus::FinishedSuccessfully => "[X]",
        }
    }

    /// Both finished states are sinks.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::FinishedError | TestStatus::FinishedSuccessfully
        )
    }

    /// Idle and waiting tests are re-evaluated on every admission pass.
    pub fn is_pending(&self) -> bool {
        matches!(self, TestStatus::Idle | TestStatus::WaitingForDependencies)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::FinishedSuccessfully)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Idle => write!(f, "IDLE"),
            TestStatus::WaitingForDependencies => write!(f, "WAITING"),
            TestStatus::Running => write!(f, "RUNNING"),
            TestStatus::FinishedError => write!(f, "ERROR"),
            TestStatus::FinishedSuccessfully => write!(f, "PASS"),
        }
    }
}

/// Severity of a message appended to a test's log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "Debug"),
            LogLevel::Info => write!(f, "Info"),
            LogLevel::Warn => write!(f, "Warn"),
        }
    }
}

/// One entry of a test's append-only log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Consistent view of a test taken under its state lock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSnapshot {
    pub namespace: String,
    pub id: String,
    pub full_id: String,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    #[serde(with = "millis")]
    pub timeout: Duration,
    pub is_async: bool,
    pub status: TestStatus,
    #[serde(with = "millis::option")]
    pub completion_time: Option<Duration>,
    pub failure_type: Option<String>,
    pub failure_message: Option<String>,
    pub failure_stacktrace: Vec<String>,
}

impl fmt::Display for TestSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.symbol(), self.full_id)?;
        if let Some(elapsed) = self.completion_time {
            write!(f, " [{}ms]", elapsed.as_millis())?;
        }
        if let Some(msg) = &self.failure_message {
            match &self.failure_type {
                Some(kind) => write!(f, " - {kind}: {msg}")?,
                None => write!(f, " - {msg}")?,
            }
        }
        Ok(())
    }
}

/// Summary of one suite run, computed by scanning every test's final status
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub waiting: usize,
    pub unfinished: usize,
    pub total_duration_ms: u64,
    pub results: Vec<TestSnapshot>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, results: Vec<TestSnapshot>) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();

        let total = results.len();
        let passed = count(TestStatus::FinishedSuccessfully);
        let failed = count(TestStatus::FinishedError);
        let waiting = count(TestStatus::WaitingForDependencies);
        let total_duration_ms = results
            .iter()
            .filter_map(|r| r.completion_time)
            .map(|d| d.as_millis() as u64)
            .sum();

        Self {
            started_at,
            finished_at: Utc::now(),
            total,
            passed,
            failed,
            waiting,
            unfinished: total - passed - failed - waiting,
            total_duration_ms,
            results,
        }
    }

    pub fn wall_time_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Process exit code a host should report for this run.
    pub fn exit_code(&self) -> i32 {
        if self.is_all_passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run started {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Error: {} | Waiting: {} | Unfinished: {}",
            self.total, self.passed, self.failed, self.waiting, self.unfinished
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Wall time: {}ms",
            self.pass_rate(),
            self.wall_time_ms()
        )
    }
}

/// Serde helpers storing durations as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
