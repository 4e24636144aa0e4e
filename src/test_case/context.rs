//! Handle passed to test bodies

use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Test, TestError};
use crate::models::TestStatus;

/// Cloneable handle to a running test.
///
/// Bodies use it to log, assert, check for cancellation and, for async
/// tests, to signal completion from any later thread.
#[derive(Clone)]
pub struct TestContext {
    test: Arc<Test>,
}

impl TestContext {
    pub(crate) fn new(test: Arc<Test>) -> Self {
        Self { test }
    }

    pub fn test(&self) -> &Test {
        &self.test
    }

    pub fn full_id(&self) -> &str {
        self.test.full_id()
    }

    pub fn status(&self) -> TestStatus {
        self.test.status()
    }

    pub fn success(&self) {
        self.test.success();
    }

    #[track_caller]
    pub fn failure(&self, kind: impl Into<String>, message: impl Into<String>) {
        self.test.record_breadcrumb(Location::caller(), None);
        self.test.failure(kind, message);
    }

    /// Fail without a failure type.
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) {
        self.test.record_breadcrumb(Location::caller(), None);
        self.test.failure("", message);
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.test.record_breadcrumb(Location::caller(), None);
        self.test.debug(message);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.test.record_breadcrumb(Location::caller(), None);
        self.test.info(message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.test.record_breadcrumb(Location::caller(), None);
        self.test.warn(message);
    }

    pub fn is_cancelled(&self) -> bool {
        self.test.is_cancelled()
    }

    /// Record where the body currently is and report cancellation.
    #[track_caller]
    pub fn checkpoint(&self, label: impl fmt::Display) -> Result<(), TestError> {
        self.test
            .record_breadcrumb(Location::caller(), Some(label.to_string()));
        self.ensure_active()
    }

    /// Sleep for `duration`, waking early when the test finishes.
    #[track_caller]
    pub fn sleep(&self, duration: Duration) -> Result<(), TestError> {
        self.test.record_breadcrumb(
            Location::caller(),
            Some(format!("sleep {}ms", duration.as_millis())),
        );
        if self.test.status() == TestStatus::Running {
            self.test.wait_while_running(Instant::now() + duration);
        }
        self.ensure_active()
    }

    fn ensure_active(&self) -> Result<(), TestError> {
        if self.is_cancelled() {
            Err(TestError::Cancelled(self.full_id().to_string()))
        } else {
            Ok(())
        }
    }

    #[track_caller]
    pub(super) fn breadcrumb(&self) {
        self.test.record_breadcrumb(Location::caller(), None);
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("test", &self.test.full_id())
            .finish()
    }
}
