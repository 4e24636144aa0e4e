//! Executable test bodies

use std::fmt;

use crate::test_case::{trace, TestContext};

/// Symbol fragment identifying frames of the closure trampoline
const TRAMPOLINE_MARKER: &str = "test_cascade::registry::";

/// Code executed for a test on its dedicated thread
pub trait TestBody: Send + Sync + 'static {
    /// Run the body. Returning `Err` fails the test as an unhandled error.
    fn execute(&self, ctx: &TestContext) -> anyhow::Result<()>;

    /// Hook for stripping invocation plumbing from a captured failure trace.
    fn filter_trace(&self, frames: Vec<String>) -> Vec<String> {
        frames
    }
}

/// Body backed by a closure
pub struct FnBody<F> {
    body: F,
}

impl<F> FnBody<F>
where
    F: Fn(&TestContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F> TestBody for FnBody<F>
where
    F: Fn(&TestContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &TestContext) -> anyhow::Result<()> {
        (self.body)(ctx)
    }

    fn filter_trace(&self, frames: Vec<String>) -> Vec<String> {
        trace::truncate_at(frames, TRAMPOLINE_MARKER)
    }
}

impl<F> fmt::Debug for FnBody<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBody")
    }
}
