//! Test entity
//!
//! A [`Test`] owns its identity, configuration and the status state machine.
//! Completion (`success`/`failure`) may be signalled from any thread; the
//! state mutex is the single guard that makes each terminal transition an
//! atomic check-and-set.

mod assert;
mod context;
pub mod trace;

pub use context::TestContext;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::models::{LogLevel, LogMessage, TestSnapshot, TestStatus};
use crate::registry::{FnBody, TestBody};
use crate::utils::Stopwatch;

/// Timeout applied when a descriptor does not configure one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of breadcrumbs kept for cross-thread diagnostics
const TRAIL_CAPACITY: usize = 32;

/// Failure type recorded when a body returns an error or panics
pub const UNHANDLED_EXCEPTION: &str = "UnhandledException";

/// Failure type recorded by the timeout watchdog
pub const TIMEOUT: &str = "Timeout";

/// Errors surfaced to test bodies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    #[error("Test {0} was cancelled")]
    Cancelled(String),
}

/// Callback installed when a test is started; receives every transition the
/// test drives itself (running and terminal).
pub type UpdateHook = Arc<dyn Fn(&Test, &Transition) + Send + Sync>;

/// A status change together with the snapshot taken while it was applied
#[derive(Clone, Debug)]
pub struct Transition {
    pub from: TestStatus,
    pub snapshot: TestSnapshot,
}

/// Payload used to unwind a body after a failure raised on its own thread
pub(crate) struct FailureUnwind;

/// Source location recorded by a context call
#[derive(Clone, Debug)]
pub(crate) struct Breadcrumb {
    location: &'static Location<'static>,
    label: Option<String>,
}

impl fmt::Display for Breadcrumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at {}:{}:{}",
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;
        if let Some(label) = &self.label {
            write!(f, " ({label})")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct TestState {
    status: TestStatus,
    stopwatch: Option<Stopwatch>,
    completion_time: Option<Duration>,
    failure_type: Option<String>,
    failure_message: Option<String>,
    failure_stacktrace: Vec<String>,
    body_thread: Option<ThreadId>,
}

impl TestState {
    fn stop_clock(&mut self) {
        if self.completion_time.is_none() {
            self.completion_time = self.stopwatch.as_mut().map(Stopwatch::stop);
        }
    }
}

/// One runnable unit
pub struct Test {
    namespace: String,
    id: String,
    full_id: String,
    description: Option<String>,
    dependencies: Vec<String>,
    timeout: Duration,
    is_async: bool,
    body: Arc<dyn TestBody>,
    state: Mutex<TestState>,
    changed: Condvar,
    log: Mutex<Vec<LogMessage>>,
    trail: Mutex<VecDeque<Breadcrumb>>,
    cancelled: AtomicBool,
    on_update: OnceLock<UpdateHook>,
}

impl Test {
    /// Start describing a test with the given body
    pub fn builder(
        namespace: impl Into<String>,
        id: impl Into<String>,
        body: impl TestBody,
    ) -> TestBuilder {
        TestBuilder::new(namespace, id, Arc::new(body))
    }

    /// Start describing a test whose body is a closure
    pub fn from_fn<F>(namespace: impl Into<String>, id: impl Into<String>, body: F) -> TestBuilder
    where
        F: Fn(&TestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::builder(namespace, id, FnBody::new(body))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `namespace.id`, the unique key of the test inside a suite
    pub fn full_id(&self) -> &str {
        &self.full_id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn status(&self) -> TestStatus {
        self.state.lock().status
    }

    /// `None` until the first terminal transition of a started test
    pub fn completion_time(&self) -> Option<Duration> {
        self.state.lock().completion_time
    }

    pub fn failure_type(&self) -> Option<String> {
        self.state.lock().failure_type.clone()
    }

    pub fn failure_message(&self) -> Option<String> {
        self.state.lock().failure_message.clone()
    }

    pub fn failure_stacktrace(&self) -> Vec<String> {
        self.state.lock().failure_stacktrace.clone()
    }

    /// Set on every terminal transition; bodies poll it to leave early.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> TestSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &TestState) -> TestSnapshot {
        TestSnapshot {
            namespace: self.namespace.clone(),
            id: self.id.clone(),
            full_id: self.full_id.clone(),
            description: self.description.clone(),
            dependencies: self.dependencies.clone(),
            timeout: self.timeout,
            is_async: self.is_async,
            status: state.status,
            completion_time: state.completion_time,
            failure_type: state.failure_type.clone(),
            failure_message: state.failure_message.clone(),
            failure_stacktrace: state.failure_stacktrace.clone(),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into());
    }

    fn log(&self, level: LogLevel, message: String) {
        debug!(test = %self.full_id, level = %level, "{}", message);
        self.log.lock().push(LogMessage::new(level, message));
    }

    /// The most recent `max_entries` log messages, oldest first.
    pub fn log_tail(&self, max_entries: usize) -> Vec<LogMessage> {
        let log = self.log.lock();
        let start = log.len().saturating_sub(max_entries);
        log[start..].to_vec()
    }

    /// Complete a running test successfully.
    ///
    /// Only effective while the test is `Running`; any later call is a no-op.
    pub fn success(&self) {
        let transition = {
            let mut state = self.state.lock();
            if state.status != TestStatus::Running {
                return;
            }
            state.stop_clock();
            state.status = TestStatus::FinishedSuccessfully;
            Transition {
                from: TestStatus::Running,
                snapshot: self.snapshot_locked(&state),
            }
        };
        self.publish(transition);
    }

    /// Fail the test with a failure type and message.
    ///
    /// The first failure wins; a test that already finished keeps its result.
    /// Called on the thread executing the body, this unwinds the rest of the
    /// body. From any other thread it records the failure and returns.
    ///
    /// A test that was never admitted is left untouched.
    pub fn failure(&self, kind: impl Into<String>, message: impl Into<String>) {
        let (body_thread, status) = {
            let state = self.state.lock();
            (state.body_thread, state.status)
        };
        if status.is_pending() {
            return;
        }
        let on_body_thread = body_thread == Some(thread::current().id());

        if !status.is_terminal() {
            let stacktrace = match body_thread {
                Some(_) if !on_body_thread => self.trail_frames(),
                _ => self.body.filter_trace(trace::filter_frames(trace::capture())),
            };
            self.finish_with_error(Some(kind.into()), message.into(), stacktrace);
        }

        if on_body_thread {
            std::panic::resume_unwind(Box::new(FailureUnwind));
        }
    }

    /// Record an error outcome without unwinding. Returns `false` when the
    /// test was not running.
    pub(crate) fn finish_with_error(
        &self,
        kind: Option<String>,
        message: String,
        stacktrace: Vec<String>,
    ) -> bool {
        let transition = {
            let mut state = self.state.lock();
            if state.status != TestStatus::Running {
                return false;
            }
            let from = state.status;
            state.stop_clock();
            state.failure_type = kind.filter(|k| !k.trim().is_empty());
            state.failure_message = Some(message);
            state.failure_stacktrace = stacktrace;
            state.status = TestStatus::FinishedError;
            Transition {
                from,
                snapshot: self.snapshot_locked(&state),
            }
        };
        self.publish(transition);
        true
    }

    fn publish(&self, transition: Transition) {
        if transition.snapshot.status.is_terminal() {
            self.cancelled.store(true, Ordering::Release);
            self.changed.notify_all();
        }
        if let Some(hook) = self.on_update.get() {
            hook(self, &transition);
        }
    }

    /// Admit a pending test: `Idle | WaitingForDependencies -> Running`.
    /// Returns `None` if another pass already admitted or finished it.
    pub(crate) fn admit(&self) -> Option<Transition> {
        let mut state = self.state.lock();
        if !state.status.is_pending() {
            return None;
        }
        let from = state.status;
        state.status = TestStatus::Running;
        state.stopwatch = Some(Stopwatch::start());
        Some(Transition {
            from,
            snapshot: self.snapshot_locked(&state),
        })
    }

    /// `Idle -> WaitingForDependencies`; `None` when nothing changed.
    pub(crate) fn mark_waiting(&self) -> Option<Transition> {
        let mut state = self.state.lock();
        if state.status != TestStatus::Idle {
            return None;
        }
        state.status = TestStatus::WaitingForDependencies;
        Some(Transition {
            from: TestStatus::Idle,
            snapshot: self.snapshot_locked(&state),
        })
    }

    /// Fail a test that never started. The caller publishes the transition.
    pub(crate) fn abandon(&self, kind: &str, message: String) -> Option<Transition> {
        let transition = {
            let mut state = self.state.lock();
            if !state.status.is_pending() {
                return None;
            }
            let from = state.status;
            state.failure_type = Some(kind.to_string());
            state.failure_message = Some(message);
            state.status = TestStatus::FinishedError;
            Transition {
                from,
                snapshot: self.snapshot_locked(&state),
            }
        };
        self.cancelled.store(true, Ordering::Release);
        self.changed.notify_all();
        Some(transition)
    }

    pub(crate) fn install_hook(&self, hook: UpdateHook) {
        let _ = self.on_update.set(hook);
    }

    pub(crate) fn body(&self) -> &Arc<dyn TestBody> {
        &self.body
    }

    pub(crate) fn enter_body(&self) {
        self.state.lock().body_thread = Some(thread::current().id());
    }

    pub(crate) fn exit_body(&self) {
        self.state.lock().body_thread = None;
    }

    /// Block until the test leaves `Running` or `deadline` passes. Returns
    /// `true` if the test is still running afterwards.
    pub(crate) fn wait_while_running(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.status == TestStatus::Running {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.status == TestStatus::Running
    }

    pub(crate) fn record_breadcrumb(
        &self,
        location: &'static Location<'static>,
        label: Option<String>,
    ) {
        let mut trail = self.trail.lock();
        if trail.len() == TRAIL_CAPACITY {
            trail.pop_front();
        }
        trail.push_back(Breadcrumb { location, label });
    }

    /// Breadcrumbs rendered most recent first.
    fn trail_frames(&self) -> Vec<String> {
        let frames = self
            .trail
            .lock()
            .iter()
            .rev()
            .map(ToString::to_string)
            .collect();
        self.body.filter_trace(frames)
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("full_id", &self.full_id)
            .field("status", &self.status())
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("is_async", &self.is_async)
            .finish()
    }
}

/// Builder for [`Test`]
pub struct TestBuilder {
    namespace: String,
    id: String,
    description: Option<String>,
    dependencies: Vec<String>,
    timeout: Option<Duration>,
    is_async: bool,
    body: Arc<dyn TestBody>,
}

impl TestBuilder {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>, body: Arc<dyn TestBody>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            description: None,
            dependencies: Vec::new(),
            timeout: None,
            is_async: false,
            body,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a dependency: a full test id or a namespace prefix.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !dependency.is_empty() && !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Add comma-separated dependencies, e.g. `"app.setup,app.db."`.
    pub fn depends_on_all(self, dependencies: &str) -> Self {
        dependencies
            .split(',')
            .map(str::trim)
            .fold(self, |builder, dep| builder.depends_on(dep))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the test as manually completed: returning from the body does not
    /// imply success.
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn full_id(&self) -> String {
        format!("{}.{}", self.namespace, self.id)
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn build(self) -> Test {
        self.build_with_default_timeout(DEFAULT_TIMEOUT)
    }

    pub fn build_with_default_timeout(self, default_timeout: Duration) -> Test {
        let full_id = self.full_id();
        Test {
            namespace: self.namespace,
            id: self.id,
            full_id,
            description: self.description,
            dependencies: self.dependencies,
            timeout: self.timeout.unwrap_or(default_timeout),
            is_async: self.is_async,
            body: self.body,
            state: Mutex::new(TestState {
                status: TestStatus::Idle,
                stopwatch: None,
                completion_time: None,
                failure_type: None,
                failure_message: None,
                failure_stacktrace: Vec::new(),
                body_thread: None,
            }),
            changed: Condvar::new(),
            log: Mutex::new(Vec::new()),
            trail: Mutex::new(VecDeque::with_capacity(TRAIL_CAPACITY)),
            cancelled: AtomicBool::new(false),
            on_update: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn noop(namespace: &str, id: &str) -> Test {
        Test::from_fn(namespace, id, |_| Ok(())).build()
    }

    fn counting_hook(test: &Test) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        test.install_hook(Arc::new(move |_: &Test, _: &Transition| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[test]
    fn test_builder_defaults() {
        let test = noop("app.math", "adds");
        assert_eq!(test.full_id(), "app.math.adds");
        assert_eq!(test.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(test.status(), TestStatus::Idle);
        assert_eq!(test.completion_time(), None);
        assert!(!test.is_async());
    }

    #[test]
    fn test_builder_dedupes_dependencies() {
        let test = Test::from_fn("ns", "t", |_| Ok(()))
            .depends_on_all("a.x, b., a.x,,")
            .depends_on("b.")
            .build();
        assert_eq!(test.dependencies(), ["a.x".to_string(), "b.".to_string()]);
    }

    #[test]
    fn test_success_only_from_running() {
        let test = noop("ns", "t");
        test.success();
        assert_eq!(test.status(), TestStatus::Idle);

        test.admit().unwrap();
        test.success();
        assert_eq!(test.status(), TestStatus::FinishedSuccessfully);
        assert!(test.completion_time().is_some());
        assert!(test.is_cancelled());
    }

    #[test]
    fn test_terminal_calls_are_idempotent() {
        let test = noop("ns", "t");
        let count = counting_hook(&test);
        test.admit().unwrap();

        test.failure("Custom", "first");
        let elapsed = test.completion_time();
        test.failure("Custom", "second");
        test.success();

        assert_eq!(test.status(), TestStatus::FinishedError);
        assert_eq!(test.failure_message().as_deref(), Some("first"));
        assert_eq!(test.failure_type().as_deref(), Some("Custom"));
        assert_eq!(test.completion_time(), elapsed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_success_is_a_sink() {
        let test = noop("ns", "t");
        test.admit().unwrap();
        test.success();
        test.failure("Late", "too late");
        assert_eq!(test.status(), TestStatus::FinishedSuccessfully);
        assert_eq!(test.failure_message(), None);
    }

    #[test]
    fn test_failure_before_admission_is_ignored() {
        let test = noop("ns", "t");
        let count = counting_hook(&test);
        test.failure("Manual", "not started yet");
        assert_eq!(test.status(), TestStatus::Idle);

        test.mark_waiting().unwrap();
        test.failure("Manual", "still waiting");
        assert!(!test.finish_with_error(None, "still waiting".into(), Vec::new()));
        assert_eq!(test.status(), TestStatus::WaitingForDependencies);
        assert_eq!(test.failure_message(), None);
        assert!(!test.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_admit_happens_once() {
        let test = noop("ns", "t");
        assert!(test.mark_waiting().is_some());
        assert!(test.mark_waiting().is_none());
        assert_eq!(test.admit().unwrap().from, TestStatus::WaitingForDependencies);
        assert!(test.admit().is_none());
        assert!(test.mark_waiting().is_none());
        assert_eq!(test.status(), TestStatus::Running);
    }

    #[test]
    fn test_concurrent_completion_has_one_winner() {
        let test = Arc::new(noop("ns", "race"));
        let count = counting_hook(&test);
        test.admit().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let test = test.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        test.success();
                    } else {
                        test.failure("Race", format!("loser {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(test.status().is_terminal());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_log_tail_is_most_recent_last() {
        let test = noop("ns", "t");
        test.debug("one");
        test.info("two");
        test.warn("three");

        let tail = test.log_tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0], LogMessage::new(LogLevel::Info, "two"));
        assert_eq!(tail[1], LogMessage::new(LogLevel::Warn, "three"));
        assert_eq!(test.log_tail(10).len(), 3);
        assert!(test.log_tail(0).is_empty());
    }

    #[test]
    fn test_abandon_pending_test() {
        let test = noop("ns", "t");
        let transition = test.abandon("DependencyFailed", "dep failed".into()).unwrap();
        assert_eq!(transition.from, TestStatus::Idle);
        assert_eq!(test.status(), TestStatus::FinishedError);
        assert_eq!(test.completion_time(), None);
        assert!(test.abandon("DependencyFailed", "again".into()).is_none());
    }

    #[test]
    fn test_cross_thread_failure_uses_breadcrumbs() {
        let test = Arc::new(noop("ns", "t"));
        test.admit().unwrap();
        test.enter_body();
        test.record_breadcrumb(Location::caller(), Some("step one".to_string()));
        test.record_breadcrumb(Location::caller(), Some("step two".to_string()));

        let remote = test.clone();
        thread::spawn(move || remote.failure(TIMEOUT, "took too long"))
            .join()
            .unwrap();

        let trace = test.failure_stacktrace();
        assert_eq!(trace.len(), 2);
        assert!(trace[0].ends_with("(step two)"));
        assert!(trace[1].ends_with("(step one)"));
    }

    #[test]
    fn test_wait_while_running_returns_on_completion() {
        let test = Arc::new(noop("ns", "t"));
        test.admit().unwrap();

        let finisher = test.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            finisher.success();
        });

        let still_running = test.wait_while_running(Instant::now() + Duration::from_secs(5));
        handle.join().unwrap();
        assert!(!still_running);
    }
}
