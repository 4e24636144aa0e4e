//! Suite scheduler
//!
//! Holds the registered tests keyed by full id and runs admission passes.
//! Every terminal transition triggers another pass (cascade), so dependents
//! start as soon as their dependencies succeed without any polling.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::notifier::{Notifier, SubscriptionId, TestUpdate};
use super::supervisor;
use crate::models::{RunSummary, TestStatus};
use crate::test_case::{Test, Transition, UpdateHook};

/// Failure type of tests abandoned under [`DependencyPolicy::Fail`]
pub const DEPENDENCY_FAILED: &str = "DependencyFailed";

/// Suite errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuiteError {
    #[error("Test {0} is already registered")]
    DuplicateTest(String),

    #[error("Cannot register {0} after the run has started")]
    RunInProgress(String),

    #[error("Invalid test identity '{0}': namespace and id must be non-empty and the id must not contain '.'")]
    InvalidId(String),

    #[error("The suite has already been started")]
    AlreadyStarted,
}

/// What happens to tests whose dependencies finished with an error
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyPolicy {
    /// Leave them waiting for dependencies forever
    #[default]
    Wait,
    /// Fail them with `DependencyFailed`, transitively
    Fail,
}

impl FromStr for DependencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wait" => Ok(DependencyPolicy::Wait),
            "fail" => Ok(DependencyPolicy::Fail),
            other => Err(format!("Unknown dependency policy: {other}")),
        }
    }
}

impl fmt::Display for DependencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyPolicy::Wait => write!(f, "wait"),
            DependencyPolicy::Fail => write!(f, "fail"),
        }
    }
}

/// Outcome of evaluating one pending test
enum Admission {
    Ready,
    Blocked { failed: Option<String> },
}

/// Handle to a collection of tests run together. Cloning is cheap.
#[derive(Clone)]
pub struct Suite {
    shared: Arc<SuiteShared>,
}

struct SuiteShared {
    tests: RwLock<BTreeMap<String, Arc<Test>>>,
    notifier: Notifier,
    policy: DependencyPolicy,
    started: AtomicBool,
    started_at: OnceLock<DateTime<Utc>>,
    pass_lock: ReentrantMutex<()>,
    in_flight: Mutex<usize>,
    idle: Condvar,
    idle_tx: watch::Sender<usize>,
}

impl Suite {
    pub fn new() -> Self {
        Self::with_policy(DependencyPolicy::default())
    }

    pub fn with_policy(policy: DependencyPolicy) -> Self {
        let (idle_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(SuiteShared {
                tests: RwLock::new(BTreeMap::new()),
                notifier: Notifier::new(),
                policy,
                started: AtomicBool::new(false),
                started_at: OnceLock::new(),
                pass_lock: ReentrantMutex::new(()),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
                idle_tx,
            }),
        }
    }

    pub fn policy(&self) -> DependencyPolicy {
        self.shared.policy
    }

    /// Add a test. Duplicate ids are rejected, as is registration once the
    /// run has started.
    pub fn register(&self, test: Test) -> Result<&Self, SuiteError> {
        if test.namespace().is_empty() || test.id().is_empty() || test.id().contains('.') {
            return Err(SuiteError::InvalidId(test.full_id().to_string()));
        }

        let mut tests = self.shared.tests.write();
        if self.shared.started.load(Ordering::Acquire) {
            return Err(SuiteError::RunInProgress(test.full_id().to_string()));
        }
        if tests.contains_key(test.full_id()) {
            return Err(SuiteError::DuplicateTest(test.full_id().to_string()));
        }
        debug!(test = %test.full_id(), "Registered");
        tests.insert(test.full_id().to_string(), Arc::new(test));
        Ok(self)
    }

    /// Register every test produced by a discovery source.
    pub fn register_all<I>(&self, source: I) -> Result<&Self, SuiteError>
    where
        I: IntoIterator<Item = Test>,
    {
        for test in source {
            self.register(test)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.shared.tests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.tests.read().is_empty()
    }

    pub fn get(&self, full_id: &str) -> Option<Arc<Test>> {
        self.shared.tests.read().get(full_id).cloned()
    }

    /// All tests ordered by full id
    pub fn tests(&self) -> Vec<Arc<Test>> {
        self.shared.tests_ordered()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TestUpdate<'_>) + Send + Sync + 'static,
    {
        self.shared.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.notifier.unsubscribe(id)
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    /// Start the run with an initial admission pass. Returns once that pass
    /// has handed every eligible test to the supervisor; completion is
    /// event-driven from there on.
    pub fn run(&self) -> Result<(), SuiteError> {
        {
            let _tests = self.shared.tests.write();
            if self.shared.started.swap(true, Ordering::AcqRel) {
                return Err(SuiteError::AlreadyStarted);
            }
        }
        let _ = self.shared.started_at.set(Utc::now());
        info!(
            tests = self.len(),
            policy = %self.shared.policy,
            "Starting run"
        );

        self.shared.begin_work();
        self.shared.admission_pass();
        self.shared.end_work();
        Ok(())
    }

    /// Block until no test is running and no pass is pending. Tests starved
    /// by failed dependencies do not keep this waiting.
    pub fn wait(&self) {
        let mut in_flight = self.shared.in_flight.lock();
        while *in_flight > 0 {
            self.shared.idle.wait(&mut in_flight);
        }
    }

    /// Like [`Suite::wait`] with an upper bound. Returns `true` if settled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.shared.in_flight.lock();
        while *in_flight > 0 {
            if self
                .shared
                .idle
                .wait_until(&mut in_flight, deadline)
                .timed_out()
            {
                break;
            }
        }
        *in_flight == 0
    }

    /// Resolves once the suite has settled.
    pub async fn settled(&self) {
        let mut rx = self.shared.idle_tx.subscribe();
        let _ = rx.wait_for(|in_flight| *in_flight == 0).await;
    }

    /// Aggregate status of every test whose full id starts with `prefix`:
    /// `FinishedError` if any errored, else `WaitingForDependencies` if any
    /// has not succeeded yet, else `FinishedSuccessfully` (also when nothing
    /// matches).
    pub fn get_dependency_status(&self, prefix: &str) -> TestStatus {
        aggregate_status(&self.tests(), prefix)
    }

    /// Status of a single dependency string: the named test when it is a
    /// registered full id, otherwise the prefix aggregate.
    pub fn dependency_status(&self, dependency: &str) -> TestStatus {
        dependency_status(&self.tests(), dependency)
    }

    /// Scan every test into a summary. Meaningful once the suite settled.
    pub fn summary(&self) -> RunSummary {
        let started_at = self.shared.started_at.get().copied().unwrap_or_else(Utc::now);
        RunSummary::new(
            started_at,
            self.tests().iter().map(|test| test.snapshot()).collect(),
        )
    }
}

impl Default for Suite {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("tests", &self.len())
            .field("policy", &self.shared.policy)
            .field("started", &self.is_started())
            .finish()
    }
}

impl SuiteShared {
    fn tests_ordered(&self) -> Vec<Arc<Test>> {
        self.tests.read().values().cloned().collect()
    }

    fn begin_work(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight += 1;
        self.idle_tx.send_replace(*in_flight);
    }

    fn end_work(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        self.idle_tx.send_replace(*in_flight);
        if *in_flight == 0 {
            debug!("Suite settled");
            self.idle.notify_all();
        }
    }

    /// Evaluate every pending test once, admitting the eligible ones.
    ///
    /// Passes are serialized; the lock is re-entrant because a transition
    /// published on the pass thread itself may cascade into a nested pass.
    fn admission_pass(self: &Arc<Self>) {
        let _pass = self.pass_lock.lock();
        let tests = self.tests_ordered();

        loop {
            let mut abandoned = false;

            for test in &tests {
                if !test.status().is_pending() {
                    continue;
                }
                match evaluate(test, &tests) {
                    Admission::Ready => self.start(test),
                    Admission::Blocked {
                        failed: Some(dependency),
                    } if self.policy == DependencyPolicy::Fail => {
                        let message = format!("Dependency {dependency} finished with an error");
                        if let Some(transition) = test.abandon(DEPENDENCY_FAILED, message) {
                            warn!(test = %test.full_id(), dependency = %dependency, "Dependency failed");
                            self.notifier.emit(test, &transition);
                            abandoned = true;
                        }
                    }
                    Admission::Blocked { .. } => {
                        if let Some(transition) = test.mark_waiting() {
                            debug!(test = %test.full_id(), "Waiting for dependencies");
                            self.notifier.emit(test, &transition);
                        }
                    }
                }
            }

            // Abandoned tests may be dependencies of tests evaluated earlier.
            if !abandoned {
                break;
            }
        }
    }

    fn start(self: &Arc<Self>, test: &Arc<Test>) {
        let Some(running) = test.admit() else {
            return;
        };
        debug!(test = %test.full_id(), "Admitted");
        self.begin_work();

        let suite = Arc::downgrade(self);
        let hook: UpdateHook = Arc::new(move |test: &Test, transition: &Transition| {
            if let Some(suite) = suite.upgrade() {
                suite.on_update(test, transition);
            }
        });
        supervisor::launch(Arc::clone(test), hook, running);
    }

    fn on_update(self: &Arc<Self>, test: &Test, transition: &Transition) {
        self.notifier.emit(test, transition);

        if transition.snapshot.status.is_terminal() {
            debug!(test = %test.full_id(), status = %transition.snapshot.status, "Finished");
            self.admission_pass();
            if transition.from == TestStatus::Running {
                self.end_work();
            }
        }
    }
}

/// Check every dependency of `test` against the current statuses.
fn evaluate(test: &Test, tests: &[Arc<Test>]) -> Admission {
    let mut blocked = false;
    for dependency in test.dependencies() {
        match dependency_status(tests, dependency) {
            TestStatus::FinishedSuccessfully => {}
            TestStatus::FinishedError => {
                return Admission::Blocked {
                    failed: Some(dependency.clone()),
                }
            }
            _ => blocked = true,
        }
    }
    if blocked {
        Admission::Blocked { failed: None }
    } else {
        Admission::Ready
    }
}

/// A dependency naming a registered full id refers to that test alone;
/// anything else is a prefix over all tests.
fn dependency_status(tests: &[Arc<Test>], dependency: &str) -> TestStatus {
    match tests.iter().find(|test| test.full_id() == dependency) {
        Some(exact) => match exact.status() {
            TestStatus::FinishedSuccessfully => TestStatus::FinishedSuccessfully,
            TestStatus::FinishedError => TestStatus::FinishedError,
            _ => TestStatus::WaitingForDependencies,
        },
        None => aggregate_status(tests, dependency),
    }
}

fn aggregate_status(tests: &[Arc<Test>], prefix: &str) -> TestStatus {
    let mut status = TestStatus::FinishedSuccessfully;
    for test in tests.iter().filter(|test| test.full_id().starts_with(prefix)) {
        match test.status() {
            TestStatus::FinishedSuccessfully => {}
            TestStatus::FinishedError => return TestStatus::FinishedError,
            _ => status = TestStatus::WaitingForDependencies,
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(namespace: &str, id: &str) -> Test {
        Test::from_fn(namespace, id, |_| Ok(())).build()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let suite = Suite::new();
        suite.register(noop("ns", "a")).unwrap();
        assert_eq!(
            suite.register(noop("ns", "a")).unwrap_err(),
            SuiteError::DuplicateTest("ns.a".to_string())
        );
        assert_eq!(suite.len(), 1);
    }

    #[test]
    fn test_register_validates_identity() {
        let suite = Suite::new();
        assert!(matches!(
            suite.register(noop("", "a")),
            Err(SuiteError::InvalidId(_))
        ));
        assert!(matches!(
            suite.register(noop("ns", "a.b")),
            Err(SuiteError::InvalidId(_))
        ));
        assert!(suite.register(noop("deep.ns", "a")).is_ok());
    }

    #[test]
    fn test_register_after_run_is_rejected() {
        let suite = Suite::new();
        suite.run().unwrap();
        assert_eq!(
            suite.register(noop("ns", "late")).unwrap_err(),
            SuiteError::RunInProgress("ns.late".to_string())
        );
        assert_eq!(suite.run().unwrap_err(), SuiteError::AlreadyStarted);
    }

    #[test]
    fn test_tests_are_ordered_by_full_id() {
        let suite = Suite::new();
        suite
            .register_all(vec![noop("b", "x"), noop("a", "z"), noop("a", "y")])
            .unwrap();
        let ids: Vec<String> = suite
            .tests()
            .iter()
            .map(|t| t.full_id().to_string())
            .collect();
        assert_eq!(ids, vec!["a.y", "a.z", "b.x"]);
    }

    #[test]
    fn test_dependency_status_vacuous_truth() {
        let suite = Suite::new();
        suite.register(noop("ns", "a")).unwrap();
        assert_eq!(
            suite.get_dependency_status("missing."),
            TestStatus::FinishedSuccessfully
        );
        assert_eq!(
            suite.get_dependency_status("ns."),
            TestStatus::WaitingForDependencies
        );
    }

    #[test]
    fn test_aggregate_prefers_error() {
        let tests: Vec<Arc<Test>> = vec![
            Arc::new(noop("ns", "a")),
            Arc::new(noop("ns", "b")),
            Arc::new(noop("ns", "c")),
        ];
        tests[0].admit().unwrap();
        tests[0].success();
        tests[1].admit().unwrap();
        tests[1].failure("X", "failed");

        assert_eq!(aggregate_status(&tests, "ns."), TestStatus::FinishedError);
        assert_eq!(aggregate_status(&tests, "ns.a"), TestStatus::FinishedSuccessfully);
        assert_eq!(aggregate_status(&tests, "ns.c"), TestStatus::WaitingForDependencies);
    }

    #[test]
    fn test_exact_dependency_ignores_longer_ids() {
        let tests: Vec<Arc<Test>> = vec![Arc::new(noop("ns", "a")), Arc::new(noop("ns", "ab"))];
        tests[0].admit().unwrap();
        tests[0].success();

        assert_eq!(dependency_status(&tests, "ns.a"), TestStatus::FinishedSuccessfully);
        assert_eq!(aggregate_status(&tests, "ns.a"), TestStatus::WaitingForDependencies);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("wait".parse(), Ok(DependencyPolicy::Wait));
        assert_eq!("FAIL".parse(), Ok(DependencyPolicy::Fail));
        assert!("retry".parse::<DependencyPolicy>().is_err());
    }

    #[test]
    fn test_wait_returns_for_unstarted_suite() {
        let suite = Suite::new();
        assert!(suite.wait_timeout(Duration::from_millis(10)));
        tokio_test::block_on(suite.settled());
    }

    #[test]
    fn test_run_settles_after_cascade() {
        let suite = Suite::new();
        suite
            .register(noop("ns", "first"))
            .unwrap()
            .register(
                Test::from_fn("ns", "second", |_| Ok(()))
                    .depends_on("ns.first")
                    .build(),
            )
            .unwrap();

        suite.run().unwrap();
        tokio_test::block_on(suite.settled());

        let summary = suite.summary();
        assert_eq!(summary.passed, 2);
        assert!(summary.is_all_passed());
    }
    #[test]
    fn test_host_failure_of_waiting_test_is_ignored() {
        let suite = Suite::new();
        suite
            .register(
                Test::from_fn("ns", "slow", |_| Ok(()))
                    .asynchronous()
                    .build(),
            )
            .unwrap()
            .register(Test::from_fn("ns", "w", |_| Ok(())).depends_on("ns.slow").build())
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        suite.subscribe(move |update| {
            if update.test.full_id() == "ns.w" {
                sink.lock().push(update.snapshot.status);
            }
        });

        suite.run().unwrap();
        let waiting = suite.get("ns.w").unwrap();
        assert_eq!(waiting.status(), TestStatus::WaitingForDependencies);

        waiting.failure("Manual", "host gave up");
        assert_eq!(waiting.status(), TestStatus::WaitingForDependencies);
        assert_eq!(waiting.failure_type(), None);
        assert_eq!(*events.lock(), vec![TestStatus::WaitingForDependencies]);

        suite.get("ns.slow").unwrap().success();
        assert!(suite.wait_timeout(Duration::from_secs(10)));
        assert_eq!(waiting.status(), TestStatus::FinishedSuccessfully);
        assert_eq!(
            *events.lock(),
            vec![
                TestStatus::WaitingForDependencies,
                TestStatus::Running,
                TestStatus::FinishedSuccessfully,
            ]
        );
    }
}
