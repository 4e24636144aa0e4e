//! Execution supervisor
//!
//! Every admitted test gets its own named OS thread for the body plus a
//! watchdog thread that forces a `Timeout` failure if the test is still
//! running when its timeout elapses. Timed-out bodies are never killed; they
//! see the cancellation flag and otherwise keep running detached from the
//! reported result.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::test_case::{
    trace, FailureUnwind, Test, TestContext, Transition, UpdateHook, TIMEOUT, UNHANDLED_EXCEPTION,
};

/// Failure type used when the body thread cannot be created
pub const SPAWN_FAILED: &str = "SpawnFailed";

thread_local! {
    static BODY_THREAD: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Location and stack of the last panic raised on a body thread
#[derive(Debug)]
struct PanicRecord {
    location: Option<String>,
    frames: Vec<String>,
}

/// Route panics on body threads into failure diagnostics instead of stderr.
/// Other threads keep the previously installed hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if BODY_THREAD.with(Cell::get) {
                let record = PanicRecord {
                    location: info
                        .location()
                        .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column())),
                    frames: trace::capture(),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(record));
            } else {
                previous(info);
            }
        }));
    });
}

/// Forget the panic recorded on this thread. Called once a panic has been
/// caught inside the body so a later unwind cannot report its trace.
pub(crate) fn discard_panic_record() {
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
}

/// Start an admitted test: publish `Running`, then spawn its body thread and
/// timeout watchdog. `running` is the transition returned by admission.
pub(crate) fn launch(test: Arc<Test>, on_update: UpdateHook, running: Transition) {
    install_panic_hook();
    test.install_hook(Arc::clone(&on_update));
    on_update(test.as_ref(), &running);

    let body_test = Arc::clone(&test);
    let spawned = thread::Builder::new()
        .name(format!("test:{}", test.full_id()))
        .spawn(move || run_body(body_test));

    if let Err(err) = spawned {
        error!(test = %test.full_id(), "Failed to spawn test thread: {}", err);
        test.finish_with_error(
            Some(SPAWN_FAILED.to_string()),
            format!("Could not start test thread: {err}"),
            Vec::new(),
        );
        return;
    }

    let watched = Arc::clone(&test);
    let watchdog = thread::Builder::new()
        .name(format!("watchdog:{}", test.full_id()))
        .spawn(move || watch(watched));

    if let Err(err) = watchdog {
        error!(test = %test.full_id(), "Failed to spawn timeout watchdog: {}", err);
    }
}

fn watch(test: Arc<Test>) {
    let timeout = test.timeout();
    if test.wait_while_running(Instant::now() + timeout) {
        warn!(test = %test.full_id(), "Timed out after {}ms", timeout.as_millis());
        test.failure(
            TIMEOUT,
            format!(
                "The test executed longer than its timeout of {}ms",
                timeout.as_millis()
            ),
        );
    }
}

fn run_body(test: Arc<Test>) {
    BODY_THREAD.with(|flag| flag.set(true));
    discard_panic_record();
    debug!(test = %test.full_id(), "Body started");

    test.enter_body();
    let ctx = TestContext::new(Arc::clone(&test));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| test.body().execute(&ctx)));
    test.exit_body();

    match outcome {
        Ok(Ok(())) => {
            if !test.is_async() {
                test.success();
            }
        }
        Ok(Err(err)) => {
            let frames = trace::parse_backtrace(&err.backtrace().to_string());
            let frames = test.body().filter_trace(trace::filter_frames(frames));
            test.finish_with_error(
                Some(UNHANDLED_EXCEPTION.to_string()),
                format!("{err:#}"),
                frames,
            );
        }
        Err(payload) if payload.is::<FailureUnwind>() => {}
        Err(payload) => {
            let message = trace::panic_message(payload.as_ref());
            let frames = match LAST_PANIC.with(|slot| slot.borrow_mut().take()) {
                Some(record) => {
                    let mut frames = test.body().filter_trace(trace::filter_frames(record.frames));
                    if frames.is_empty() {
                        frames.extend(record.location);
                    }
                    frames
                }
                None => Vec::new(),
            };
            test.finish_with_error(Some(UNHANDLED_EXCEPTION.to_string()), message, frames);
        }
    }

    debug!(test = %test.full_id(), "Body returned");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestStatus;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Launch a test outside a suite and collect the statuses it publishes.
    fn launch_collecting(test: Test) -> (Arc<Test>, Arc<Mutex<Vec<TestStatus>>>) {
        let test = Arc::new(test);
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();
        let hook: UpdateHook = Arc::new(move |_: &Test, transition: &Transition| {
            seen.lock().push(transition.snapshot.status);
        });
        let running = test.admit().unwrap();
        launch(Arc::clone(&test), hook, running);
        (test, statuses)
    }

    fn wait_terminal(test: &Test) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !test.status().is_terminal() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_returning_body_succeeds() {
        let (test, statuses) = launch_collecting(Test::from_fn("ns", "ok", |_| Ok(())).build());
        wait_terminal(&test);
        assert_eq!(test.status(), TestStatus::FinishedSuccessfully);
        assert_eq!(
            *statuses.lock(),
            vec![TestStatus::Running, TestStatus::FinishedSuccessfully]
        );
    }

    #[test]
    fn test_failed_assertion_stops_body() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "assert", move |ctx| {
                ctx.is_true(false);
                *flag.lock() = true;
                Ok(())
            })
            .build(),
        );
        wait_terminal(&test);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(test.status(), TestStatus::FinishedError);
        assert_eq!(test.failure_type().as_deref(), Some("True"));
        assert!(!*reached.lock());
    }

    #[test]
    fn test_error_return_is_unhandled_exception() {
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "err", |_| Err(anyhow::anyhow!("boom"))).build(),
        );
        wait_terminal(&test);
        assert_eq!(test.failure_type().as_deref(), Some(UNHANDLED_EXCEPTION));
        assert_eq!(test.failure_message().as_deref(), Some("boom"));
    }

    #[test]
    fn test_panic_is_unhandled_exception() {
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "panic", |_| panic!("kaboom")).build(),
        );
        wait_terminal(&test);
        assert_eq!(test.failure_type().as_deref(), Some(UNHANDLED_EXCEPTION));
        assert_eq!(test.failure_message().as_deref(), Some("kaboom"));
    }

    #[test]
    fn test_caught_failure_unwind_still_stops_body() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let (test, statuses) = launch_collecting(
            Test::from_fn("ns", "nested", move |ctx| {
                ctx.panics(|| ctx.is_true(false));
                *flag.lock() = true;
                Ok(())
            })
            .build(),
        );
        wait_terminal(&test);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(test.status(), TestStatus::FinishedError);
        assert_eq!(test.failure_type().as_deref(), Some("True"));
        assert!(!*reached.lock());
        assert_eq!(
            *statuses.lock(),
            vec![TestStatus::Running, TestStatus::FinishedError]
        );
    }

    #[test]
    fn test_does_not_panic_lets_failure_unwind_through() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "guarded", move |ctx| {
                ctx.does_not_panic(|| ctx.equal(&1, &2));
                *flag.lock() = true;
                Ok(())
            })
            .build(),
        );
        wait_terminal(&test);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(test.failure_type().as_deref(), Some("Equal"));
        assert!(!*reached.lock());
    }

    #[test]
    fn test_caught_panic_does_not_leak_into_later_failure() {
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "rethrow", |ctx| {
                let message = ctx.panics(|| panic!("expected"));
                assert_eq!(message.as_deref(), Some("expected"));
                panic::resume_unwind(Box::new("rethrown"))
            })
            .build(),
        );
        wait_terminal(&test);

        assert_eq!(test.failure_type().as_deref(), Some(UNHANDLED_EXCEPTION));
        assert_eq!(test.failure_message().as_deref(), Some("rethrown"));
        assert!(test.failure_stacktrace().is_empty());
    }

    #[test]
    fn test_watchdog_times_out_stalled_body() {
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "stall", |ctx| {
                loop {
                    ctx.checkpoint("spinning")?;
                    thread::sleep(Duration::from_millis(5));
                }
            })
            .timeout(Duration::from_millis(50))
            .build(),
        );
        wait_terminal(&test);

        assert_eq!(test.status(), TestStatus::FinishedError);
        assert_eq!(test.failure_type().as_deref(), Some(TIMEOUT));
        let trace = test.failure_stacktrace();
        assert!(!trace.is_empty());
        assert!(trace[0].ends_with("(spinning)"));
    }

    #[test]
    fn test_async_body_waits_for_completion() {
        let (test, _) = launch_collecting(
            Test::from_fn("ns", "async", |ctx| {
                let ctx = ctx.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(30));
                    ctx.success();
                });
                Ok(())
            })
            .asynchronous()
            .build(),
        );

        thread::sleep(Duration::from_millis(5));
        assert_eq!(test.status(), TestStatus::Running);
        wait_terminal(&test);
        assert_eq!(test.status(), TestStatus::FinishedSuccessfully);
    }
}
