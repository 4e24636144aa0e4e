//! Live console rendering of a running suite
//!
//! The observer repaints the whole suite on status changes. Bursts of
//! updates are coalesced: the first update arms a one-shot timer, updates
//! arriving while it is armed are dropped, and the timer repaints once.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::executor::{SubscriptionId, Suite};
use crate::models::{LogLevel, TestStatus};
use crate::test_case::Test;
use crate::utils::format_elapsed;

const RULE: &str = "==============================";
const RESET: &str = "\x1b[0m";

/// Console observer settings
#[derive(Clone, Debug)]
pub struct ConsoleOptions {
    /// Minimum time between two repaints
    pub refresh_interval: Duration,
    /// Log messages shown under each test
    pub log_tail: usize,
    /// ANSI colors and screen clearing
    pub colorize: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(500),
            log_tail: 10,
            colorize: true,
        }
    }
}

pub struct ConsoleObserver {
    suite: Suite,
    handle: Handle,
    options: ConsoleOptions,
    writer: Mutex<Box<dyn Write + Send>>,
    subscription: Mutex<Option<SubscriptionId>>,
    repaint_pending: AtomicBool,
    last_paint: Mutex<Option<Instant>>,
    paints: AtomicUsize,
}

impl ConsoleObserver {
    /// Subscribe a stdout observer to `suite`. Repaint timers run on `handle`.
    pub fn attach(suite: &Suite, handle: Handle, options: ConsoleOptions) -> Arc<Self> {
        Self::attach_with_writer(suite, handle, options, Box::new(io::stdout()))
    }

    pub fn attach_with_writer(
        suite: &Suite,
        handle: Handle,
        options: ConsoleOptions,
        writer: Box<dyn Write + Send>,
    ) -> Arc<Self> {
        let observer = Arc::new(Self {
            suite: suite.clone(),
            handle,
            options,
            writer: Mutex::new(writer),
            subscription: Mutex::new(None),
            repaint_pending: AtomicBool::new(false),
            last_paint: Mutex::new(None),
            paints: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&observer);
        let id = suite.subscribe(move |_| {
            if let Some(observer) = weak.upgrade() {
                observer.request_repaint();
            }
        });
        *observer.subscription.lock() = Some(id);
        debug!("Console observer attached");
        observer
    }

    /// Number of repaints so far
    pub fn paints(&self) -> usize {
        self.paints.load(Ordering::Acquire)
    }

    /// Coalesce a repaint request into the pending one, or arm the timer.
    pub fn request_repaint(self: &Arc<Self>) {
        if self.repaint_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let since_last = self.last_paint.lock().map(|at| at.elapsed());
        let delay = since_last
            .map(|elapsed| self.options.refresh_interval.saturating_sub(elapsed))
            .unwrap_or(Duration::ZERO);

        let observer = Arc::downgrade(self);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(observer) = Weak::upgrade(&observer) {
                // Cleared before painting so updates during the paint re-arm.
                observer.repaint_pending.store(false, Ordering::Release);
                observer.repaint();
            }
        });
    }

    /// Render and write the current suite state immediately.
    pub fn repaint(&self) {
        let frame = render_suite(&self.suite, &self.options);
        *self.last_paint.lock() = Some(Instant::now());

        let mut writer = self.writer.lock();
        let written = if self.options.colorize {
            write!(writer, "\x1b[2J\x1b[H{frame}")
        } else {
            write!(writer, "{frame}")
        }
        .and_then(|_| writer.flush());

        if let Err(err) = written {
            warn!("Console repaint failed: {}", err);
        }
        self.paints.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for ConsoleObserver {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.lock().take() {
            self.suite.unsubscribe(id);
        }
    }
}

fn color(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Idle => "\x1b[90m",
        TestStatus::WaitingForDependencies => "\x1b[37m",
        TestStatus::Running => "\x1b[33m",
        TestStatus::FinishedError => "\x1b[31m",
        TestStatus::FinishedSuccessfully => "\x1b[32m",
    }
}

struct Painter {
    out: String,
    colorize: bool,
}

impl Painter {
    fn set(&mut self, code: &str) {
        if self.colorize {
            self.out.push_str(code);
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }
}

/// Render every test grouped by namespace.
///
/// A namespace shows the lowest status of its tests and, once all of them
/// passed, their summed completion time.
pub fn render_suite(suite: &Suite, options: &ConsoleOptions) -> String {
    let tests = suite.tests();
    let mut namespaces: BTreeMap<&str, Vec<&Arc<Test>>> = BTreeMap::new();
    for test in &tests {
        namespaces.entry(test.namespace()).or_default().push(test);
    }

    let mut painter = Painter {
        out: String::new(),
        colorize: options.colorize,
    };

    for (index, (namespace, members)) in namespaces.iter().enumerate() {
        if index > 0 {
            painter.line("");
        }

        let status = members
            .iter()
            .map(|test| test.status())
            .min()
            .unwrap_or(TestStatus::FinishedSuccessfully);
        let total: Duration = members.iter().filter_map(|test| test.completion_time()).sum();

        painter.set(color(status));
        let mut header = format!("{} {}", status.symbol(), namespace);
        if status.is_success() {
            header.push_str(&format!(" - {}", format_elapsed(total)));
        }
        painter.line(&header);
        painter.line(RULE);

        for test in members {
            render_test(&mut painter, suite, test, options.log_tail);
        }
    }

    painter.set(RESET);
    painter.out
}

fn render_test(painter: &mut Painter, suite: &Suite, test: &Test, log_tail: usize) {
    let snapshot = test.snapshot();
    let status = snapshot.status;

    painter.set(color(status));
    let mut line = format!(" {} {}", status.symbol(), snapshot.id);
    if let (TestStatus::FinishedSuccessfully, Some(elapsed)) = (status, snapshot.completion_time) {
        line.push_str(&format!(" - {}", format_elapsed(elapsed)));
    }
    painter.out.push_str(&line);
    match snapshot.description.as_deref().map(str::trim) {
        Some(description) if status == TestStatus::FinishedError && !description.is_empty() => {
            painter.set("\x1b[31m");
            painter.line(&format!(" ({description})"));
        }
        _ => painter.line(""),
    }

    if status == TestStatus::FinishedError {
        painter.set(color(TestStatus::FinishedError));
        let message = snapshot.failure_message.as_deref().unwrap_or_default();
        match snapshot.failure_type.as_deref() {
            Some(kind) => painter.line(&format!("      [{kind}: {message}]")),
            None => painter.line(&format!("      [{message}]")),
        }
        for frame in &snapshot.failure_stacktrace {
            painter.line(&format!("     {frame}"));
        }
        painter.line("");
    }

    if status == TestStatus::WaitingForDependencies {
        let mut waiting = Vec::new();
        for dependency in &snapshot.dependencies {
            match suite.dependency_status(dependency) {
                TestStatus::FinishedSuccessfully => {}
                TestStatus::FinishedError => waiting.push(format!("{dependency}(E)")),
                _ => waiting.push(dependency.clone()),
            }
        }
        painter.line(&format!("     + Waiting for: {}", waiting.join(", ")));
    }

    let log = test.log_tail(log_tail);
    if !log.is_empty() {
        for entry in &log {
            let (code, prefix) = match entry.level {
                LogLevel::Debug => ("\x1b[90m", "     [Debug] "),
                LogLevel::Info => ("\x1b[37m", "     [Info]  "),
                LogLevel::Warn => ("\x1b[97m", "     [Warn]  "),
            };
            painter.set(code);
            painter.line(&format!("{prefix}{}", entry.message));
        }
        painter.line("");
    }
}
