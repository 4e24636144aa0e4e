//! Assertions available on [`TestContext`]
//!
//! A failing assertion records `Failure(<assertion>, <message>)`. On the body
//! thread that also unwinds the body, so later assertions never run.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use super::trace::panic_message;
use super::{FailureUnwind, TestContext};
use crate::executor::discard_panic_record;

/// Render a value for a failure message on a single line.
fn render<T: Debug + ?Sized>(value: &T) -> String {
    format!("{value:?}").replace('\n', "\\n")
}

impl TestContext {
    #[track_caller]
    pub fn is_true(&self, value: bool) {
        self.breadcrumb();
        if !value {
            self.test().failure("True", "Value was not true");
        }
    }

    #[track_caller]
    pub fn is_false(&self, value: bool) {
        self.breadcrumb();
        if value {
            self.test().failure("False", "Value was not false");
        }
    }

    #[track_caller]
    pub fn is_some<T>(&self, value: &Option<T>) {
        self.breadcrumb();
        if value.is_none() {
            self.test().failure("Some", "Value was None");
        }
    }

    #[track_caller]
    pub fn is_none<T: Debug>(&self, value: &Option<T>) {
        self.breadcrumb();
        if let Some(inner) = value {
            self.test()
                .failure("None", format!("Value was Some({})", render(inner)));
        }
    }

    #[track_caller]
    pub fn equal<T: PartialEq + Debug + ?Sized>(&self, actual: &T, expected: &T) {
        self.breadcrumb();
        if actual != expected {
            self.test().failure(
                "Equal",
                format!(
                    "The value {} does not equal {}",
                    render(actual),
                    render(expected)
                ),
            );
        }
    }

    #[track_caller]
    pub fn not_equal<T: PartialEq + Debug + ?Sized>(&self, actual: &T, other: &T) {
        self.breadcrumb();
        if actual == other {
            self.test().failure(
                "NotEqual",
                format!(
                    "The two values given should not be the same, they were. Value: {}",
                    render(actual)
                ),
            );
        }
    }

    #[track_caller]
    pub fn has_substring(&self, substring: &str, container: &str) {
        self.breadcrumb();
        if !container.contains(substring) {
            self.test().failure(
                "HasSubstring",
                format!(
                    "The string {} does not contain the substring {}",
                    render(container),
                    render(substring)
                ),
            );
        }
    }

    #[track_caller]
    pub fn starts_with(&self, value: &str, prefix: &str) {
        self.breadcrumb();
        if !value.starts_with(prefix) {
            let head: String = value.chars().take(50).collect();
            self.test().failure(
                "StartsWith",
                format!(
                    "Value did not start with: {}. Value started with: {}",
                    render(prefix),
                    render(head.as_str())
                ),
            );
        }
    }

    #[track_caller]
    pub fn same<T: ?Sized>(&self, actual: &T, other: &T) {
        self.breadcrumb();
        if !std::ptr::eq(actual, other) {
            self.test()
                .failure("Same", "The two values did not reference the same instance");
        }
    }

    #[track_caller]
    pub fn not_same<T: ?Sized>(&self, actual: &T, other: &T) {
        self.breadcrumb();
        if std::ptr::eq(actual, other) {
            self.test().failure(
                "NotSame",
                "The two values were not supposed to be the exact same instance",
            );
        }
    }

    #[track_caller]
    pub fn empty<I: IntoIterator>(&self, collection: I) {
        self.breadcrumb();
        if collection.into_iter().next().is_some() {
            self.test().failure("Empty", "The collection was not empty");
        }
    }

    #[track_caller]
    pub fn not_empty<I: IntoIterator>(&self, collection: I) {
        self.breadcrumb();
        if collection.into_iter().next().is_none() {
            self.test().failure("NotEmpty", "The collection was empty");
        }
    }

    /// Assert that `code` panics and return the panic message.
    #[track_caller]
    pub fn panics<F: FnOnce()>(&self, code: F) -> Option<String> {
        self.breadcrumb();
        match panic::catch_unwind(AssertUnwindSafe(code)) {
            Ok(()) => {
                self.test().failure("Panics", "Code didn't panic");
                None
            }
            Err(payload) if payload.is::<FailureUnwind>() => panic::resume_unwind(payload),
            Err(payload) => {
                discard_panic_record();
                Some(panic_message(payload.as_ref()))
            }
        }
    }

    /// Assert that `code` panics and hand the panic message to `inspect`.
    #[track_caller]
    pub fn panics_with<F, C>(&self, code: F, inspect: C)
    where
        F: FnOnce(),
        C: FnOnce(&str),
    {
        if let Some(message) = self.panics(code) {
            inspect(&message);
        }
    }

    /// Assert that `code` completes without panicking. Returns the panic
    /// message when it did panic.
    #[track_caller]
    pub fn does_not_panic<F: FnOnce()>(&self, code: F) -> Option<String> {
        self.breadcrumb();
        match panic::catch_unwind(AssertUnwindSafe(code)) {
            Ok(()) => None,
            Err(payload) if payload.is::<FailureUnwind>() => panic::resume_unwind(payload),
            Err(payload) => {
                discard_panic_record();
                let message = panic_message(payload.as_ref());
                self.test().failure(
                    "DoesNotPanic",
                    format!("Code panicked with message: {message}"),
                );
                Some(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestStatus;
    use crate::test_case::Test;
    use std::sync::Arc;

    // Assertions called off the body thread record the failure and return.
    fn context() -> TestContext {
        let test = Arc::new(Test::from_fn("ns", "assert", |_| Ok(())).build());
        test.admit().unwrap();
        TestContext::new(test)
    }

    #[test]
    fn test_passing_assertions_leave_test_running() {
        let ctx = context();
        let value = 5;
        ctx.is_true(true);
        ctx.is_false(false);
        ctx.is_some(&Some(1));
        ctx.is_none::<u8>(&None);
        ctx.equal(&1, &1);
        ctx.equal("hello world", "hello world");
        ctx.not_equal(&1, &2);
        ctx.has_substring("ello", "hello");
        ctx.starts_with("hello", "he");
        ctx.same(&value, &value);
        ctx.not_same(&value, &6);
        ctx.empty(Vec::<u8>::new());
        ctx.not_empty(vec!["hello"]);
        ctx.panics_with(|| panic!("hi"), |message| assert_eq!(message, "hi"));
        ctx.does_not_panic(|| {});
        assert_eq!(ctx.status(), TestStatus::Running);
    }

    #[test]
    fn test_equal_failure_message() {
        let ctx = context();
        ctx.equal(&1, &2);
        let test = ctx.test();
        assert_eq!(test.status(), TestStatus::FinishedError);
        assert_eq!(test.failure_type().as_deref(), Some("Equal"));
        assert_eq!(
            test.failure_message().as_deref(),
            Some("The value 1 does not equal 2")
        );
    }

    #[test]
    fn test_strings_render_quoted_and_escaped() {
        let ctx = context();
        ctx.has_substring("hello", "wor\nld");
        assert_eq!(
            ctx.test().failure_message().as_deref(),
            Some(r#"The string "wor\nld" does not contain the substring "hello""#)
        );
    }

    #[test]
    fn test_panics_fails_when_code_returns() {
        let ctx = context();
        assert_eq!(ctx.panics(|| {}), None);
        assert_eq!(ctx.test().failure_type().as_deref(), Some("Panics"));
    }

    #[test]
    fn test_first_failing_assertion_wins() {
        let ctx = context();
        ctx.is_true(false);
        ctx.not_empty(Vec::<u8>::new());
        assert_eq!(ctx.test().failure_type().as_deref(), Some("True"));
    }
}
