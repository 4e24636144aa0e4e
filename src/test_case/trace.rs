//! Failure trace capture and filtering
//!
//! Traces are captured with `std::backtrace` on the thread that fails and
//! rendered one frame per line as `symbol at file:line:col`.

use std::any::Any;
use std::backtrace::Backtrace;

/// Symbol prefixes that belong to the runtime or to the engine itself.
const FRAMEWORK_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "<std::",
    "<core::",
    "<alloc::",
    "backtrace::",
    "__rust",
    "rust_begin_unwind",
    "rust_panic",
    "test_cascade::test_case::",
    "test_cascade::executor::",
    "<test_cascade::test_case::",
    "<test_cascade::executor::",
    "__pthread",
    "__libc_start",
];

/// Thread entry symbols matched exactly.
const FRAMEWORK_SYMBOLS: &[&str] = &["start_thread", "__clone", "clone3", "_start", "main", "<unknown>"];

/// Capture the current thread's stack as frame strings.
pub fn capture() -> Vec<String> {
    parse_backtrace(&Backtrace::force_capture().to_string())
}

/// Split the display form of a backtrace into frames.
pub fn parse_backtrace(text: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim) {
        if let Some((index, symbol)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(symbol.trim().to_string());
                continue;
            }
        }
        if let (Some(location), Some(frame)) = (line.strip_prefix("at "), frames.last_mut()) {
            frame.push_str(" at ");
            frame.push_str(location.trim());
        }
    }
    frames
}

pub fn is_framework_frame(frame: &str) -> bool {
    let symbol = frame.split(" at ").next().unwrap_or(frame);
    FRAMEWORK_SYMBOLS.contains(&symbol)
        || FRAMEWORK_PREFIXES
            .iter()
            .any(|prefix| symbol.starts_with(prefix))
}

/// Drop frames belonging to the runtime and the engine.
pub fn filter_frames(frames: Vec<String>) -> Vec<String> {
    frames
        .into_iter()
        .filter(|frame| !is_framework_frame(frame))
        .collect()
}

/// Keep only the frames above the first one containing `marker`.
pub fn truncate_at(mut frames: Vec<String>, marker: &str) -> Vec<String> {
    if let Some(index) = frames.iter().position(|frame| frame.contains(marker)) {
        frames.truncate(index);
    }
    frames
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/abc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::force_capture
   2: test_cascade::test_case::Test::failure
             at ./src/test_case/mod.rs:250:17
   3: app::suites::checks::{{closure}}
             at ./src/suites.rs:12:9
   4: <test_cascade::registry::FnBody<F> as test_cascade::registry::TestBody>::execute
             at ./src/registry/body.rs:40:9
   5: test_cascade::executor::supervisor::run_body
   6: std::sys::pal::unix::thread::Thread::new::thread_start
   7: start_thread
   8: __clone";

    #[test]
    fn test_parse_backtrace_joins_locations() {
        let frames = parse_backtrace(SAMPLE);
        assert_eq!(frames.len(), 9);
        assert_eq!(
            frames[3],
            "app::suites::checks::{{closure}} at ./src/suites.rs:12:9"
        );
        assert_eq!(frames[1], "std::backtrace::Backtrace::force_capture");
    }

    #[test]
    fn test_filter_frames_keeps_user_code() {
        let frames = filter_frames(parse_backtrace(SAMPLE));
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("app::suites::checks"));
        assert!(frames[1].starts_with("<test_cascade::registry::FnBody"));
    }

    #[test]
    fn test_truncate_at_trampoline() {
        let frames = truncate_at(filter_frames(parse_backtrace(SAMPLE)), "test_cascade::registry::");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("app::suites::checks"));
    }

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(text.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
    }
}
