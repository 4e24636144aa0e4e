//! Bundled sample suites
//!
//! Exercise every engine feature from the command line: assertions, slow
//! and async tests, dependencies, logging, timeouts and shared fixtures.

mod basic;
mod failing;
mod fixtures;

use std::time::Duration;
use test_cascade::registry::Registry;

/// Registry holding every sample test
pub fn registry(default_timeout: Duration) -> Registry {
    let mut registry = Registry::new().with_default_timeout(default_timeout);
    basic::register(&mut registry);
    failing::register(&mut registry);
    fixtures::register(&mut registry);
    registry
}
