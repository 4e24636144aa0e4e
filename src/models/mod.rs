//! Data models for test execution
//!
//! Status, log and snapshot types shared by the engine and its observers.

mod test_result;

pub use test_result::{LogLevel, LogMessage, RunSummary, TestSnapshot, TestStatus};
