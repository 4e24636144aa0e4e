//! Utility modules
//!
//! Logging setup and timing helpers.

pub mod logger;
mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::{format_elapsed, Stopwatch, Timer};
