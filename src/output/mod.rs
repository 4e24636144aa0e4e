//! Output module
//!
//! Live console rendering while a suite runs and result formatting once it
//! has settled.

mod console;
mod formatter;

pub use console::{render_suite, ConsoleObserver, ConsoleOptions};
pub use formatter::{write_results_to_file, OutputFormat, ResultFormatter};
