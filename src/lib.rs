//! test-cascade: a concurrent, dependency-aware test execution engine
//!
//! Tests are registered into a [`Suite`], admitted as soon as every
//! dependency finished successfully, and run on their own threads under a
//! timeout watchdog. Status changes are multicast to observers such as the
//! [`output::ConsoleObserver`].
//!
//! ```no_run
//! use test_cascade::{Suite, Test};
//!
//! let suite = Suite::new();
//! suite.register(Test::from_fn("app.db", "connects", |ctx| {
//!     ctx.is_true(true);
//!     Ok(())
//! }).build())?;
//! suite.register(Test::from_fn("app.api", "serves", |_| Ok(()))
//!     .depends_on("app.db.")
//!     .build())?;
//!
//! suite.run()?;
//! suite.wait();
//! assert!(suite.summary().is_all_passed());
//! # Ok::<(), test_cascade::SuiteError>(())
//! ```

pub mod config;
pub mod executor;
pub mod models;
pub mod output;
pub mod registry;
pub mod test_case;
pub mod utils;

pub use executor::{DependencyPolicy, Suite, SuiteError, TestUpdate};
pub use models::{RunSummary, TestSnapshot, TestStatus};
pub use registry::Registry;
pub use test_case::{Test, TestBuilder, TestContext, TestError};
