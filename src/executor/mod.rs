//! Test execution engine
//!
//! The suite admits tests once their dependencies succeed, the supervisor
//! runs each admitted test on its own thread under a timeout watchdog, and
//! the notifier fans status changes out to observers.

mod notifier;
mod suite;
mod supervisor;

pub use notifier::{Listener, Notifier, SubscriptionId, TestUpdate};
pub use suite::{DependencyPolicy, Suite, SuiteError, DEPENDENCY_FAILED};
pub use supervisor::SPAWN_FAILED;
pub(crate) use supervisor::discard_panic_record;
