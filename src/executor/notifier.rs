//! Multicast status notifications
//!
//! Listeners run synchronously on whichever thread produced the transition,
//! so they must be cheap and must not block.

use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

use crate::models::{TestSnapshot, TestStatus};
use crate::test_case::{trace, Test, Transition};

/// One status change delivered to listeners
#[derive(Clone, Copy, Debug)]
pub struct TestUpdate<'a> {
    pub test: &'a Test,
    pub from: TestStatus,
    /// Fields as they were when the transition was applied
    pub snapshot: &'a TestSnapshot,
}

pub type Listener = Arc<dyn Fn(&TestUpdate<'_>) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TestUpdate<'_>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the subscription was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver a transition to every listener.
    ///
    /// The listener list is copied first so listeners may subscribe or
    /// unsubscribe from inside a callback. A panicking listener is logged and
    /// does not affect the others or the emitting test.
    pub fn emit(&self, test: &Test, transition: &Transition) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let update = TestUpdate {
            test,
            from: transition.from,
            snapshot: &transition.snapshot,
        };
        for listener in listeners {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(&update))) {
                error!(
                    test = %test.full_id(),
                    "Status listener panicked: {}",
                    trace::panic_message(payload.as_ref())
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn transition(test: &Test) -> Transition {
        test.mark_waiting().unwrap()
    }

    #[test]
    fn test_emit_reaches_every_listener() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let seen = seen.clone();
            notifier.subscribe(move |update| {
                seen.lock().push((name, update.snapshot.status));
            });
        }

        let test = Test::from_fn("ns", "t", |_| Ok(())).build();
        notifier.emit(&test, &transition(&test));

        assert_eq!(
            *seen.lock(),
            vec![
                ("first", TestStatus::WaitingForDependencies),
                ("second", TestStatus::WaitingForDependencies)
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = Notifier::new();
        let id = notifier.subscribe(|_| {});
        assert_eq!(notifier.listener_count(), 1);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let notifier = Notifier::new();
        let calls = Arc::new(AtomicU64::new(0));
        notifier.subscribe(|_| panic!("listener bug"));
        let counter = calls.clone();
        notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let test = Test::from_fn("ns", "t", |_| Ok(())).build();
        notifier.emit(&test, &transition(&test));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
