//! Explicit test registry
//!
//! Tests are described up front with [`TestBuilder`]s instead of being
//! discovered at runtime. The registry also owns the per-run fixture
//! container: one instance per fixture type, created the first time a test
//! asks for it and shared by every test registered against it.

mod body;

pub use body::{FnBody, TestBody};

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::test_case::{Test, TestBuilder, TestContext, DEFAULT_TIMEOUT};

/// Ordered collection of test descriptors, consumed by `Suite::register_all`
pub struct Registry {
    entries: Vec<TestBuilder>,
    fixtures: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    default_timeout: Duration,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            fixtures: HashMap::new(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Timeout for descriptors that do not set their own
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn add(&mut self, test: TestBuilder) -> &mut Self {
        self.entries.push(test);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn full_ids(&self) -> Vec<String> {
        self.entries.iter().map(TestBuilder::full_id).collect()
    }

    /// Shared fixture instance of type `T`, constructed on first use.
    pub fn fixture<T>(&mut self) -> Arc<T>
    where
        T: Default + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        if let Some(existing) = self.fixtures.get(&key) {
            if let Ok(instance) = Arc::clone(existing).downcast::<T>() {
                return instance;
            }
        }
        let instance = Arc::new(T::default());
        self.fixtures.insert(key, instance.clone());
        instance
    }

    /// Describe a test whose body runs against the shared fixture `T`.
    pub fn method<T, F>(
        &mut self,
        namespace: impl Into<String>,
        id: impl Into<String>,
        body: F,
    ) -> TestBuilder
    where
        T: Default + Send + Sync + 'static,
        F: Fn(&T, &TestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let fixture = self.fixture::<T>();
        Test::from_fn(namespace, id, move |ctx| body(&fixture, ctx))
    }

    /// Keep tests whose id starts with any of `prefixes`, plus everything
    /// they transitively depend on. An empty prefix list keeps everything.
    pub fn select(mut self, prefixes: &[String]) -> Self {
        if prefixes.is_empty() {
            return self;
        }

        let ids = self.full_ids();
        let mut keep: BTreeSet<usize> = ids
            .iter()
            .enumerate()
            .filter(|(_, id)| prefixes.iter().any(|p| id.starts_with(p.as_str())))
            .map(|(i, _)| i)
            .collect();

        let mut queue: Vec<usize> = keep.iter().copied().collect();
        while let Some(index) = queue.pop() {
            for dependency in self.entries[index].dependencies() {
                for target in resolve(&ids, dependency) {
                    if keep.insert(target) {
                        queue.push(target);
                    }
                }
            }
        }

        let mut position = 0;
        self.entries.retain(|_| {
            let kept = keep.contains(&position);
            position += 1;
            kept
        });
        self
    }
}

/// Indices a dependency string refers to: the exact id if registered,
/// otherwise every id with that prefix.
fn resolve(ids: &[String], dependency: &str) -> Vec<usize> {
    if let Some(exact) = ids.iter().position(|id| id == dependency) {
        return vec![exact];
    }
    ids.iter()
        .enumerate()
        .filter(|(_, id)| id.starts_with(dependency))
        .map(|(i, _)| i)
        .collect()
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoIterator for Registry {
    type Item = Test;
    type IntoIter = IntoTests;

    fn into_iter(self) -> IntoTests {
        IntoTests {
            inner: self.entries.into_iter(),
            default_timeout: self.default_timeout,
        }
    }
}

/// Iterator building the registered tests
pub struct IntoTests {
    inner: std::vec::IntoIter<TestBuilder>,
    default_timeout: Duration,
}

impl Iterator for IntoTests {
    type Item = Test;

    fn next(&mut self) -> Option<Test> {
        self.inner
            .next()
            .map(|builder| builder.build_with_default_timeout(self.default_timeout))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    fn noop(namespace: &str, id: &str) -> TestBuilder {
        Test::from_fn(namespace, id, |_| Ok(()))
    }

    #[test]
    fn test_fixture_is_shared_per_type() {
        let mut registry = Registry::new();
        let first = registry.fixture::<Counter>();
        let second = registry.fixture::<Counter>();
        first.hits.fetch_add(1, Ordering::SeqCst);
        assert_eq!(second.hits.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_default_timeout_applies_to_unset_descriptors() {
        let mut registry = Registry::new().with_default_timeout(Duration::from_secs(5));
        registry
            .add(noop("ns", "default"))
            .add(noop("ns", "custom").timeout(Duration::from_millis(50)));

        let tests: Vec<Test> = registry.into_iter().collect();
        assert_eq!(tests[0].timeout(), Duration::from_secs(5));
        assert_eq!(tests[1].timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_select_includes_transitive_dependencies() {
        let mut registry = Registry::new();
        registry
            .add(noop("setup", "db"))
            .add(noop("setup", "cache"))
            .add(noop("core", "model").depends_on("setup.db"))
            .add(noop("api", "routes").depends_on("core."))
            .add(noop("unrelated", "thing"));

        let selected = registry.select(&["api.".to_string()]);
        assert_eq!(
            selected.full_ids(),
            vec!["setup.db", "core.model", "api.routes"]
        );
    }

    #[test]
    fn test_select_without_prefixes_keeps_all() {
        let mut registry = Registry::new();
        registry.add(noop("a", "one")).add(noop("b", "two"));
        assert_eq!(registry.select(&[]).len(), 2);
    }
}
