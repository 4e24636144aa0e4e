//! Samples sharing per-run fixture instances

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use test_cascade::registry::Registry;
use test_cascade::test_case::TestContext;

const NAMESPACE: &str = "sample.fixtures";

/// Counts how many tests touched it
#[derive(Default)]
pub struct Counter {
    hits: AtomicUsize,
}

/// Append-only journal shared by the journal tests
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

pub fn register(registry: &mut Registry) {
    let first = registry.method::<Counter, _>(NAMESPACE, "first", |counter, ctx| {
        counter.hits.fetch_add(1, Ordering::SeqCst);
        ctx.debug("counter incremented");
        Ok(())
    });
    let second = registry
        .method::<Counter, _>(NAMESPACE, "second", |counter, ctx| {
            ctx.equal(&counter.hits.load(Ordering::SeqCst), &1);
            Ok(())
        })
        .depends_on("sample.fixtures.first");

    let write = registry.method::<Journal, _>(NAMESPACE, "journal_write", journal_write);
    let read = registry
        .method::<Journal, _>(NAMESPACE, "journal_read", journal_read)
        .depends_on("sample.fixtures.journal_write");

    registry.add(first).add(second).add(write).add(read);
}

fn journal_write(journal: &Journal, ctx: &TestContext) -> anyhow::Result<()> {
    journal.entries.lock().push(ctx.full_id().to_string());
    Ok(())
}

fn journal_read(journal: &Journal, ctx: &TestContext) -> anyhow::Result<()> {
    let entries = journal.entries.lock().clone();
    ctx.equal(entries.as_slice(), &["sample.fixtures.journal_write".to_string()][..]);
    ctx.info(format!("journal has {} entries", entries.len()));
    Ok(())
}
