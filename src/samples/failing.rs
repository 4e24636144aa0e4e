//! Samples that are supposed to fail, one per failure kind

use std::thread;
use std::time::Duration;
use test_cascade::registry::Registry;
use test_cascade::test_case::{Test, TestBuilder, TestContext};

const NAMESPACE: &str = "sample.failing";
const EXPECTED: &str = "This test is supposed to fail";

fn failing<F>(id: &str, body: F) -> TestBuilder
where
    F: Fn(&TestContext) + Send + Sync + 'static,
{
    Test::from_fn(NAMESPACE, id, move |ctx| {
        body(ctx);
        Ok(())
    })
    .description(EXPECTED)
}

pub fn register(registry: &mut Registry) {
    registry
        .add(failing("failed_some", |ctx| ctx.is_some(&None::<u8>)))
        .add(failing("failed_none", |ctx| ctx.is_none(&Some("value"))))
        .add(failing("failed_true", |ctx| ctx.is_true(false)))
        .add(failing("failed_false", |ctx| ctx.is_false(true)))
        .add(failing("failed_equal", |ctx| ctx.equal(&1, &2)))
        .add(failing("failed_not_equal", |ctx| ctx.not_equal(&true, &true)))
        .add(failing("failed_substring", |ctx| ctx.has_substring("hello", "world")))
        .add(failing("failed_same", |ctx| ctx.same(&Box::new(1), &Box::new(1))))
        .add(failing("failed_not_same", |ctx| {
            let instance = 1;
            ctx.not_same(&instance, &instance)
        }))
        .add(failing("failed_empty", |ctx| ctx.empty(["hello"])))
        .add(failing("failed_not_empty", |ctx| ctx.not_empty(Vec::<u8>::new())))
        .add(failing("failed_panics", |ctx| {
            ctx.panics(|| {});
        }))
        .add(failing("failed_does_not_panic", |ctx| {
            ctx.does_not_panic(|| panic!("..."));
        }))
        .add(failing("explicit_failure", |ctx| ctx.fail("Gave up on purpose")))
        .add(
            Test::from_fn(NAMESPACE, "error_return", |_| {
                let port: u16 = "eighty".parse()?;
                anyhow::ensure!(port > 0, "port must be positive");
                Ok(())
            })
            .description(EXPECTED),
        )
        .add(
            Test::from_fn(NAMESPACE, "unexpected_panic", |_| {
                let values: Vec<u8> = Vec::new();
                let _ = values[3];
                Ok(())
            })
            .description(EXPECTED),
        )
        // Never signals completion, so the watchdog fails it.
        .add(
            Test::from_fn(NAMESPACE, "async_never_completes", |_| Ok(()))
                .asynchronous()
                .timeout(Duration::from_secs(1))
                .description(EXPECTED),
        )
        // Still busy at the timeout; the failure trace shows where.
        .add(
            Test::from_fn(NAMESPACE, "async_long_running", long_running)
                .asynchronous()
                .timeout(Duration::from_secs(1))
                .description(EXPECTED),
        )
        .add(
            Test::from_fn(NAMESPACE, "after_failure", |ctx| {
                ctx.info("Only runs if failed_equal passes");
                Ok(())
            })
            .depends_on("sample.failing.failed_equal"),
        );
}

fn long_running(ctx: &TestContext) -> anyhow::Result<()> {
    for step in 0..40 {
        ctx.checkpoint(format!("polling step {step}"))?;
        thread::sleep(Duration::from_millis(100));
    }
    ctx.success();
    Ok(())
}
