//! Passing samples

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use test_cascade::registry::Registry;
use test_cascade::test_case::{Test, TestContext};

const NAMESPACE: &str = "sample.basic";

pub fn register(registry: &mut Registry) {
    registry
        .add(Test::from_fn(NAMESPACE, "asserts", asserts).description("Every assertion, passing"))
        .add(Test::from_fn(NAMESPACE, "plain_function", plain_function));

    for millis in [40, 200, 400, 600, 800, 1000, 1500, 15000] {
        registry.add(Test::from_fn(NAMESPACE, format!("slow_{millis}ms"), move |ctx| {
            ctx.sleep(Duration::from_millis(millis))?;
            Ok(())
        }));
    }

    registry
        .add(
            Test::from_fn(NAMESPACE, "with_dependencies", |ctx| {
                ctx.is_true(true);
                Ok(())
            })
            .depends_on_all(
                "sample.basic.asserts,sample.basic.slow_1500ms,sample.basic.slow_15000ms",
            ),
        )
        .add(Test::from_fn(NAMESPACE, "async_completion", async_completion).asynchronous())
        .add(Test::from_fn(NAMESPACE, "logging", logging));
}

fn asserts(ctx: &TestContext) -> anyhow::Result<()> {
    let instance = Arc::new(1);
    let other = Arc::new(1);
    ctx.is_some(&Some(1));
    ctx.is_none::<i32>(&None);
    ctx.is_true(true);
    ctx.is_false(false);
    ctx.equal(&1, &1);
    ctx.equal("hello world", "hello world");
    ctx.equal(&true, &true);
    ctx.not_equal(&true, &false);
    ctx.not_equal(&1, &2);
    ctx.not_equal("hello", "world");
    ctx.has_substring("ello", "hello");
    ctx.starts_with("hello world", "hello");
    ctx.same(instance.as_ref(), instance.as_ref());
    ctx.not_same(instance.as_ref(), other.as_ref());
    ctx.empty(Vec::<String>::new());
    ctx.empty(&[] as &[&str]);
    ctx.not_empty(["hello"]);
    ctx.not_empty(&vec!["hello".to_string()]);
    ctx.panics(|| panic!("hi"));
    ctx.panics_with(|| panic!("hi"), |message| ctx.equal(message, "hi"));
    ctx.does_not_panic(|| ctx.equal(&1, &1));
    Ok(())
}

fn plain_function(ctx: &TestContext) -> anyhow::Result<()> {
    ctx.is_true(true);
    Ok(())
}

fn async_completion(ctx: &TestContext) -> anyhow::Result<()> {
    let ctx = ctx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        ctx.success();
    });
    Ok(())
}

fn logging(ctx: &TestContext) -> anyhow::Result<()> {
    ctx.info("I'm starting now");
    ctx.sleep(Duration::from_millis(300))?;
    ctx.debug("Doing something else");
    ctx.sleep(Duration::from_millis(300))?;
    ctx.info("moving forward");
    ctx.sleep(Duration::from_millis(300))?;
    ctx.warn("Warning you!!");
    ctx.sleep(Duration::from_millis(300))?;
    Ok(())
}
