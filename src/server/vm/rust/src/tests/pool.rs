/* src/server/vm/rust/src/tests/pool.rs */

use std::time::Duration;

use serde_json::json;

use super::{bundle, engine, request};
use crate::{RenderPool, RenderResult};

#[tokio::test]
async fn pool_renders_and_releases_permits() {
  let pool = RenderPool::new(engine(), 2);
  let code = bundle(r#"return "<b>" + data.i + "</b>";"#);

  let tasks: Vec<_> = (0..5)
    .map(|i| {
      let pool = pool.clone();
      let req = request(&code, json!({ "i": i }));
      tokio::spawn(async move { pool.render(req).await })
    })
    .collect();
  for (i, task) in tasks.into_iter().enumerate() {
    let report = task.await.unwrap();
    assert_eq!(report.result.html(), Some(format!("<b>{i}</b>").as_str()));
  }
  assert_eq!(pool.available(), 2);
  assert_eq!(pool.max_concurrent(), 2);
}

#[tokio::test]
async fn timeout_through_pool_frees_its_permit() {
  let pool = RenderPool::new(engine(), 1);
  let looping = bundle("while (true) {}");
  let report = pool.render(request(&looping, json!({})).with_timeout(Duration::from_millis(100))).await;
  assert!(matches!(report.result, RenderResult::TimedOut { .. }));
  assert_eq!(pool.available(), 1);

  let ok = bundle(r#"return "after";"#);
  assert_eq!(pool.render(request(&ok, json!({}))).await.result.html(), Some("after"));
}

#[test]
fn zero_concurrency_is_clamped() {
  let pool = RenderPool::new(engine(), 0);
  assert_eq!(pool.max_concurrent(), 1);
}
