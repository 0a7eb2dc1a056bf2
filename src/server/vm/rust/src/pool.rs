/* src/server/vm/rust/src/pool.rs */

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::engine::Engine;
use crate::result::{RenderReport, RenderRequest};

/// Async front for [`Engine`]: at most `max_concurrent` renders hold an
/// isolate at once, each on a blocking-pool thread.
#[derive(Clone)]
pub struct RenderPool {
  engine: Arc<Engine>,
  permits: Arc<Semaphore>,
  max_concurrent: usize,
}

impl RenderPool {
  pub fn new(engine: Engine, max_concurrent: usize) -> Self {
    let max_concurrent = max_concurrent.max(1);
    Self { engine: Arc::new(engine), permits: Arc::new(Semaphore::new(max_concurrent)), max_concurrent }
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  pub fn max_concurrent(&self) -> usize {
    self.max_concurrent
  }

  /// Permits not currently held by a render.
  pub fn available(&self) -> usize {
    self.permits.available_permits()
  }

  pub async fn render(&self, request: RenderRequest) -> RenderReport {
    let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
      return RenderReport::host_failure("render pool is closed");
    };
    let engine = Arc::clone(&self.engine);
    let task = tokio::task::spawn_blocking(move || {
      let _permit = permit;
      engine.render(&request)
    });
    match task.await {
      Ok(report) => report,
      Err(e) => RenderReport::host_failure(format!("render task failed: {e}")),
    }
  }
}
