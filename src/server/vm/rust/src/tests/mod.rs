/* src/server/vm/rust/src/tests/mod.rs */

use std::time::Duration;

use crate::{Engine, EngineConfig, RenderRequest};

mod pool;

/// Wrap a `render` function body into a bundle shaped like the server build:
/// an IIFE assigning its exports to `__SEAM_SSR__`.
fn bundle(render_body: &str) -> String {
  format!("var __SEAM_SSR__ = (() => {{ function render(data) {{ {render_body} }} return {{ render }}; }})();")
}

fn engine() -> Engine {
  Engine::new(EngineConfig { soft_threshold: Duration::from_secs(60), ..EngineConfig::default() })
}

fn request(code: &str, data: serde_json::Value) -> RenderRequest {
  RenderRequest::new(code, data)
}
