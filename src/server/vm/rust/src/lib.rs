/* src/server/vm/rust/src/lib.rs */

// Run compiled server bundles in throwaway V8 isolates: polyfills, bundle,
// then `render(data)`, under a hard timeout that terminates the isolate.

mod cancel;
mod engine;
mod frames;
mod pool;
mod result;

pub use engine::{DEFAULT_MAX_HEAP_BYTES, Engine, EngineConfig};
pub use frames::BUNDLE_SCRIPT;
pub use pool::RenderPool;
pub use result::{DEFAULT_RENDER_TIMEOUT, Phase, RenderReport, RenderRequest, RenderResult};

#[cfg(test)]
mod tests;
