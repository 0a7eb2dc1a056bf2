/* src/server/vm/rust/src/cancel.rs */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use deno_core::v8;

/// Stops one running isolate from another thread. V8 unwinds the script
/// with an uncatchable termination; if the isolate is gone already the
/// call is a no-op and the supervisor falls back to detaching the thread.
#[derive(Clone)]
pub(crate) struct CancelHandle {
  isolate: v8::IsolateHandle,
  fired: Arc<AtomicBool>,
}

impl CancelHandle {
  pub(crate) fn new(isolate: v8::IsolateHandle, fired: Arc<AtomicBool>) -> Self {
    Self { isolate, fired }
  }

  /// Returns false when the isolate no longer exists.
  pub(crate) fn cancel(&self) -> bool {
    self.fired.store(true, Ordering::SeqCst);
    self.isolate.terminate_execution()
  }
}
