/* src/cli/ssr-build/src/bundler.rs */

use std::fmt;
use std::sync::Arc;

use crate::error::BundleError;
use crate::target::BuildTarget;

/// Opaque id minted by the bundler backend. Only meaningful to the backend
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendHandle(pub u64);

impl fmt::Display for BackendHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "h{}", self.0)
  }
}

#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
  pub code: Vec<u8>,
  pub source_map: Option<Vec<u8>>,
}

/// Incremental bundler speaking handles. Implementations must tolerate
/// concurrent `rebuild` calls on distinct handles.
pub trait Bundler: Send + Sync {
  fn create(&self, target: &BuildTarget) -> Result<BackendHandle, BundleError>;

  fn rebuild(&self, handle: BackendHandle) -> Result<BundleOutput, BundleError>;

  /// Best effort; failures are the backend's to log.
  fn dispose(&self, handle: BackendHandle);
}

impl<B: Bundler + ?Sized> Bundler for Arc<B> {
  fn create(&self, target: &BuildTarget) -> Result<BackendHandle, BundleError> {
    (**self).create(target)
  }

  fn rebuild(&self, handle: BackendHandle) -> Result<BundleOutput, BundleError> {
    (**self).rebuild(handle)
  }

  fn dispose(&self, handle: BackendHandle) {
    (**self).dispose(handle)
  }
}
