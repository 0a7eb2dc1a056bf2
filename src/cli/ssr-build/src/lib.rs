/* src/cli/ssr-build/src/lib.rs */

// Build side of SSR: find a page's layouts, synthesize client and server
// entrypoints, and keep incremental bundler contexts warm across rebuilds.

pub mod bundler;
pub mod context;
pub mod diagnostic;
pub mod entrypoint;
pub mod error;
pub mod esbuild;
mod fnv;
pub mod layout;
pub mod target;

pub use bundler::{BackendHandle, BundleOutput, Bundler};
pub use context::{
  BundleContextManager, CompiledArtifact, ContextId, DEFAULT_REBUILD_CONCURRENCY, RebuildResult,
};
pub use diagnostic::BuildError;
pub use entrypoint::{DEFAULT_DATA_ID, DEFAULT_ROOT_ID, Synthesizer, SyntheticEntrypoint};
pub use error::{BundleError, ConfigError, SynthError};
pub use esbuild::{EsbuildService, ServiceOptions};
pub use layout::{LayoutUnit, PageUnit, is_page_file, resolve};
pub use target::{BuildTarget, OutputFormat, SERVER_GLOBAL_NAME, Target};
