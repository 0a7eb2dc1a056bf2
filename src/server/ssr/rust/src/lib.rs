/* src/server/ssr/rust/src/lib.rs */

// SSR facade: config and logging on top of the build side (seam-ssr-build)
// and the render side (seam-vm).

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use config::{ContextLifetime, SsrConfig, find_seam_config, load_ssr_config, parse_ssr_config};
pub use error::PipelineError;
pub use pipeline::{PageBuild, SsrPipeline};
pub use seam_vm::{Phase, RenderReport, RenderResult};

#[cfg(test)]
mod tests;
