/* src/server/ssr/rust/src/error.rs */

use std::io;
use std::path::PathBuf;

use seam_ssr_build::{BundleError, ConfigError, SynthError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Synth(#[from] SynthError),
  #[error(transparent)]
  Bundle(#[from] BundleError),
  #[error("failed to write {}: {source}", path.display())]
  Output {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("server bundle for {} is not valid UTF-8", .0.display())]
  NonUtf8Bundle(PathBuf),
  #[error("page {} has not been built", .0.display())]
  NotBuilt(PathBuf),
  #[error("page {} was requested more than once in one build", .0.display())]
  DuplicatePage(PathBuf),
  #[error("invalid ssr config: {0}")]
  InvalidConfig(String),
  #[error("failed to create scratch directory: {0}")]
  Scratch(#[source] io::Error),
}

impl PipelineError {
  /// Build diagnostics when the failure came from the bundler.
  pub fn build_errors(&self) -> &[seam_ssr_build::BuildError] {
    match self {
      Self::Bundle(e) => e.build_errors(),
      _ => &[],
    }
  }
}
