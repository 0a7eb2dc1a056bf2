/* src/cli/ssr-build/src/error.rs */

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::context::ContextId;
use crate::diagnostic::BuildError;

/// Fatal input problems. Surfaced immediately and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("page file not found: {}", .0.display())]
  PageNotFound(PathBuf),
  #[error("project root not found: {}", .0.display())]
  RootNotFound(PathBuf),
  #[error("{} is not a page file (expected page.tsx, page.jsx, page.ts or page.js)", .0.display())]
  NotAPage(PathBuf),
  #[error("page {} is outside project root {}", page.display(), root.display())]
  OutsideRoot { page: PathBuf, root: PathBuf },
}

#[derive(Debug, Error)]
pub enum SynthError {
  #[error("failed to write synthetic entrypoint {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("cannot import {} from generated code: path is not valid UTF-8", .0.display())]
  NonUtf8Path(PathBuf),
}

#[derive(Debug, Clone, Error)]
pub enum BundleError {
  #[error("{}", render_build_errors(.0))]
  Build(Vec<BuildError>),
  #[error("unknown bundle context {0}")]
  UnknownContext(ContextId),
  #[error("bundler backend failed: {0}")]
  Backend(String),
}

impl BundleError {
  pub fn build_errors(&self) -> &[BuildError] {
    match self {
      Self::Build(errors) => errors,
      _ => &[],
    }
  }
}

fn render_build_errors(errors: &[BuildError]) -> String {
  if errors.is_empty() {
    return "build failed without diagnostics".to_string();
  }
  errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}
