/* src/server/sourcemap/rust/src/error.rs */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceMapError {
  #[error("source map is not valid JSON: {0}")]
  Json(String),
  #[error("unsupported source map version {0} (expected 3)")]
  UnsupportedVersion(u32),
  #[error("indexed source maps (sections) are not supported")]
  IndexMap,
  #[error("invalid mappings at generated line {line}: {reason}")]
  Mappings { line: usize, reason: String },
}
