/* src/cli/ssr-build/src/layout.rs */

// Layout chain discovery: a page picks up every `layout.*` file found in its
// own directory and each ancestor up to the project root.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Recognized component extensions, in lookup priority order.
pub const COMPONENT_EXTENSIONS: [&str; 4] = ["tsx", "jsx", "ts", "js"];

const PAGE_STEM: &str = "page";
const LAYOUT_STEM: &str = "layout";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutUnit {
  pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUnit {
  pub path: PathBuf,
  /// Outermost first.
  pub layouts: Vec<LayoutUnit>,
}

impl PageUnit {
  pub fn resolve(page_path: &Path, project_root: &Path) -> Result<Self, ConfigError> {
    let path = canonical_page(page_path)?;
    let layouts = resolve(&path, project_root)?;
    Ok(Self { path, layouts })
  }

  pub fn layout_paths(&self) -> Vec<PathBuf> {
    self.layouts.iter().map(|l| l.path.clone()).collect()
  }
}

pub fn is_page_file(path: &Path) -> bool {
  matches_convention(path, PAGE_STEM)
}

fn matches_convention(path: &Path, stem: &str) -> bool {
  let stem_ok = path.file_stem().and_then(|s| s.to_str()) == Some(stem);
  let ext_ok = path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| COMPONENT_EXTENSIONS.contains(&e));
  stem_ok && ext_ok
}

fn canonical_page(page_path: &Path) -> Result<PathBuf, ConfigError> {
  if !is_page_file(page_path) {
    return Err(ConfigError::NotAPage(page_path.to_path_buf()));
  }
  page_path.canonicalize().map_err(|_| ConfigError::PageNotFound(page_path.to_path_buf()))
}

/// Layout file directly inside `dir`, first extension in priority order.
fn layout_in(dir: &Path) -> Option<PathBuf> {
  COMPONENT_EXTENSIONS
    .iter()
    .map(|ext| dir.join(format!("{LAYOUT_STEM}.{ext}")))
    .find(|candidate| candidate.is_file())
}

/// Resolve the layout chain of `page_path`, outermost first.
///
/// Both paths are canonicalized first, so a page reached through a symlink
/// resolves against the real directory tree.
pub fn resolve(page_path: &Path, project_root: &Path) -> Result<Vec<LayoutUnit>, ConfigError> {
  let page = canonical_page(page_path)?;
  let root = project_root
    .canonicalize()
    .map_err(|_| ConfigError::RootNotFound(project_root.to_path_buf()))?;

  if !page.starts_with(&root) {
    return Err(ConfigError::OutsideRoot { page, root });
  }

  let mut found = Vec::new();
  let mut dir = page.parent();
  while let Some(current) = dir {
    if let Some(path) = layout_in(current) {
      let path = path.canonicalize().unwrap_or(path);
      found.push(LayoutUnit { path });
    }
    if current == root {
      break;
    }
    dir = current.parent();
  }

  found.reverse();
  Ok(found)
}
