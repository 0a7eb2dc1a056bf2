/* src/cli/ssr-build/src/entrypoint.rs */

// Synthetic entrypoints: a generated module per page and target that imports
// the layout chain plus the page and nests them into one component tree.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use crate::error::SynthError;
use crate::fnv::path_hash;
use crate::target::Target;

pub const DEFAULT_ROOT_ID: &str = "__seam";
pub const DEFAULT_DATA_ID: &str = "__SEAM_DATA__";

const HEADER: &str = "// Generated by seam. Do not edit.\n";

/// Generated source plus the import specifiers it references, in emission
/// order (layouts outermost first, then the page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticEntrypoint {
  pub target: Target,
  pub source: String,
  pub imports: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Synthesizer {
  project_root: PathBuf,
  root_id: String,
  data_id: String,
}

impl Synthesizer {
  pub fn new(project_root: impl Into<PathBuf>) -> Self {
    let project_root = project_root.into();
    let project_root = project_root.canonicalize().unwrap_or(project_root);
    Self { project_root, root_id: DEFAULT_ROOT_ID.to_string(), data_id: DEFAULT_DATA_ID.to_string() }
  }

  pub fn with_ids(mut self, root_id: impl Into<String>, data_id: impl Into<String>) -> Self {
    self.root_id = root_id.into();
    self.data_id = data_id.into();
    self
  }

  /// Output file name for `page` and `target`:
  /// `<relative-path-with-dashes>-<fnv8>.<client|server>.jsx`.
  pub fn file_name(&self, page: &Path, target: Target) -> String {
    let rel = page.strip_prefix(&self.project_root).unwrap_or(page);
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    let without_ext = rel.with_extension("");
    let stem = without_ext
      .components()
      .filter_map(|c| match c {
        Component::Normal(s) => Some(sanitize(&s.to_string_lossy())),
        _ => None,
      })
      .collect::<Vec<_>>()
      .join("-");
    let stem = if stem.is_empty() { "page".to_string() } else { stem };
    format!("{stem}-{}.{}.jsx", path_hash(Path::new(&rel_str)), target.as_str())
  }

  /// Write the entrypoint for `page` into `output_dir`, returning its path.
  /// Content that already matches on disk is left untouched.
  pub fn synthesize(
    &self,
    page_path: &Path,
    layout_paths: &[PathBuf],
    output_dir: &Path,
    target: Target,
  ) -> Result<PathBuf, SynthError> {
    std::fs::create_dir_all(output_dir)
      .map_err(|source| SynthError::Io { path: output_dir.to_path_buf(), source })?;
    let out_dir = output_dir.canonicalize().unwrap_or_else(|_| output_dir.to_path_buf());

    let layout_imports = layout_paths
      .iter()
      .map(|layout| import_specifier(&out_dir, layout))
      .collect::<Result<Vec<_>, _>>()?;
    let page_import = import_specifier(&out_dir, page_path)?;

    let entry = self.synthesize_source(&page_import, &layout_imports, target);
    let path = out_dir.join(self.file_name(page_path, target));
    let written = write_if_changed(&path, &entry.source)?;
    tracing::debug!(
      page = %page_path.display(),
      entry = %path.display(),
      target = target.as_str(),
      layouts = layout_paths.len(),
      written,
      "synthesized entrypoint"
    );
    Ok(path)
  }

  /// Generate the entrypoint text from already-relative import specifiers.
  pub fn synthesize_source(
    &self,
    page_import: &str,
    layout_imports: &[String],
    target: Target,
  ) -> SyntheticEntrypoint {
    let mut out = String::from(HEADER);
    match target {
      Target::Client => out.push_str("import { hydrateRoot } from \"react-dom/client\";\n"),
      Target::Server => out.push_str("import { renderToString } from \"react-dom/server\";\n"),
    }
    for (i, spec) in layout_imports.iter().enumerate() {
      let _ = writeln!(out, "import Layout{i} from {};", js_string(spec));
    }
    let _ = writeln!(out, "import Page from {};", js_string(page_import));

    out.push_str("\nfunction SeamPage({ data }) {\n  return (\n");
    out.push_str(&compose_tree(layout_imports.len(), 4));
    out.push_str("  );\n}\n\n");

    match target {
      Target::Client => {
        let _ = writeln!(out, "const dataEl = document.getElementById({});", js_string(&self.data_id));
        out.push_str("const data = dataEl ? JSON.parse(dataEl.textContent || \"{}\") : {};\n");
        let _ = writeln!(
          out,
          "hydrateRoot(document.getElementById({}), <SeamPage data={{data}} />);",
          js_string(&self.root_id)
        );
      }
      Target::Server => {
        out.push_str("export function render(data) {\n");
        out.push_str("  return renderToString(<SeamPage data={data ?? {}} />);\n");
        out.push_str("}\n");
      }
    }

    let mut imports = layout_imports.to_vec();
    imports.push(page_import.to_string());
    SyntheticEntrypoint { target, source: out, imports }
  }
}

/// Nested JSX: `Layout0` outermost, the page innermost.
fn compose_tree(layouts: usize, indent: usize) -> String {
  let mut out = String::new();
  for i in 0..layouts {
    let pad = " ".repeat(indent + i * 2);
    let _ = writeln!(out, "{pad}<Layout{i} {{...data}}>");
  }
  let _ = writeln!(out, "{}<Page {{...data}} />", " ".repeat(indent + layouts * 2));
  for i in (0..layouts).rev() {
    let pad = " ".repeat(indent + i * 2);
    let _ = writeln!(out, "{pad}</Layout{i}>");
  }
  out
}

fn sanitize(segment: &str) -> String {
  segment
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
    .collect()
}

fn js_string(value: &str) -> String {
  serde_json::Value::String(value.to_string()).to_string()
}

/// Relative import from `from_dir` to `target`, always `./` or `../` prefixed
/// with forward slashes. Paths sharing no prefix fall back to absolute.
fn import_specifier(from_dir: &Path, target: &Path) -> Result<String, SynthError> {
  let target_abs = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
  if target_abs.to_str().is_none() {
    return Err(SynthError::NonUtf8Path(target.to_path_buf()));
  }

  let from: Vec<Component<'_>> = from_dir.components().collect();
  let to: Vec<Component<'_>> = target_abs.components().collect();
  let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

  if common == 0 {
    return Ok(target_abs.to_string_lossy().replace('\\', "/"));
  }

  let mut parts: Vec<String> = Vec::new();
  for _ in common..from.len() {
    parts.push("..".to_string());
  }
  for c in &to[common..] {
    parts.push(c.as_os_str().to_string_lossy().into_owned());
  }
  let joined = parts.join("/");
  if joined.starts_with("..") { Ok(joined) } else { Ok(format!("./{joined}")) }
}

/// Returns whether the file was (re)written.
fn write_if_changed(path: &Path, content: &str) -> Result<bool, SynthError> {
  if std::fs::read_to_string(path).is_ok_and(|existing| existing == content) {
    return Ok(false);
  }
  std::fs::write(path, content).map_err(|source| SynthError::Io { path: path.to_path_buf(), source })?;
  Ok(true)
}
