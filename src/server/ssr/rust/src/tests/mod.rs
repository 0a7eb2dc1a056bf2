/* src/server/ssr/rust/src/tests/mod.rs */

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use seam_ssr_build::{BackendHandle, BuildError, BuildTarget, BundleError, BundleOutput, Bundler, Target};
use tempfile::TempDir;

use crate::config::{ContextLifetime, SsrConfig};
use crate::pipeline::SsrPipeline;


/// Stands in for esbuild by reading the synthesized entrypoint and the files
/// it imports. Layouts carry `// wrap: NAME`, pages may carry `// throw` or
/// `// loop`, and any file containing `SYNTAX` fails to build.
#[derive(Default)]
struct FakeBundler {
  next: AtomicU64,
  /// Refuse to create server-target contexts.
  reject_server: AtomicBool,
  targets: Mutex<HashMap<u64, BuildTarget>>,
  disposed: Mutex<HashSet<u64>>,
}

impl FakeBundler {
  fn live(&self) -> usize {
    self.targets.lock().unwrap().len()
  }
}

/// Import specifiers of an entrypoint, in order, skipping packages.
fn local_imports(entry: &str) -> Vec<String> {
  entry
    .lines()
    .filter_map(|line| line.strip_prefix("import ")?.split(" from ").nth(1))
    .filter_map(|spec| serde_json::from_str::<String>(spec.trim_end_matches(';')).ok())
    .filter(|spec| spec.starts_with('.') || spec.starts_with('/'))
    .collect()
}

fn js(value: &str) -> String {
  serde_json::Value::String(value.to_string()).to_string()
}

impl Bundler for FakeBundler {
  fn create(&self, target: &BuildTarget) -> Result<BackendHandle, BundleError> {
    if target.target == Target::Server && self.reject_server.load(Ordering::SeqCst) {
      return Err(BundleError::Backend("server context refused".into()));
    }
    let h = self.next.fetch_add(1, Ordering::SeqCst) + 1;
    self.targets.lock().unwrap().insert(h, target.clone());
    Ok(BackendHandle(h))
  }

  fn rebuild(&self, handle: BackendHandle) -> Result<BundleOutput, BundleError> {
    let target = self
      .targets
      .lock()
      .unwrap()
      .get(&handle.0)
      .cloned()
      .ok_or_else(|| BundleError::Backend(format!("unknown handle {handle}")))?;
    let entry = std::fs::read_to_string(&target.entrypoint).unwrap();
    let entry_dir = target.entrypoint.parent().unwrap();
    let specs = local_imports(&entry);
    let (page_spec, layout_specs) = specs.split_last().unwrap();

    let mut open = String::new();
    let mut close = String::new();
    for spec in layout_specs {
      let text = std::fs::read_to_string(entry_dir.join(spec)).unwrap();
      if let Some(name) = text.lines().find_map(|l| l.strip_prefix("// wrap: ")) {
        open.push_str(&format!("<div data-wrap=\"{name}\">"));
        close.push_str("</div>");
      }
    }
    let page_file = entry_dir.join(page_spec);
    let page = std::fs::read_to_string(&page_file).unwrap();
    if page.contains("SYNTAX") {
      return Err(BundleError::Build(vec![BuildError {
        message: "Unexpected \"SYNTAX\"".into(),
        file: page_file.display().to_string(),
        line: 1,
        column: 1,
        line_text: page.lines().next().unwrap_or_default().to_string(),
        span: 6,
        suggestion: None,
      }]));
    }

    let code = match target.target {
      Target::Client => format!("/* hydrate {page_spec} */"),
      Target::Server => {
        let body = if page.contains("// throw") {
          "throw new Error(\"page exploded\");".to_string()
        } else if page.contains("// loop") {
          "while (true) {}".to_string()
        } else {
          format!("return {} + \"<p>\" + (data.title ?? \"untitled\") + \"</p>\" + {};", js(&open), js(&close))
        };
        format!("var __SEAM_SSR__ = (() => {{ function render(data) {{ {body} }} return {{ render }}; }})();")
      }
    };
    let map = serde_json::json!({
      "version": 3,
      "sources": [page_spec],
      "names": [],
      "mappings": "AAAA",
    });
    Ok(BundleOutput { code: code.into_bytes(), source_map: Some(map.to_string().into_bytes()) })
  }

  fn dispose(&self, handle: BackendHandle) {
    self.targets.lock().unwrap().remove(&handle.0);
    self.disposed.lock().unwrap().insert(handle.0);
  }
}

/// Project with `src/client/pages/app/{layout,home/layout,home/page,about/page}.tsx`.
struct Fixture {
  tmp: TempDir,
  bundler: Arc<FakeBundler>,
}

impl Fixture {
  fn new() -> Self {
    let fx = Self { tmp: tempfile::tempdir().unwrap(), bundler: Arc::new(FakeBundler::default()) };
    fx.write("app/layout.tsx", "// wrap: app\nexport default ({ children }) => <div>{children}</div>;\n");
    fx.write("app/home/layout.tsx", "// wrap: home\nexport default ({ children }) => children;\n");
    fx.write("app/home/page.tsx", "export default ({ title }) => <p>{title}</p>;\n");
    fx.write("app/about/page.tsx", "export default () => <p>about</p>;\n");
    fx
  }

  fn base(&self) -> &Path {
    self.tmp.path()
  }

  fn page(&self, rel: &str) -> PathBuf {
    self.base().join("src/client/pages").join(rel)
  }

  fn write(&self, rel: &str, content: &str) {
    let path = self.page(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  fn config(&self, lifetime: ContextLifetime) -> SsrConfig {
    SsrConfig { context_lifetime: lifetime, ..SsrConfig::at(self.base()) }
  }

  fn pipeline(&self) -> SsrPipeline {
    self.pipeline_with(self.config(ContextLifetime::Session))
  }

  fn pipeline_with(&self, config: SsrConfig) -> SsrPipeline {
    SsrPipeline::new(config, self.bundler.clone()).unwrap()
  }
}
