/* src/server/ssr/rust/src/pipeline.rs */

// Page in, HTML out: layouts are resolved, both entrypoints synthesized and
// bundled through warm contexts, then renders run on the isolate pool.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use seam_sourcemap::Translator;
use seam_ssr_build::{
  BundleContextManager, BundleError, Bundler, CompiledArtifact, ConfigError, ContextId,
  EsbuildService, PageUnit, RebuildResult, ServiceOptions, Synthesizer, Target,
};
use seam_vm::{Engine, RenderPool, RenderReport, RenderRequest};
use tempfile::TempDir;

use crate::config::{ContextLifetime, SsrConfig};
use crate::error::PipelineError;

/// Everything produced for one page by a successful build.
#[derive(Debug)]
pub struct PageBuild {
  pub page: PathBuf,
  /// Outermost first.
  pub layouts: Vec<PathBuf>,
  pub client_entry: PathBuf,
  pub server_entry: PathBuf,
  pub client: Arc<CompiledArtifact>,
  pub server: Arc<CompiledArtifact>,
  pub client_path: PathBuf,
  pub server_path: PathBuf,
  /// Server bundle text handed to every render of this page.
  pub bundle: Arc<str>,
  /// `None` when the bundler produced no usable source map.
  pub translator: Option<Arc<Translator>>,
}

enum Scratch {
  Stable(PathBuf),
  Temp(TempDir),
}

impl Scratch {
  fn path(&self) -> &Path {
    match self {
      Self::Stable(p) => p,
      Self::Temp(t) => t.path(),
    }
  }
}

struct Prepared {
  unit: PageUnit,
  client_entry: PathBuf,
  server_entry: PathBuf,
  client_id: ContextId,
  server_id: ContextId,
}

pub struct SsrPipeline {
  config: SsrConfig,
  root: PathBuf,
  out_dir: PathBuf,
  node_modules: PathBuf,
  synth: Synthesizer,
  contexts: BundleContextManager,
  scratch: Scratch,
  pool: RenderPool,
  builds: Mutex<HashMap<PathBuf, Arc<PageBuild>>>,
}

impl SsrPipeline {
  pub fn new(config: SsrConfig, bundler: Arc<dyn Bundler>) -> Result<Self, PipelineError> {
    config.validate().map_err(|e| PipelineError::InvalidConfig(format!("{e:#}")))?;

    let root_dir = config.root_dir();
    let root = root_dir.canonicalize().map_err(|_| ConfigError::RootNotFound(root_dir))?;
    let out_dir = config.out_dir_path();
    std::fs::create_dir_all(&out_dir)
      .map_err(|source| PipelineError::Output { path: out_dir.clone(), source })?;
    let out_dir = out_dir.canonicalize().unwrap_or(out_dir);

    let scratch = match config.context_lifetime {
      ContextLifetime::Session => Scratch::Stable(out_dir.join("entries")),
      ContextLifetime::OneShot => Scratch::Temp(
        tempfile::Builder::new().prefix("seam-ssr-").tempdir().map_err(PipelineError::Scratch)?,
      ),
    };

    let synth = Synthesizer::new(&root).with_ids(&config.root_id, &config.data_id);
    let contexts = BundleContextManager::with_concurrency(bundler, config.rebuild_concurrency);
    let pool = RenderPool::new(Engine::new(config.engine_config()), config.max_concurrent_renders);

    tracing::info!(
      root = %root.display(),
      out_dir = %out_dir.display(),
      lifetime = config.context_lifetime.as_str(),
      renders = pool.max_concurrent(),
      "ssr pipeline ready"
    );
    Ok(Self {
      node_modules: config.node_modules_path(),
      config,
      root,
      out_dir,
      synth,
      contexts,
      scratch,
      pool,
      builds: Mutex::new(HashMap::new()),
    })
  }

  /// Pipeline backed by a real esbuild child process.
  pub fn with_esbuild(config: SsrConfig) -> Result<Self, PipelineError> {
    let options = ServiceOptions {
      project_root: config.base_dir.clone(),
      node_modules: config.node_modules_path(),
      scratch_dir: config.out_dir_path(),
      runtime: config.runtime.clone(),
    };
    let service = EsbuildService::spawn(&options)?;
    Self::new(config, Arc::new(service))
  }

  pub fn config(&self) -> &SsrConfig {
    &self.config
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn out_dir(&self) -> &Path {
    &self.out_dir
  }

  pub fn scratch_dir(&self) -> &Path {
    self.scratch.path()
  }

  pub fn contexts(&self) -> &BundleContextManager {
    &self.contexts
  }

  pub fn pool(&self) -> &RenderPool {
    &self.pool
  }

  fn builds(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<PageBuild>>> {
    self.builds.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Last successful build of `page`, if any.
  pub fn page_build(&self, page: &Path) -> Option<Arc<PageBuild>> {
    self.builds().get(&cache_key(page)).cloned()
  }

  pub fn build_page(&self, page: &Path) -> Result<Arc<PageBuild>, PipelineError> {
    let mut results = self.build_pages(&[page.to_path_buf()]);
    match results.pop() {
      Some((_, result)) => result,
      None => Err(PipelineError::NotBuilt(page.to_path_buf())),
    }
  }

  /// Build several pages with a single bounded `rebuild_many`. Results keep
  /// input order; one page failing leaves the others untouched.
  pub fn build_pages(&self, pages: &[PathBuf]) -> Vec<(PathBuf, Result<Arc<PageBuild>, PipelineError>)> {
    let started = Instant::now();
    let mut seen = HashSet::new();
    let prepared: Vec<Result<Prepared, PipelineError>> = pages
      .iter()
      .map(|page| {
        let prep = self.prepare(page)?;
        if !seen.insert(prep.unit.path.clone()) {
          return Err(PipelineError::DuplicatePage(page.clone()));
        }
        Ok(prep)
      })
      .collect();

    let ids: Vec<ContextId> =
      prepared.iter().flatten().flat_map(|p| [p.client_id, p.server_id]).collect();
    let mut rebuilt: HashMap<ContextId, RebuildResult> = self.contexts.rebuild_many(&ids).into_iter().collect();

    let results: Vec<_> = pages
      .iter()
      .zip(prepared)
      .map(|(page, prep)| {
        let result = prep.and_then(|prep| {
          let client = take(&mut rebuilt, prep.client_id);
          let server = take(&mut rebuilt, prep.server_id);
          if self.config.context_lifetime == ContextLifetime::OneShot {
            self.contexts.dispose(prep.client_id);
            self.contexts.dispose(prep.server_id);
          }
          self.finish(prep, client?, server?)
        });
        if let Err(ref e) = result {
          tracing::error!(page = %page.display(), "ssr build failed: {e}");
        }
        (page.clone(), result)
      })
      .collect();

    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    tracing::info!(
      pages = results.len(),
      ok,
      failed = results.len() - ok,
      elapsed_ms = millis(started.elapsed()),
      "ssr build finished"
    );
    results
  }

  fn prepare(&self, page: &Path) -> Result<Prepared, PipelineError> {
    let unit = PageUnit::resolve(page, &self.root)?;
    let layouts = unit.layout_paths();
    let scratch = self.scratch.path();
    let client_entry = self.synth.synthesize(&unit.path, &layouts, scratch, Target::Client)?;
    let server_entry = self.synth.synthesize(&unit.path, &layouts, scratch, Target::Server)?;

    let env = &self.config.env;
    let port = self.config.live_reload_port;
    let client_id = self.contexts.create_context(&client_entry, &self.node_modules, env, port, false)?;
    let server_id = match self.contexts.create_context(&server_entry, &self.node_modules, env, port, true) {
      Ok(id) => id,
      Err(e) => {
        if self.config.context_lifetime == ContextLifetime::OneShot {
          self.contexts.dispose(client_id);
        }
        return Err(e.into());
      }
    };
    Ok(Prepared { unit, client_entry, server_entry, client_id, server_id })
  }

  fn finish(
    &self,
    prep: Prepared,
    client: Arc<CompiledArtifact>,
    server: Arc<CompiledArtifact>,
  ) -> Result<Arc<PageBuild>, PipelineError> {
    let client_path = self.write_artifact(&client)?;
    let server_path = self.write_artifact(&server)?;

    let code = server.code_str().ok_or_else(|| PipelineError::NonUtf8Bundle(prep.unit.path.clone()))?;
    let bundle: Arc<str> = Arc::from(code);
    let translator = server.source_map.as_deref().and_then(|map| {
      // esbuild writes `sources` relative to the entrypoint's directory
      let map_dir = prep.server_entry.parent().unwrap_or(self.out_dir.as_path());
      match Translator::parse_at(map, map_dir) {
        Ok(t) => Some(Arc::new(t)),
        Err(e) => {
          tracing::warn!(page = %prep.unit.path.display(), "ignoring unreadable server source map: {e}");
          None
        }
      }
    });

    tracing::info!(
      page = %prep.unit.path.display(),
      layouts = prep.unit.layouts.len(),
      client_ms = millis(client.duration),
      server_ms = millis(server.duration),
      generation = server.generation,
      "built page"
    );

    let build = Arc::new(PageBuild {
      layouts: prep.unit.layout_paths(),
      page: prep.unit.path,
      client_entry: prep.client_entry,
      server_entry: prep.server_entry,
      client,
      server,
      client_path,
      server_path,
      bundle,
      translator,
    });
    self.builds().insert(build.page.clone(), Arc::clone(&build));
    Ok(build)
  }

  /// `<out_dir>/<client|server>/<stem>.js`, plus `.js.map` when present.
  fn write_artifact(&self, artifact: &CompiledArtifact) -> Result<PathBuf, PipelineError> {
    let dir = self.out_dir.join(artifact.target.as_str());
    std::fs::create_dir_all(&dir).map_err(|source| PipelineError::Output { path: dir.clone(), source })?;

    // `home-1a2b3c4d.server.jsx` -> `home-1a2b3c4d`
    let stem = artifact
      .entrypoint
      .file_stem()
      .map(Path::new)
      .and_then(Path::file_stem)
      .and_then(|s| s.to_str())
      .unwrap_or("page");
    let path = dir.join(format!("{stem}.js"));
    write(&path, &artifact.code)?;
    if let Some(ref map) = artifact.source_map {
      write(&dir.join(format!("{stem}.js.map")), map)?;
    }
    Ok(path)
  }

  fn request(&self, page: &Path, data: serde_json::Value) -> Result<RenderRequest, PipelineError> {
    let build = self.page_build(page).ok_or_else(|| PipelineError::NotBuilt(page.to_path_buf()))?;
    let mut request = RenderRequest::new(Arc::clone(&build.bundle), data).with_timeout(self.config.timeout());
    if let Some(ref translator) = build.translator {
      request = request.with_translator(Arc::clone(translator));
    }
    Ok(request)
  }

  /// Render a built page. Only a missing build is an error; timeouts and
  /// exceptions come back inside the report.
  pub async fn render(&self, page: &Path, data: serde_json::Value) -> Result<RenderReport, PipelineError> {
    let request = self.request(page, data)?;
    Ok(self.pool.render(request).await)
  }

  /// [`Self::render`] for callers without a runtime. Bypasses the pool's
  /// concurrency bound.
  pub fn render_blocking(&self, page: &Path, data: serde_json::Value) -> Result<RenderReport, PipelineError> {
    let request = self.request(page, data)?;
    Ok(self.pool.engine().render(&request))
  }

  /// Forget `page`'s build and dispose its contexts. Returns whether a build
  /// was cached.
  pub fn invalidate(&self, page: &Path) -> bool {
    let Some(build) = self.builds().remove(&cache_key(page)) else {
      return false;
    };
    for entry in [&build.client_entry, &build.server_entry] {
      if let Some(id) = self.contexts.context_for(entry) {
        self.contexts.dispose(id);
      }
    }
    tracing::debug!(page = %build.page.display(), "invalidated page build");
    true
  }
}

pub(crate) fn millis(d: Duration) -> u64 {
  u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn cache_key(page: &Path) -> PathBuf {
  page.canonicalize().unwrap_or_else(|_| page.to_path_buf())
}

fn take(rebuilt: &mut HashMap<ContextId, RebuildResult>, id: ContextId) -> RebuildResult {
  rebuilt.remove(&id).unwrap_or(Err(BundleError::UnknownContext(id)))
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
  std::fs::write(path, bytes).map_err(|source| PipelineError::Output { path: path.to_path_buf(), source })
}
