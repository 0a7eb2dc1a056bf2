/* src/cli/ssr-build/src/context/mod.rs */

// Registry of live bundler contexts keyed by synthetic entrypoint path.
// One mutex guards the registry; bundling always runs outside it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::bundler::{BackendHandle, Bundler};
use crate::error::BundleError;
use crate::target::{BuildTarget, Target};

pub const DEFAULT_REBUILD_CONCURRENCY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Output of one successful rebuild. Never mutated; a later rebuild yields
/// a new artifact with a higher generation.
#[derive(Debug)]
pub struct CompiledArtifact {
  pub context: ContextId,
  pub entrypoint: PathBuf,
  pub target: Target,
  pub generation: u64,
  pub code: Vec<u8>,
  pub source_map: Option<Vec<u8>>,
  pub duration: Duration,
}

impl CompiledArtifact {
  pub fn code_str(&self) -> Option<&str> {
    std::str::from_utf8(&self.code).ok()
  }
}

pub type RebuildResult = Result<Arc<CompiledArtifact>, BundleError>;

struct ContextEntry {
  handle: BackendHandle,
  build: BuildTarget,
  generation: u64,
  latest: Option<Arc<CompiledArtifact>>,
}

#[derive(Default)]
struct Registry {
  next_id: u64,
  by_path: HashMap<PathBuf, ContextId>,
  contexts: HashMap<ContextId, ContextEntry>,
}

pub struct BundleContextManager {
  bundler: Arc<dyn Bundler>,
  registry: Mutex<Registry>,
  concurrency: usize,
  /// Runs `rebuild_many`; `None` if the pool could not be started, in which
  /// case rebuilds run one by one on the caller.
  pool: Option<ThreadPool>,
}

impl BundleContextManager {
  pub fn new(bundler: Arc<dyn Bundler>) -> Self {
    Self::with_concurrency(bundler, DEFAULT_REBUILD_CONCURRENCY)
  }

  /// `concurrency` caps parallel rebuilds in [`Self::rebuild_many`]; 0 is
  /// treated as 1.
  pub fn with_concurrency(bundler: Arc<dyn Bundler>, concurrency: usize) -> Self {
    let concurrency = concurrency.max(1);
    let pool = ThreadPoolBuilder::new()
      .num_threads(concurrency)
      .thread_name(|i| format!("seam-rebuild-{i}"))
      .build()
      .inspect_err(|e| tracing::warn!("rebuild pool unavailable, rebuilding sequentially: {e}"))
      .ok();
    Self { bundler, registry: Mutex::new(Registry::default()), concurrency, pool }
  }

  pub fn concurrency(&self) -> usize {
    self.concurrency
  }

  fn registry(&self) -> MutexGuard<'_, Registry> {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Idempotent by entrypoint path. Racing creators for the same path all
  /// get the first registered id; the surplus backend contexts are disposed.
  pub fn create_context(
    &self,
    entrypoint: &Path,
    node_modules: &Path,
    env: &str,
    live_reload_port: Option<u16>,
    is_server: bool,
  ) -> Result<ContextId, BundleError> {
    let key = entrypoint.canonicalize().unwrap_or_else(|_| entrypoint.to_path_buf());
    if let Some(id) = self.registry().by_path.get(&key) {
      return Ok(*id);
    }

    let build = BuildTarget::new(&key, node_modules, env, live_reload_port, is_server);
    let handle = self.bundler.create(&build)?;

    let mut reg = self.registry();
    if let Some(&id) = reg.by_path.get(&key) {
      drop(reg);
      self.bundler.dispose(handle);
      return Ok(id);
    }
    reg.next_id += 1;
    let id = ContextId(reg.next_id);
    reg.by_path.insert(key.clone(), id);
    reg.contexts.insert(id, ContextEntry { handle, build, generation: 0, latest: None });
    drop(reg);

    tracing::debug!(context = %id, %handle, entry = %key.display(), server = is_server, "created bundle context");
    Ok(id)
  }

  /// The generation is taken when the rebuild starts, so a slow rebuild
  /// that finishes after a newer one never replaces the newer artifact.
  pub fn rebuild(&self, id: ContextId) -> RebuildResult {
    let (handle, entrypoint, target, generation) = {
      let mut reg = self.registry();
      let entry = reg.contexts.get_mut(&id).ok_or(BundleError::UnknownContext(id))?;
      entry.generation += 1;
      (entry.handle, entry.build.entrypoint.clone(), entry.build.target, entry.generation)
    };

    let started = Instant::now();
    let output = self.bundler.rebuild(handle);
    let duration = started.elapsed();

    let output = match output {
      Ok(output) => output,
      Err(e) => {
        tracing::warn!(
          context = %id,
          entry = %entrypoint.display(),
          errors = e.build_errors().len(),
          "rebuild failed in {}ms",
          duration.as_millis()
        );
        return Err(e);
      }
    };

    let artifact = Arc::new(CompiledArtifact {
      context: id,
      entrypoint,
      target,
      generation,
      code: output.code,
      source_map: output.source_map,
      duration,
    });
    {
      let mut reg = self.registry();
      // disposed while the rebuild was running
      let entry = reg.contexts.get_mut(&id).ok_or(BundleError::UnknownContext(id))?;
      if entry.latest.as_ref().is_none_or(|latest| latest.generation < generation) {
        entry.latest = Some(Arc::clone(&artifact));
      }
    }

    tracing::debug!(
      context = %id,
      generation,
      bytes = artifact.code.len(),
      "rebuilt in {}ms",
      duration.as_millis()
    );
    Ok(artifact)
  }

  fn rebuild_isolated(&self, id: ContextId) -> RebuildResult {
    catch_unwind(AssertUnwindSafe(|| self.rebuild(id)))
      .unwrap_or_else(|_| Err(BundleError::Backend(format!("bundler panicked rebuilding context {id}"))))
  }

  /// Rebuild every id in parallel, at most `concurrency` at a time. Results
  /// come back in input order and one failure never affects the others. A
  /// repeated id is rebuilt once and shares its result.
  pub fn rebuild_many(&self, ids: &[ContextId]) -> Vec<(ContextId, RebuildResult)> {
    if ids.is_empty() {
      return Vec::new();
    }
    let mut seen = HashSet::new();
    let unique: Vec<ContextId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

    let done: HashMap<ContextId, RebuildResult> = match self.pool {
      Some(ref pool) => {
        pool.install(|| unique.par_iter().map(|&id| (id, self.rebuild_isolated(id))).collect())
      }
      None => unique.iter().map(|&id| (id, self.rebuild_isolated(id))).collect(),
    };

    ids
      .iter()
      .map(|&id| {
        let result = done
          .get(&id)
          .cloned()
          .unwrap_or_else(|| Err(BundleError::Backend(format!("context {id} was never rebuilt"))));
        (id, result)
      })
      .collect()
  }

  /// Unknown ids are a logged no-op.
  pub fn dispose(&self, id: ContextId) {
    let removed = {
      let mut reg = self.registry();
      let entry = reg.contexts.remove(&id);
      if let Some(ref e) = entry {
        reg.by_path.remove(&e.build.entrypoint);
      }
      entry
    };
    match removed {
      Some(entry) => {
        self.bundler.dispose(entry.handle);
        tracing::debug!(context = %id, entry = %entry.build.entrypoint.display(), "disposed bundle context");
      }
      None => tracing::warn!(context = %id, "dispose of unknown bundle context"),
    }
  }

  pub fn dispose_all(&self) {
    let drained: Vec<ContextEntry> = {
      let mut reg = self.registry();
      reg.by_path.clear();
      reg.contexts.drain().map(|(_, e)| e).collect()
    };
    for entry in drained {
      self.bundler.dispose(entry.handle);
    }
  }

  /// Last successful artifact of `id`.
  pub fn latest(&self, id: ContextId) -> Option<Arc<CompiledArtifact>> {
    self.registry().contexts.get(&id).and_then(|e| e.latest.clone())
  }

  pub fn context_for(&self, entrypoint: &Path) -> Option<ContextId> {
    let key = entrypoint.canonicalize().unwrap_or_else(|_| entrypoint.to_path_buf());
    self.registry().by_path.get(&key).copied()
  }

  pub fn build_target(&self, id: ContextId) -> Option<BuildTarget> {
    self.registry().contexts.get(&id).map(|e| e.build.clone())
  }

  pub fn len(&self) -> usize {
    self.registry().contexts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Drop for BundleContextManager {
  fn drop(&mut self) {
    self.dispose_all();
  }
}
