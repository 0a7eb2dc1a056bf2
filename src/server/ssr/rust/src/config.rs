/* src/server/ssr/rust/src/config.rs */

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use seam_ssr_build::{DEFAULT_DATA_ID, DEFAULT_REBUILD_CONCURRENCY, DEFAULT_ROOT_ID};
use seam_vm::{DEFAULT_MAX_HEAP_BYTES, EngineConfig};
use serde::Deserialize;

const MIB: usize = 1024 * 1024;

/// How long bundler contexts live.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextLifetime {
  /// Kept warm for the whole pipeline; rebuilds are incremental.
  #[default]
  Session,
  /// Disposed right after each build.
  OneShot,
}

impl ContextLifetime {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Session => "session",
      Self::OneShot => "one-shot",
    }
  }
}

/// The `[ssr]` section of `seam.toml`. Relative paths resolve against the
/// directory holding the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SsrConfig {
  #[serde(default = "default_root")]
  pub root: PathBuf,
  #[serde(default = "default_out_dir")]
  pub out_dir: PathBuf,
  #[serde(default = "default_node_modules")]
  pub node_modules: PathBuf,
  #[serde(default = "default_env")]
  pub env: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_soft_threshold_ms")]
  pub soft_threshold_ms: u64,
  #[serde(default = "default_load_timeout_ms")]
  pub load_timeout_ms: u64,
  /// V8 heap ceiling per render, in MiB.
  #[serde(default = "default_max_heap_mb")]
  pub max_heap_mb: usize,
  #[serde(default = "default_max_concurrent_renders")]
  pub max_concurrent_renders: usize,
  #[serde(default = "default_rebuild_concurrency")]
  pub rebuild_concurrency: usize,
  #[serde(default)]
  pub context_lifetime: ContextLifetime,
  pub live_reload_port: Option<u16>,
  /// `bun` or `node`; detected from PATH when unset.
  pub runtime: Option<String>,
  #[serde(default = "default_root_id")]
  pub root_id: String,
  #[serde(default = "default_data_id")]
  pub data_id: String,
  #[serde(skip)]
  pub base_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct SeamToml {
  #[serde(default)]
  ssr: Option<SsrConfig>,
}

fn default_root() -> PathBuf {
  PathBuf::from("src/client/pages")
}

fn default_out_dir() -> PathBuf {
  PathBuf::from(".seam/ssr")
}

fn default_node_modules() -> PathBuf {
  PathBuf::from("node_modules")
}

fn default_env() -> String {
  "development".to_string()
}

fn default_timeout_ms() -> u64 {
  1000
}

fn default_soft_threshold_ms() -> u64 {
  200
}

fn default_load_timeout_ms() -> u64 {
  5000
}

fn default_max_heap_mb() -> usize {
  DEFAULT_MAX_HEAP_BYTES / MIB
}

fn default_max_concurrent_renders() -> usize {
  std::thread::available_parallelism().map(usize::from).unwrap_or(4)
}

fn default_rebuild_concurrency() -> usize {
  DEFAULT_REBUILD_CONCURRENCY
}

fn default_root_id() -> String {
  DEFAULT_ROOT_ID.to_string()
}

fn default_data_id() -> String {
  DEFAULT_DATA_ID.to_string()
}

impl Default for SsrConfig {
  fn default() -> Self {
    Self {
      root: default_root(),
      out_dir: default_out_dir(),
      node_modules: default_node_modules(),
      env: default_env(),
      timeout_ms: default_timeout_ms(),
      soft_threshold_ms: default_soft_threshold_ms(),
      load_timeout_ms: default_load_timeout_ms(),
      max_heap_mb: default_max_heap_mb(),
      max_concurrent_renders: default_max_concurrent_renders(),
      rebuild_concurrency: default_rebuild_concurrency(),
      context_lifetime: ContextLifetime::default(),
      live_reload_port: None,
      runtime: None,
      root_id: default_root_id(),
      data_id: default_data_id(),
      base_dir: PathBuf::from("."),
    }
  }
}

impl SsrConfig {
  /// Defaults anchored at `base_dir`.
  pub fn at(base_dir: impl Into<PathBuf>) -> Self {
    Self { base_dir: base_dir.into(), ..Self::default() }
  }

  pub fn validate(&self) -> Result<()> {
    if self.timeout_ms == 0 {
      bail!("ssr.timeout_ms must be greater than 0");
    }
    if self.load_timeout_ms == 0 {
      bail!("ssr.load_timeout_ms must be greater than 0");
    }
    if self.soft_threshold_ms >= self.timeout_ms {
      bail!(
        "ssr.soft_threshold_ms ({}) must be less than ssr.timeout_ms ({})",
        self.soft_threshold_ms,
        self.timeout_ms
      );
    }
    if self.max_heap_mb == 0 {
      bail!("ssr.max_heap_mb must be greater than 0");
    }
    if self.max_concurrent_renders == 0 {
      bail!("ssr.max_concurrent_renders must be greater than 0");
    }
    if self.rebuild_concurrency == 0 {
      bail!("ssr.rebuild_concurrency must be greater than 0");
    }
    if let Some(ref rt) = self.runtime
      && rt != "bun"
      && rt != "node"
    {
      bail!("ssr.runtime must be \"bun\" or \"node\", got \"{rt}\"");
    }
    Ok(())
  }

  fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) }
  }

  pub fn root_dir(&self) -> PathBuf {
    self.resolve(&self.root)
  }

  pub fn out_dir_path(&self) -> PathBuf {
    self.resolve(&self.out_dir)
  }

  pub fn node_modules_path(&self) -> PathBuf {
    self.resolve(&self.node_modules)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      load_timeout: Duration::from_millis(self.load_timeout_ms),
      soft_threshold: Duration::from_millis(self.soft_threshold_ms),
      max_heap_bytes: self.max_heap_mb.saturating_mul(MIB),
      ..EngineConfig::default()
    }
  }
}

/// Walk upward from `start` to find `seam.toml`, like Cargo.toml discovery
pub fn find_seam_config(start: &Path) -> Result<PathBuf> {
  let mut dir =
    start.canonicalize().with_context(|| format!("failed to canonicalize {}", start.display()))?;
  loop {
    let candidate = dir.join("seam.toml");
    if candidate.is_file() {
      return Ok(candidate);
    }
    if !dir.pop() {
      bail!("seam.toml not found (searched upward from {})", start.display());
    }
  }
}

/// Parse the `[ssr]` section; a missing section yields defaults.
pub fn parse_ssr_config(content: &str, base_dir: &Path) -> Result<SsrConfig> {
  let file: SeamToml = toml::from_str(content).context("invalid [ssr] section")?;
  let mut config = file.ssr.unwrap_or_default();
  config.base_dir = base_dir.to_path_buf();
  config.validate()?;
  Ok(config)
}

pub fn load_ssr_config(path: &Path) -> Result<SsrConfig> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
  parse_ssr_config(&content, &base_dir).with_context(|| format!("failed to parse {}", path.display()))
}
