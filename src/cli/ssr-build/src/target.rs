/* src/cli/ssr-build/src/target.rs */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Global the server bundle assigns its exports to.
pub const SERVER_GLOBAL_NAME: &str = "__SEAM_SSR__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
  Client,
  Server,
}

impl Target {
  pub fn is_server(self) -> bool {
    matches!(self, Self::Server)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Client => "client",
      Self::Server => "server",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// ES module, loaded by the browser with `type="module"`.
  Esm,
  /// Self-contained immediately-invoked function assigning to a global.
  Iife,
}

/// Everything the bundler needs to build one synthetic entrypoint.
/// Serialized as-is across the bundler boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTarget {
  pub entrypoint: PathBuf,
  pub target: Target,
  pub format: OutputFormat,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub global_name: Option<String>,
  /// Identifier -> JS expression substituted at build time.
  pub define: BTreeMap<String, String>,
  pub node_paths: Vec<PathBuf>,
  pub splitting: bool,
  pub minify: bool,
  pub sourcemap: bool,
}

fn node_env_define(env: &str) -> String {
  serde_json::Value::String(env.to_string()).to_string()
}

impl BuildTarget {
  pub fn new(
    entrypoint: &Path,
    node_modules: &Path,
    env: &str,
    live_reload_port: Option<u16>,
    is_server: bool,
  ) -> Self {
    if is_server {
      Self::server(entrypoint, node_modules, env)
    } else {
      Self::client(entrypoint, node_modules, env, live_reload_port)
    }
  }

  /// Hydration bundle. Splitting stays off per page; shared chunks are the
  /// job of the full-project production pass.
  pub fn client(
    entrypoint: &Path,
    node_modules: &Path,
    env: &str,
    live_reload_port: Option<u16>,
  ) -> Self {
    let mut define = BTreeMap::new();
    define.insert("SSR_RENDERING".to_string(), "false".to_string());
    define.insert("process.env.NODE_ENV".to_string(), node_env_define(env));
    if let Some(port) = live_reload_port {
      define.insert("SEAM_LIVE_RELOAD_PORT".to_string(), port.to_string());
    }
    Self {
      entrypoint: entrypoint.to_path_buf(),
      target: Target::Client,
      format: OutputFormat::Esm,
      global_name: None,
      define,
      node_paths: vec![node_modules.to_path_buf()],
      splitting: false,
      minify: env == "production",
      sourcemap: true,
    }
  }

  /// Render bundle: one IIFE under [`SERVER_GLOBAL_NAME`], with `global`
  /// pointed at the VM's window stand-in.
  pub fn server(entrypoint: &Path, node_modules: &Path, env: &str) -> Self {
    let mut define = BTreeMap::new();
    define.insert("SSR_RENDERING".to_string(), "true".to_string());
    define.insert("global".to_string(), "window".to_string());
    define.insert("process.env.NODE_ENV".to_string(), node_env_define(env));
    Self {
      entrypoint: entrypoint.to_path_buf(),
      target: Target::Server,
      format: OutputFormat::Iife,
      global_name: Some(SERVER_GLOBAL_NAME.to_string()),
      define,
      node_paths: vec![node_modules.to_path_buf()],
      splitting: false,
      minify: env == "production",
      sourcemap: true,
    }
  }
}
