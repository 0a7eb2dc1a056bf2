/* src/cli/ssr-build/src/esbuild/mod.rs */

// Production bundler: a long-lived bun/node child running driver.mjs, which
// keeps one esbuild incremental context per handle.

mod protocol;

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bundler::{BackendHandle, BundleOutput, Bundler};
use crate::error::BundleError;
use crate::target::BuildTarget;

use protocol::{Request, Response};

const DRIVER_SOURCE: &str = include_str!("driver.mjs");
const DRIVER_FILE: &str = "seam-esbuild-driver.mjs";

type Pending = Arc<Mutex<HashMap<u64, Sender<Response>>>>;

#[derive(Debug, Clone)]
pub struct ServiceOptions {
  /// Working directory of the child; esbuild resolves relative paths here.
  pub project_root: PathBuf,
  pub node_modules: PathBuf,
  /// Where the driver script is written.
  pub scratch_dir: PathBuf,
  /// `bun` or `node`; detected from PATH when unset.
  pub runtime: Option<String>,
}

pub struct EsbuildService {
  child: Mutex<Child>,
  stdin: Mutex<ChildStdin>,
  pending: Pending,
  alive: Arc<AtomicBool>,
  next_request: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Check if a command exists on PATH.
pub(crate) fn which_exists(cmd: &str) -> bool {
  Command::new("which")
    .arg(cmd)
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status()
    .map(|s| s.success())
    .unwrap_or(false)
}

pub(crate) fn detect_runtime(preferred: Option<&str>) -> String {
  match preferred {
    Some(r) => r.to_string(),
    None if which_exists("bun") => "bun".to_string(),
    None => "node".to_string(),
  }
}

fn write_driver(scratch_dir: &Path) -> Result<PathBuf, BundleError> {
  std::fs::create_dir_all(scratch_dir)
    .map_err(|e| BundleError::Backend(format!("create {}: {e}", scratch_dir.display())))?;
  let path = scratch_dir.join(DRIVER_FILE);
  if std::fs::read_to_string(&path).is_ok_and(|existing| existing == DRIVER_SOURCE) {
    return Ok(path);
  }
  std::fs::write(&path, DRIVER_SOURCE)
    .map_err(|e| BundleError::Backend(format!("write {}: {e}", path.display())))?;
  Ok(path)
}

impl EsbuildService {
  pub fn spawn(options: &ServiceOptions) -> Result<Self, BundleError> {
    let driver = write_driver(&options.scratch_dir)?;
    let runtime = detect_runtime(options.runtime.as_deref());
    tracing::info!(%runtime, driver = %driver.display(), "starting esbuild service");

    let mut child = Command::new(&runtime)
      .arg(&driver)
      .current_dir(&options.project_root)
      .env("SEAM_NODE_MODULES", &options.node_modules)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| BundleError::Backend(format!("failed to spawn {runtime}: {e}")))?;

    let missing = |what: &str| BundleError::Backend(format!("esbuild service has no {what} pipe"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let pending: Pending = Arc::default();
    let alive = Arc::new(AtomicBool::new(true));

    {
      let pending = Arc::clone(&pending);
      let alive = Arc::clone(&alive);
      std::thread::Builder::new()
        .name("seam-esbuild-stdout".into())
        .spawn(move || {
          for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
              continue;
            }
            match serde_json::from_str::<Response>(&line) {
              Ok(resp) => {
                if let Some(tx) = lock(&pending).remove(&resp.id) {
                  let _ = tx.send(resp);
                }
              }
              Err(e) => tracing::warn!("unparseable esbuild service reply: {e}"),
            }
          }
          alive.store(false, Ordering::SeqCst);
          // dropping the senders wakes every waiter with a disconnect
          lock(&pending).clear();
          tracing::debug!("esbuild service stdout closed");
        })
        .map_err(|e| BundleError::Backend(format!("failed to start reader thread: {e}")))?;
    }

    std::thread::Builder::new()
      .name("seam-esbuild-stderr".into())
      .spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
          tracing::warn!(target: "seam::esbuild", "{line}");
        }
      })
      .map_err(|e| BundleError::Backend(format!("failed to start stderr thread: {e}")))?;

    Ok(Self {
      child: Mutex::new(child),
      stdin: Mutex::new(stdin),
      pending,
      alive,
      next_request: AtomicU64::new(0),
    })
  }

  pub fn is_alive(&self) -> bool {
    self.alive.load(Ordering::SeqCst)
  }

  fn call(&self, build: impl FnOnce(u64) -> Result<String, BundleError>) -> Result<Response, BundleError> {
    let id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
    let (tx, rx) = mpsc::channel();
    lock(&self.pending).insert(id, tx);
    // the reader flips `alive` before draining, so this catches a child
    // that exited between the insert and now
    if !self.is_alive() {
      lock(&self.pending).remove(&id);
      return Err(BundleError::Backend("esbuild service is not running".into()));
    }

    let mut line = match build(id) {
      Ok(line) => line,
      Err(e) => {
        lock(&self.pending).remove(&id);
        return Err(e);
      }
    };
    line.push('\n');
    let written = {
      let mut stdin = lock(&self.stdin);
      stdin.write_all(line.as_bytes()).and_then(|()| stdin.flush())
    };
    if let Err(e) = written {
      lock(&self.pending).remove(&id);
      return Err(BundleError::Backend(format!("esbuild service write failed: {e}")));
    }

    rx.recv().map_err(|_| BundleError::Backend("esbuild service exited".into()))
  }
}

fn encode(request: &Request<'_>) -> Result<String, BundleError> {
  serde_json::to_string(request).map_err(|e| BundleError::Backend(format!("encode request: {e}")))
}

impl Bundler for EsbuildService {
  fn create(&self, target: &BuildTarget) -> Result<BackendHandle, BundleError> {
    let resp = self.call(|id| encode(&Request::Create { id, target }))?;
    if !resp.ok {
      return Err(resp.into_error());
    }
    resp
      .handle
      .map(BackendHandle)
      .ok_or_else(|| BundleError::Backend("create reply carried no handle".into()))
  }

  fn rebuild(&self, handle: BackendHandle) -> Result<BundleOutput, BundleError> {
    let resp = self.call(|id| encode(&Request::Rebuild { id, handle: handle.0 }))?;
    if !resp.ok {
      return Err(resp.into_error());
    }
    let code = resp.code.ok_or_else(|| BundleError::Backend("rebuild produced no JavaScript output".into()))?;
    Ok(BundleOutput { code: code.into_bytes(), source_map: resp.map.map(String::into_bytes) })
  }

  fn dispose(&self, handle: BackendHandle) {
    if !self.is_alive() {
      return;
    }
    match self.call(|id| encode(&Request::Dispose { id, handle: handle.0 })) {
      Ok(resp) if resp.ok => {}
      Ok(resp) => tracing::warn!(%handle, "dispose failed: {}", resp.into_error()),
      Err(e) => tracing::warn!(%handle, "dispose failed: {e}"),
    }
  }
}

impl Drop for EsbuildService {
  fn drop(&mut self) {
    let mut child = lock(&self.child);
    let _ = child.kill();
    let _ = child.wait();
  }
}

#[cfg(test)]
mod tests;
