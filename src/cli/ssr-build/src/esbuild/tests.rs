/* src/cli/ssr-build/src/esbuild/tests.rs */

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;

use super::*;
use crate::target::BuildTarget;

const FAKE_ESBUILD: &str = include_str!("testdata/fake-esbuild.js");

/// Project dir with the fake esbuild installed, plus a node-backed service.
/// `None` when node is not on PATH.
fn service() -> Option<(TempDir, EsbuildService)> {
  if !which_exists("node") {
    eprintln!("skipping: node not on PATH");
    return None;
  }
  let tmp = tempfile::tempdir().unwrap();
  let pkg = tmp.path().join("node_modules/esbuild");
  std::fs::create_dir_all(&pkg).unwrap();
  std::fs::write(pkg.join("index.js"), FAKE_ESBUILD).unwrap();
  let opts = ServiceOptions {
    project_root: tmp.path().to_path_buf(),
    node_modules: tmp.path().join("node_modules"),
    scratch_dir: tmp.path().join("scratch"),
    runtime: Some("node".into()),
  };
  let svc = EsbuildService::spawn(&opts).unwrap();
  Some((tmp, svc))
}

fn entry(dir: &Path, name: &str, source: &str) -> std::path::PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, source).unwrap();
  path
}

fn server_target(dir: &Path, name: &str, source: &str) -> BuildTarget {
  BuildTarget::server(&entry(dir, name, source), &dir.join("node_modules"), "development")
}

#[test]
fn preferred_runtime_wins() {
  assert_eq!(detect_runtime(Some("node")), "node");
}

#[test]
fn detected_runtime_is_bun_or_node() {
  let r = detect_runtime(None);
  assert!(r == "bun" || r == "node");
}

#[test]
fn driver_written_once() {
  let tmp = tempfile::tempdir().unwrap();
  let path = write_driver(tmp.path()).unwrap();
  assert_eq!(std::fs::read_to_string(&path).unwrap(), DRIVER_SOURCE);
  let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
  write_driver(tmp.path()).unwrap();
  assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);
}

#[test]
fn driver_speaks_all_ops() {
  for op in ["\"create\"", "\"rebuild\"", "\"dispose\""] {
    assert!(DRIVER_SOURCE.contains(op), "driver missing {op}");
  }
}

#[test]
fn missing_runtime_fails_to_spawn() {
  let tmp = tempfile::tempdir().unwrap();
  let opts = ServiceOptions {
    project_root: tmp.path().to_path_buf(),
    node_modules: tmp.path().join("node_modules"),
    scratch_dir: tmp.path().join("scratch"),
    runtime: Some("seam-definitely-not-a-runtime".into()),
  };
  let err = EsbuildService::spawn(&opts).err().unwrap();
  assert!(matches!(err, BundleError::Backend(m) if m.contains("failed to spawn")));
}

#[test]
fn create_rebuild_dispose_round() {
  let Some((tmp, svc)) = service() else { return };
  let handle = svc.create(&server_target(tmp.path(), "page.server.jsx", "export const x = 1;\n")).unwrap();

  let first = svc.rebuild(handle).unwrap();
  let code = String::from_utf8(first.code).unwrap();
  assert!(code.contains("var __SEAM_SSR__ ="), "{code}");
  assert!(code.contains("// build 1 iife"), "{code}");
  let map: serde_json::Value = serde_json::from_slice(&first.source_map.unwrap()).unwrap();
  assert_eq!(map["version"], 3);

  let second = svc.rebuild(handle).unwrap();
  assert!(String::from_utf8(second.code).unwrap().contains("// build 2 iife"));

  svc.dispose(handle);
  let err = svc.rebuild(handle).unwrap_err();
  let expected = format!("unknown handle {}", handle.0);
  assert!(matches!(err, BundleError::Backend(ref m) if *m == expected), "{err}");
}

#[test]
fn client_output_has_no_global_name() {
  let Some((tmp, svc)) = service() else { return };
  let page = entry(tmp.path(), "page.client.jsx", "x\n");
  let target = BuildTarget::client(&page, &tmp.path().join("node_modules"), "development", None);
  let handle = svc.create(&target).unwrap();
  let out = svc.rebuild(handle).unwrap();
  let code = String::from_utf8(out.code).unwrap();
  assert!(!code.contains("__SEAM_SSR__"), "{code}");
  assert!(code.contains("// build 1 esm"), "{code}");
  assert!(out.source_map.is_some());
}

#[test]
fn build_failure_carries_located_diagnostic() {
  let Some((tmp, svc)) = service() else { return };
  let handle = svc.create(&server_target(tmp.path(), "bad.jsx", "const a = 1;\nlet BAD y\n")).unwrap();

  let err = svc.rebuild(handle).unwrap_err();
  let diags = err.build_errors();
  assert_eq!(diags.len(), 1);
  assert_eq!((diags[0].line, diags[0].column, diags[0].span), (2, 5, 3));
  assert_eq!(diags[0].line_text, "let BAD y");
  assert_eq!(diags[0].suggestion.as_deref(), Some(";"));
  let text = err.to_string();
  assert!(text.starts_with("bad.jsx:2:5: error: Expected \";\""), "{text}");
  assert!(text.contains("    ^^^"), "{text}");
  assert!(text.contains("= suggestion: ;"), "{text}");

  // the context survives a failed build
  std::fs::write(tmp.path().join("bad.jsx"), "const a = 1;\n").unwrap();
  assert!(svc.rebuild(handle).is_ok());
}

#[test]
fn failed_create_is_a_backend_error() {
  let Some((tmp, svc)) = service() else { return };
  let err = svc.create(&server_target(tmp.path(), "refused.jsx", "// REFUSE\n")).unwrap_err();
  assert!(matches!(err, BundleError::Backend(ref m) if m.contains("cannot create context")), "{err}");
  assert!(svc.is_alive());
}

#[test]
fn rebuilds_on_two_handles_overlap() {
  let Some((tmp, svc)) = service() else { return };
  let svc = Arc::new(svc);
  let slow = svc.create(&server_target(tmp.path(), "slow.jsx", "// SLOW\n")).unwrap();
  let fast = svc.create(&server_target(tmp.path(), "fast.jsx", "export {};\n")).unwrap();

  let slow_done = Arc::new(AtomicBool::new(false));
  let worker = {
    let svc = Arc::clone(&svc);
    let slow_done = Arc::clone(&slow_done);
    std::thread::spawn(move || {
      let out = svc.rebuild(slow);
      slow_done.store(true, Ordering::SeqCst);
      out
    })
  };
  std::thread::sleep(std::time::Duration::from_millis(30));

  assert!(svc.rebuild(fast).is_ok());
  assert!(!slow_done.load(Ordering::SeqCst), "fast rebuild waited behind the slow one");
  assert!(worker.join().unwrap().is_ok());
}
