/* src/server/vm/rust/src/engine.rs */

// One render = one fresh isolate on one fresh OS thread. The calling thread
// supervises: it watches phase events from the worker and terminates the
// isolate when the active phase runs past its budget.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use deno_core::{JsRuntime, RuntimeOptions, extension, op2, v8};
use seam_sourcemap::StackFrame;

use crate::cancel::CancelHandle;
use crate::frames::{self, BUNDLE_SCRIPT};
use crate::result::{Phase, RenderReport, RenderRequest, RenderResult};

const POLYFILL_SCRIPT: &str = "seam:polyfills.js";
const INVOKE_SCRIPT: &str = "seam:invoke.js";
const POLYFILLS: &str = include_str!("polyfills.js");

enum JsOutcome {
  Html(String),
  Threw { message: String, frames: Vec<StackFrame> },
}

impl JsOutcome {
  fn host(message: impl Into<String>) -> Self {
    Self::Threw { message: message.into(), frames: Vec::new() }
  }

  /// From a rendered engine error (`Uncaught Error: x\n    at ...`).
  fn from_rendered(rendered: &str) -> Self {
    let (message, frames) = frames::split_error(rendered);
    Self::Threw { message, frames }
  }
}

thread_local! {
  static OUTCOME: RefCell<Option<JsOutcome>> = const { RefCell::new(None) };
}

#[op2(fast)]
fn op_seam_html(#[string] html: String) {
  OUTCOME.with(|cell| {
    *cell.borrow_mut() = Some(JsOutcome::Html(html));
  });
}

#[op2(fast)]
fn op_seam_fail(#[string] message: String, #[string] stack: String) {
  OUTCOME.with(|cell| {
    *cell.borrow_mut() = Some(JsOutcome::Threw { message, frames: frames::parse_stack(&stack) });
  });
}

extension!(seam_render_ext, ops = [op_seam_html, op_seam_fail]);

enum Event {
  Ready(CancelHandle),
  Invoking,
  Finished(JsOutcome),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Budget for injecting polyfills and evaluating the bundle.
  pub load_timeout: Duration,
  /// Renders at or above this are flagged `slow` and logged.
  pub soft_threshold: Duration,
  /// How long a terminated worker gets to unwind before it is detached.
  pub cancel_grace: Duration,
  /// V8 heap ceiling per isolate. Reaching it terminates the render with a
  /// `RuntimeException` instead of aborting the process.
  pub max_heap_bytes: usize,
}

pub const DEFAULT_MAX_HEAP_BYTES: usize = 256 * 1024 * 1024;

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      load_timeout: Duration::from_millis(5000),
      soft_threshold: Duration::from_millis(200),
      cancel_grace: Duration::from_millis(50),
      max_heap_bytes: DEFAULT_MAX_HEAP_BYTES,
    }
  }
}

#[derive(Debug, Default)]
pub struct Engine {
  config: EngineConfig,
  seq: AtomicU64,
}

fn millis(d: Duration) -> u64 {
  u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self { config, seq: AtomicU64::new(0) }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Blocks the calling thread until the render completes, throws or times
  /// out. Never panics on user code; every outcome is a [`RenderResult`].
  pub fn render(&self, request: &RenderRequest) -> RenderReport {
    let started = Instant::now();
    let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
    let (tx, rx) = mpsc::channel();
    let fired = Arc::new(AtomicBool::new(false));

    let bundle = Arc::clone(&request.bundle);
    let data_json = request.data.to_string();
    let worker_fired = Arc::clone(&fired);
    let max_heap = self.config.max_heap_bytes;
    let spawned = thread::Builder::new()
      .name(format!("seam-render-{id}"))
      .spawn(move || run_isolate(&bundle, &data_json, max_heap, &tx, &worker_fired));
    let worker = match spawned {
      Ok(handle) => handle,
      Err(e) => return RenderReport::host_failure(format!("failed to start render thread: {e}")),
    };

    let mut phase = Phase::Idle;
    let mut cancel = None;
    let mut invoke_started = None;
    let mut deadline = started + self.config.load_timeout;
    let outcome = loop {
      match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Event::Ready(handle)) => {
          phase = Phase::Loading;
          cancel = Some(handle);
        }
        Ok(Event::Invoking) => {
          let now = Instant::now();
          phase = Phase::Invoking;
          invoke_started = Some(now);
          deadline = now + request.timeout;
        }
        Ok(Event::Finished(outcome)) => break Some(outcome),
        Err(RecvTimeoutError::Timeout) => break None,
        Err(RecvTimeoutError::Disconnected) => {
          break Some(JsOutcome::host("render thread exited without a result"));
        }
      }
    };

    let result = match outcome {
      Some(JsOutcome::Html(html)) => {
        let _ = worker.join();
        RenderResult::Success { html }
      }
      Some(JsOutcome::Threw { message, frames: raw }) => {
        let _ = worker.join();
        let frames = frames::translate(raw, request.translator.as_deref());
        RenderResult::RuntimeException { message, frames }
      }
      None => {
        let limit = if phase == Phase::Invoking { request.timeout } else { self.config.load_timeout };
        drop(worker);
        self.abandon(id, cancel.as_ref(), &rx);
        RenderResult::TimedOut { phase, limit_ms: millis(limit) }
      }
    };

    let duration = started.elapsed();
    let invoke_duration = invoke_started.map(|t| t.elapsed());
    let slow = duration >= self.config.soft_threshold;
    match &result {
      RenderResult::TimedOut { phase, limit_ms } => {
        tracing::warn!(render = id, ?phase, limit_ms, "render timed out after {}ms", millis(duration));
      }
      RenderResult::RuntimeException { message, frames } => {
        let top = frames.iter().find(|f| f.is_mapped());
        match top.and_then(|f| Some((f, f.source_line.as_deref()?))) {
          Some((frame, line)) => {
            tracing::warn!(
              render = id,
              frames = frames.len(),
              "render threw: {message}\n  {frame}\n  > {}",
              line.trim()
            );
          }
          None => tracing::warn!(render = id, frames = frames.len(), "render threw: {message}"),
        }
      }
      RenderResult::Success { .. } if slow => {
        tracing::warn!(
          render = id,
          threshold_ms = millis(self.config.soft_threshold),
          "slow render: {}ms",
          millis(duration)
        );
      }
      RenderResult::Success { html } => {
        tracing::debug!(render = id, bytes = html.len(), "rendered in {}ms", millis(duration));
      }
    }

    RenderReport { result, duration, invoke_duration, slow }
  }

  /// Terminate a render that ran out of time. The worker is already
  /// detached; this waits at most `cancel_grace` for it to unwind.
  fn abandon(&self, id: u64, cancel: Option<&CancelHandle>, rx: &Receiver<Event>) {
    let mut terminated = cancel.is_some_and(CancelHandle::cancel);
    let deadline = Instant::now() + self.config.cancel_grace;
    loop {
      match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        // isolate came up after the deadline; stop it before it runs
        Ok(Event::Ready(handle)) => terminated = handle.cancel(),
        Ok(Event::Invoking) => {}
        Ok(Event::Finished(_)) | Err(RecvTimeoutError::Disconnected) => break,
        Err(RecvTimeoutError::Timeout) => {
          tracing::warn!(render = id, terminated, "render thread still running after cancel, detaching");
          break;
        }
      }
    }
  }
}

/// Worker body. Owns the isolate for its whole life; reports phase changes
/// and the outcome over `events`.
fn run_isolate(
  bundle: &str,
  data_json: &str,
  max_heap: usize,
  events: &Sender<Event>,
  fired: &Arc<AtomicBool>,
) {
  OUTCOME.with(|cell| cell.borrow_mut().take());

  let tokio_rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
    Ok(rt) => rt,
    Err(e) => {
      let _ = events.send(Event::Finished(JsOutcome::host(format!("failed to start render runtime: {e}"))));
      return;
    }
  };
  let _enter = tokio_rt.enter();

  let mut runtime = JsRuntime::new(RuntimeOptions {
    extensions: vec![seam_render_ext::init()],
    create_params: Some(v8::CreateParams::default().heap_limits(0, max_heap)),
    ..Default::default()
  });
  let cancel = CancelHandle::new(runtime.v8_isolate().thread_safe_handle(), Arc::clone(fired));

  let heap_hit = Rc::new(Cell::new(false));
  {
    let heap_hit = Rc::clone(&heap_hit);
    let cancel = cancel.clone();
    runtime.add_near_heap_limit_callback(move |current, _initial| {
      heap_hit.set(true);
      cancel.cancel();
      // headroom for the termination to unwind
      current.saturating_mul(2)
    });
  }
  let failed = |e: &dyn std::fmt::Display| {
    if heap_hit.get() {
      JsOutcome::host(format!("heap limit exceeded ({} MiB)", max_heap / (1024 * 1024)))
    } else {
      JsOutcome::from_rendered(&e.to_string())
    }
  };

  if events.send(Event::Ready(cancel)).is_err() {
    return;
  }

  if let Err(e) = runtime.execute_script(POLYFILL_SCRIPT, POLYFILLS) {
    let _ = events.send(Event::Finished(failed(&e)));
    return;
  }
  if let Err(e) = runtime.execute_script(BUNDLE_SCRIPT, bundle.to_string()) {
    let _ = events.send(Event::Finished(failed(&e)));
    return;
  }

  if events.send(Event::Invoking).is_err() {
    return;
  }
  let invoke = format!("globalThis.__seamInvoke({data_json});");
  let outcome = match runtime.execute_script(INVOKE_SCRIPT, invoke) {
    Err(e) => failed(&e),
    Ok(_) => OUTCOME
      .with(|cell| cell.borrow_mut().take())
      .unwrap_or_else(|| JsOutcome::host("render finished without producing output")),
  };
  if fired.load(Ordering::SeqCst) {
    tracing::debug!(heap_limit = heap_hit.get(), "render isolate terminated");
  }
  let _ = events.send(Event::Finished(outcome));
}
