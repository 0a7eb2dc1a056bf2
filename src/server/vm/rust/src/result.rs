/* src/server/vm/rust/src/result.rs */

use std::sync::Arc;
use std::time::Duration;

use seam_sourcemap::{TranslatedFrame, Translator};
use serde::Serialize;

/// Render lifecycle. A render only moves forward:
/// `Idle -> Loading -> Invoking -> {Completed | Threw | TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Idle,
  Loading,
  Invoking,
  Completed,
  Threw,
  TimedOut,
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
  /// Server bundle source (IIFE assigning `__SEAM_SSR__`).
  pub bundle: Arc<str>,
  pub data: serde_json::Value,
  /// Budget for the `Invoking` phase.
  pub timeout: Duration,
  pub translator: Option<Arc<Translator>>,
}

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_millis(1000);

impl RenderRequest {
  pub fn new(bundle: impl Into<Arc<str>>, data: serde_json::Value) -> Self {
    Self { bundle: bundle.into(), data, timeout: DEFAULT_RENDER_TIMEOUT, translator: None }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_translator(mut self, translator: Arc<Translator>) -> Self {
    self.translator = Some(translator);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderResult {
  Success {
    html: String,
  },
  #[serde(rename = "timeout")]
  TimedOut {
    /// Phase that ran out of time: `loading` or `invoking`.
    phase: Phase,
    limit_ms: u64,
  },
  #[serde(rename = "exception")]
  RuntimeException {
    message: String,
    frames: Vec<TranslatedFrame>,
  },
}

impl RenderResult {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success { .. })
  }

  pub fn html(&self) -> Option<&str> {
    match self {
      Self::Success { html } => Some(html),
      _ => None,
    }
  }

  pub fn final_phase(&self) -> Phase {
    match self {
      Self::Success { .. } => Phase::Completed,
      Self::TimedOut { .. } => Phase::TimedOut,
      Self::RuntimeException { .. } => Phase::Threw,
    }
  }

  pub(crate) fn host_failure(message: impl Into<String>) -> Self {
    Self::RuntimeException { message: message.into(), frames: Vec::new() }
  }
}

/// A render result plus how long it took.
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
  pub result: RenderResult,
  #[serde(serialize_with = "as_millis")]
  pub duration: Duration,
  /// Time spent from `Invoking` until the outcome was known. `None` when
  /// the render never got past `Loading`.
  #[serde(serialize_with = "opt_as_millis")]
  pub invoke_duration: Option<Duration>,
  /// Exceeded the soft threshold.
  pub slow: bool,
}

impl RenderReport {
  pub(crate) fn host_failure(message: impl Into<String>) -> Self {
    Self { result: RenderResult::host_failure(message), duration: Duration::ZERO, invoke_duration: None, slow: false }
  }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn opt_as_millis<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
  match d {
    Some(d) => as_millis(d, s),
    None => s.serialize_none(),
  }
}
