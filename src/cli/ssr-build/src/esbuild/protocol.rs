/* src/cli/ssr-build/src/esbuild/protocol.rs */

// Line-delimited JSON spoken with driver.mjs. Every request carries an id
// that the driver echoes back, so replies may arrive out of order.

use serde::{Deserialize, Serialize};

use crate::diagnostic::BuildError;
use crate::error::BundleError;
use crate::target::BuildTarget;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum Request<'a> {
  Create { id: u64, target: &'a BuildTarget },
  Rebuild { id: u64, handle: u64 },
  Dispose { id: u64, handle: u64 },
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Response {
  pub id: u64,
  #[serde(default)]
  pub ok: bool,
  #[serde(default)]
  pub handle: Option<u64>,
  #[serde(default)]
  pub code: Option<String>,
  #[serde(default)]
  pub map: Option<String>,
  /// esbuild's own messages on a failed build.
  #[serde(default)]
  pub errors: Vec<Message>,
  /// Driver-level failure (crash, unknown handle).
  #[serde(default)]
  pub error: Option<String>,
}

impl Response {
  /// Error for a response with `ok == false`.
  pub fn into_error(self) -> BundleError {
    if !self.errors.is_empty() {
      return BundleError::Build(self.errors.into_iter().map(BuildError::from).collect());
    }
    BundleError::Backend(self.error.unwrap_or_else(|| "bundler reported failure without details".into()))
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
  pub text: String,
  #[serde(default)]
  pub location: Option<Location>,
}

/// esbuild location: 1-based line, 0-based byte column.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Location {
  pub file: String,
  pub line: u32,
  pub column: u32,
  #[serde(default)]
  pub length: u32,
  #[serde(default)]
  pub line_text: String,
  #[serde(default)]
  pub suggestion: String,
}

impl From<Message> for BuildError {
  fn from(msg: Message) -> Self {
    let Some(loc) = msg.location else {
      return BuildError::without_location(msg.text);
    };
    BuildError {
      message: msg.text,
      file: loc.file,
      line: loc.line,
      column: loc.column + 1,
      line_text: loc.line_text,
      span: loc.length.max(1),
      suggestion: Some(loc.suggestion).filter(|s| !s.is_empty()),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;

  #[test]
  fn requests_are_tagged_by_op() {
    let target = BuildTarget::server(Path::new("/e/a.jsx"), Path::new("/nm"), "development");
    let create = serde_json::to_value(Request::Create { id: 1, target: &target }).unwrap();
    assert_eq!(create["op"], "create");
    assert_eq!(create["target"]["globalName"], "__SEAM_SSR__");
    let rebuild = serde_json::to_string(&Request::Rebuild { id: 2, handle: 9 }).unwrap();
    assert_eq!(rebuild, r#"{"op":"rebuild","id":2,"handle":9}"#);
  }

  #[test]
  fn successful_rebuild_response() {
    let r: Response = serde_json::from_str(r#"{"id":3,"ok":true,"code":"x()","map":"{}"}"#).unwrap();
    assert!(r.ok);
    assert_eq!(r.code.as_deref(), Some("x()"));
  }

  #[test]
  fn esbuild_message_converts_to_one_based_column() {
    let raw = r#"{"id":4,"ok":false,"errors":[{"text":"Expected \";\" but found \"}\"",
      "location":{"file":"app/home/page.tsx","line":3,"column":9,"length":4,
      "lineText":"  return <div>","suggestion":";"}}]}"#;
    let r: Response = serde_json::from_str(raw).unwrap();
    let err = r.into_error();
    let diag = &err.build_errors()[0];
    assert_eq!(diag.line, 3);
    assert_eq!(diag.column, 10);
    assert_eq!(diag.span, 4);
    assert_eq!(diag.suggestion.as_deref(), Some(";"));
    assert!(err.to_string().starts_with("app/home/page.tsx:3:10: error: Expected"));
  }

  #[test]
  fn empty_suggestion_and_missing_location() {
    let raw = r#"{"id":5,"ok":false,"errors":[
      {"text":"a","location":{"file":"f.tsx","line":1,"column":0,"length":0,"lineText":"x","suggestion":""}},
      {"text":"Could not resolve \"react\"","location":null}]}"#;
    let r: Response = serde_json::from_str(raw).unwrap();
    let err = r.into_error();
    let errs = err.build_errors();
    assert_eq!(errs[0].suggestion, None);
    assert_eq!(errs[0].span, 1);
    assert!(!errs[1].has_location());
  }

  #[test]
  fn driver_failure_is_backend_error() {
    let r: Response = serde_json::from_str(r#"{"id":6,"ok":false,"error":"unknown handle 3"}"#).unwrap();
    assert!(matches!(r.into_error(), BundleError::Backend(m) if m == "unknown handle 3"));
  }
}
