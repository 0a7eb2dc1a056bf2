/* src/server/sourcemap/rust/src/frame.rs */

use std::fmt;

use serde::Serialize;

/// One frame as V8 reports it. `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub function: Option<String>,
  pub file: String,
  pub line: u32,
  pub column: u32,
}

impl StackFrame {
  pub fn new(function: Option<&str>, file: impl Into<String>, line: u32, column: u32) -> Self {
    Self { function: function.map(str::to_string), file: file.into(), line, column }
  }
}

/// Original source position, 1-based like the frame it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginalLocation {
  pub file: String,
  pub line: u32,
  pub column: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

/// A frame after translation. `original` is `None` when the position has no
/// mapping (polyfills, glue code, or a frame from another script); the
/// minified frame is always kept so nothing is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedFrame {
  pub minified: StackFrame,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub original: Option<OriginalLocation>,
  /// The original line's text, when the map embeds `sourcesContent`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_line: Option<String>,
}

impl TranslatedFrame {
  pub fn unmapped(frame: StackFrame) -> Self {
    Self { minified: frame, original: None, source_line: None }
  }

  pub fn is_mapped(&self) -> bool {
    self.original.is_some()
  }

  /// Best display name: the original identifier when the map recorded one,
  /// otherwise the function name V8 saw.
  pub fn function_name(&self) -> Option<&str> {
    self
      .original
      .as_ref()
      .and_then(|o| o.name.as_deref())
      .or(self.minified.function.as_deref())
  }
}

impl fmt::Display for TranslatedFrame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = self.function_name().unwrap_or("<anonymous>");
    match &self.original {
      Some(o) => write!(f, "at {name} ({}:{}:{})", o.file, o.line, o.column),
      None => {
        let m = &self.minified;
        write!(f, "at {name} ({}:{}:{}) [unmapped]", m.file, m.line, m.column)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_mapped_prefers_original_name() {
    let frame = TranslatedFrame {
      minified: StackFrame::new(Some("a"), "bundle.js", 1, 120),
      original: Some(OriginalLocation {
        file: "app/page.tsx".into(),
        line: 7,
        column: 3,
        name: Some("HomePage".into()),
      }),
      source_line: None,
    };
    assert_eq!(frame.to_string(), "at HomePage (app/page.tsx:7:3)");
  }

  #[test]
  fn display_unmapped_keeps_minified_position() {
    let frame = TranslatedFrame::unmapped(StackFrame::new(None, "seam:polyfills", 4, 9));
    assert!(!frame.is_mapped());
    assert_eq!(frame.to_string(), "at <anonymous> (seam:polyfills:4:9) [unmapped]");
  }

  #[test]
  fn serializes_without_empty_fields() {
    let frame = TranslatedFrame::unmapped(StackFrame::new(None, "x.js", 1, 1));
    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json, serde_json::json!({"minified": {"file": "x.js", "line": 1, "column": 1}}));
  }
}
