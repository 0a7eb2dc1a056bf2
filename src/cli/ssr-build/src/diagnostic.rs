/* src/cli/ssr-build/src/diagnostic.rs */

// Developer-facing build diagnostics. The rendered form is stable so editors
// and log scrapers can parse the `file:line:col: error:` prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
  pub message: String,
  pub file: String,
  /// 1-based; 0 when the bundler reported no location.
  pub line: u32,
  /// 1-based, counted in bytes like the bundler reports it.
  pub column: u32,
  pub line_text: String,
  /// Width of the underlined span, at least 1.
  pub span: u32,
  pub suggestion: Option<String>,
}

impl BuildError {
  pub fn without_location(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      file: String::new(),
      line: 0,
      column: 0,
      line_text: String::new(),
      span: 0,
      suggestion: None,
    }
  }

  pub fn has_location(&self) -> bool {
    self.line > 0
  }

  /// Caret underline aligned under `line_text`. Tabs in the prefix are kept
  /// so the carets line up in a terminal.
  pub fn underline(&self) -> String {
    let offset = (self.column.saturating_sub(1)) as usize;
    let prefix = self.line_text.get(..offset).unwrap_or(self.line_text.as_str());
    let mut out: String = prefix.chars().map(|c| if c == '\t' { '\t' } else { ' ' }).collect();
    let width = self.span.max(1) as usize;
    out.push_str(&"^".repeat(width));
    out
  }
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !self.has_location() {
      return write!(f, "error: {}", self.message);
    }
    writeln!(f, "{}:{}:{}: error: {}", self.file, self.line, self.column, self.message)?;
    let gutter = self.line.to_string();
    let pad = " ".repeat(gutter.len());
    write!(f, "  {gutter} | {}\n  {pad} | {}", self.line_text, self.underline())?;
    if let Some(ref s) = self.suggestion {
      write!(f, "\n  {pad} = suggestion: {s}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> BuildError {
    BuildError {
      message: "Expected \";\" but found \"}\"".into(),
      file: "app/home/page.tsx".into(),
      line: 3,
      column: 10,
      line_text: "  return <div>".into(),
      span: 4,
      suggestion: None,
    }
  }

  #[test]
  fn formats_location_source_and_carets() {
    let text = sample().to_string();
    assert_eq!(
      text,
      "app/home/page.tsx:3:10: error: Expected \";\" but found \"}\"\n  3 |   return <div>\n    |          ^^^^"
    );
  }

  #[test]
  fn suggestion_line_is_appended() {
    let mut err = sample();
    err.suggestion = Some(";".into());
    assert!(err.to_string().ends_with("\n    = suggestion: ;"));
  }

  #[test]
  fn zero_span_still_gets_one_caret() {
    let mut err = sample();
    err.span = 0;
    assert_eq!(err.underline(), "         ^");
  }

  #[test]
  fn tabs_preserved_in_underline() {
    let mut err = sample();
    err.line_text = "\t\tfoo(".into();
    err.column = 3;
    err.span = 3;
    assert_eq!(err.underline(), "\t\t^^^");
  }

  #[test]
  fn column_past_end_of_line() {
    let mut err = sample();
    err.line_text = "ab".into();
    err.column = 9;
    err.span = 1;
    assert_eq!(err.underline(), "  ^");
  }

  #[test]
  fn no_location_is_single_line() {
    let err = BuildError::without_location("Could not resolve \"react\"");
    assert_eq!(err.to_string(), "error: Could not resolve \"react\"");
  }

  #[test]
  fn gutter_widens_for_large_line_numbers() {
    let mut err = sample();
    err.line = 120;
    let text = err.to_string();
    assert!(text.contains("\n  120 |   return <div>\n      |"));
  }
}
