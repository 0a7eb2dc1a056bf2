/* src/server/vm/rust/src/frames.rs */

// Parse V8 `Error.stack` text into frames and translate the ones that point
// into the server bundle.

use std::sync::OnceLock;

use regex::Regex;
use seam_sourcemap::{StackFrame, TranslatedFrame, Translator};

/// Script name the bundle is executed under; frames in any other script
/// (polyfills, invoke glue) are never translated.
pub const BUNDLE_SCRIPT: &str = "seam:server-bundle.js";

fn frame_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    // "at fn (file:1:2)", "at file:1:2", "at async fn (file:1:2)"
    Regex::new(r"^\s*at (?:(?:async )?(?P<func>.+?) \()?(?P<file>[^()\s]+?):(?P<line>\d+):(?P<col>\d+)\)?$")
      .unwrap()
  })
}

pub(crate) fn parse_frame(line: &str) -> Option<StackFrame> {
  let caps = frame_re().captures(line.trim_end())?;
  let line_no = caps.name("line")?.as_str().parse().ok()?;
  let col = caps.name("col")?.as_str().parse().ok()?;
  let func = caps.name("func").map(|m| m.as_str());
  Some(StackFrame::new(func, caps.name("file")?.as_str(), line_no, col))
}

/// Frames from a stack string, skipping the message lines and anything
/// that is not a positioned frame (native code, eval origins).
pub(crate) fn parse_stack(stack: &str) -> Vec<StackFrame> {
  stack.lines().filter_map(parse_frame).collect()
}

/// Split a rendered JS error (`Uncaught Error: boom\n    at ...`) into the
/// message and its frames.
pub(crate) fn split_error(rendered: &str) -> (String, Vec<StackFrame>) {
  let message_lines: Vec<&str> =
    rendered.lines().take_while(|l| !l.trim_start().starts_with("at ")).collect();
  let message = message_lines.join("\n");
  let message = message.strip_prefix("Uncaught ").unwrap_or(&message).trim().to_string();
  (message, parse_stack(rendered))
}

pub(crate) fn translate(frames: Vec<StackFrame>, translator: Option<&Translator>) -> Vec<TranslatedFrame> {
  frames
    .into_iter()
    .map(|frame| match translator {
      Some(t) if frame.file == BUNDLE_SCRIPT => {
        let mut translated = t.translate(&frame);
        translated.source_line =
          translated.original.as_ref().and_then(|o| t.source_line(o)).map(str::to_string);
        translated
      }
      _ => TranslatedFrame::unmapped(frame),
    })
    .collect()
}
