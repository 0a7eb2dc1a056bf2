/* src/server/sourcemap/rust/src/translate.rs */

use std::path::Path;

use crate::error::SourceMapError;
use crate::frame::{OriginalLocation, StackFrame, TranslatedFrame};
use crate::map::SourceMap;

/// Translates frames of one generated script. Immutable after construction,
/// so a single instance is shared across concurrent renders.
#[derive(Debug, Clone)]
pub struct Translator {
  map: SourceMap,
}

impl Translator {
  pub fn new(map: SourceMap) -> Self {
    Self { map }
  }

  pub fn parse(bytes: &[u8]) -> Result<Self, SourceMapError> {
    SourceMap::parse(bytes).map(Self::new)
  }

  /// Parse and resolve relative `sources` against the map's directory.
  pub fn parse_at(bytes: &[u8], map_dir: &Path) -> Result<Self, SourceMapError> {
    let mut map = SourceMap::parse(bytes)?;
    map.rebase_sources(map_dir);
    Ok(Self::new(map))
  }

  pub fn source_map(&self) -> &SourceMap {
    &self.map
  }

  /// Never fails: positions without a mapping come back unmapped with the
  /// minified frame intact.
  pub fn translate(&self, frame: &StackFrame) -> TranslatedFrame {
    if frame.line == 0 || frame.column == 0 {
      return TranslatedFrame::unmapped(frame.clone());
    }
    let Some(pos) = self.map.lookup(frame.line - 1, frame.column - 1) else {
      return TranslatedFrame::unmapped(frame.clone());
    };
    let Some(file) = self.map.source(pos.source) else {
      return TranslatedFrame::unmapped(frame.clone());
    };
    TranslatedFrame {
      minified: frame.clone(),
      original: Some(OriginalLocation {
        file: file.to_string(),
        line: pos.line + 1,
        column: pos.column + 1,
        name: pos.name.and_then(|n| self.map.name(n)).map(str::to_string),
      }),
      source_line: None,
    }
  }

  pub fn translate_all(&self, frames: &[StackFrame]) -> Vec<TranslatedFrame> {
    frames.iter().map(|f| self.translate(f)).collect()
  }

  /// Original source line for a translated location, when the map embeds
  /// `sourcesContent`.
  pub fn source_line(&self, location: &OriginalLocation) -> Option<&str> {
    let index = self.map.sources().iter().position(|s| *s == location.file)?;
    let content = self.map.source_content(u32::try_from(index).ok()?)?;
    content.lines().nth(location.line.checked_sub(1)? as usize)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::vlq::encode_value;

  /// Absolute segment: (generated column, source, original line, original column).
  type Seg = (i64, i64, i64, i64);

  /// Encode absolute positions into delta-encoded mappings, the way a
  /// bundler writes them.
  fn encode_mappings(lines: &[Vec<Seg>]) -> String {
    let mut out = String::new();
    let (mut src, mut line, mut col) = (0i64, 0i64, 0i64);
    for (i, segs) in lines.iter().enumerate() {
      if i > 0 {
        out.push(';');
      }
      let mut gen_col = 0i64;
      for (j, &(g, s, l, c)) in segs.iter().enumerate() {
        if j > 0 {
          out.push(',');
        }
        encode_value(g - gen_col, &mut out);
        encode_value(s - src, &mut out);
        encode_value(l - line, &mut out);
        encode_value(c - col, &mut out);
        gen_col = g;
        src = s;
        line = l;
        col = c;
      }
    }
    out
  }

  const ENTRY: &str = "\
import Layout0 from \"../../app/layout.tsx\";
import Page from \"../../app/home/page.tsx\";

export function render(data) {
  return renderToString(<Layout0><Page /></Layout0>);
}
";

  const PAGE: &str = "\
export default function HomePage() {
  const items = load();
  throw new Error(\"boom\");
}
";

  /// Minified bundle is two generated lines: line 1 holds the layout and
  /// page code, line 2 holds the synthetic entry's render function.
  fn synthetic_translator() -> Translator {
    let mappings = encode_mappings(&[
      vec![(0, 1, 0, 0), (40, 2, 0, 0), (62, 2, 1, 2), (85, 2, 2, 2)],
      vec![(0, 0, 3, 0), (20, 0, 4, 2)],
    ]);
    let json = serde_json::json!({
      "version": 3,
      "sources": ["entry.server.jsx", "app/layout.tsx", "app/home/page.tsx"],
      "sourcesContent": [ENTRY, null, PAGE],
      "names": [],
      "mappings": mappings,
    });
    Translator::parse(json.to_string().as_bytes()).unwrap()
  }

  #[test]
  fn frame_in_page_component_maps_to_page_file_and_line() {
    let t = synthetic_translator();
    // V8 reports 1-based: generated line 1, column 90 -> inside the throw segment
    let frame = StackFrame::new(Some("c"), "seam:server-bundle.js", 1, 90);
    let out = t.translate(&frame);
    let orig = out.original.as_ref().unwrap();
    assert_eq!(orig.file, "app/home/page.tsx");
    assert_eq!(orig.line, 3);
    assert_eq!(orig.column, 3);
    assert_eq!(t.source_line(orig), Some("  throw new Error(\"boom\");"));
  }

  #[test]
  fn frame_in_entry_maps_to_render_function() {
    let t = synthetic_translator();
    let out = t.translate(&StackFrame::new(None, "bundle.js", 2, 25));
    let orig = out.original.unwrap();
    assert_eq!(orig.file, "entry.server.jsx");
    assert_eq!(orig.line, 5);
  }

  #[test]
  fn positions_are_monotonic_along_a_line() {
    let t = synthetic_translator();
    let lines: Vec<u32> = [1u32, 41, 63, 86]
      .iter()
      .map(|&col| t.translate(&StackFrame::new(None, "b.js", 1, col)).original.unwrap().line)
      .collect();
    assert_eq!(lines, vec![1, 1, 2, 3]);
  }

  #[test]
  fn unknown_positions_pass_through_unmapped() {
    let t = synthetic_translator();
    let frame = StackFrame::new(Some("x"), "b.js", 40, 1);
    let out = t.translate(&frame);
    assert!(!out.is_mapped());
    assert_eq!(out.minified, frame);
  }

  #[test]
  fn zero_positions_are_unmapped() {
    let t = synthetic_translator();
    assert!(!t.translate(&StackFrame::new(None, "b.js", 0, 5)).is_mapped());
    assert!(!t.translate(&StackFrame::new(None, "b.js", 1, 0)).is_mapped());
  }

  #[test]
  fn source_line_missing_content() {
    let t = synthetic_translator();
    let out = t.translate(&StackFrame::new(None, "b.js", 1, 1)).original.unwrap();
    assert_eq!(out.file, "app/layout.tsx");
    assert!(t.source_line(&out).is_none());
  }

  #[test]
  fn translate_all_preserves_order() {
    let t = synthetic_translator();
    let frames = vec![StackFrame::new(None, "b.js", 1, 90), StackFrame::new(None, "b.js", 99, 1)];
    let out = t.translate_all(&frames);
    assert_eq!(out.len(), 2);
    assert!(out[0].is_mapped());
    assert!(!out[1].is_mapped());
  }
}
