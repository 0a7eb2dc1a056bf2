/* src/server/sourcemap/rust/src/map.rs */

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::SourceMapError;
use crate::vlq::{self, VlqError};

#[derive(Deserialize)]
struct RawSourceMap {
  version: u32,
  #[serde(default)]
  file: Option<String>,
  #[serde(rename = "sourceRoot", default)]
  source_root: Option<String>,
  #[serde(default)]
  sources: Vec<Option<String>>,
  #[serde(rename = "sourcesContent", default)]
  sources_content: Vec<Option<String>>,
  #[serde(default)]
  names: Vec<String>,
  #[serde(default)]
  mappings: Option<String>,
  #[serde(default)]
  sections: Option<serde_json::Value>,
}

/// Original position a generated segment points at. All fields are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
  pub source: u32,
  pub line: u32,
  pub column: u32,
  pub name: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
  pub generated_column: u32,
  pub original: Option<SourcePosition>,
}

/// Decoded v3 source map. Mappings are grouped per generated line and
/// sorted by generated column, so a lookup is one binary search.
#[derive(Debug, Clone)]
pub struct SourceMap {
  file: Option<String>,
  sources: Vec<String>,
  sources_content: Vec<Option<String>>,
  names: Vec<String>,
  lines: Vec<Vec<Mapping>>,
}

impl SourceMap {
  pub fn parse(bytes: &[u8]) -> Result<Self, SourceMapError> {
    let raw: RawSourceMap =
      serde_json::from_slice(bytes).map_err(|e| SourceMapError::Json(e.to_string()))?;
    if raw.version != 3 {
      return Err(SourceMapError::UnsupportedVersion(raw.version));
    }
    if raw.sections.is_some() {
      return Err(SourceMapError::IndexMap);
    }

    let root = raw.source_root.as_deref().filter(|r| !r.is_empty());
    let sources: Vec<String> = raw
      .sources
      .into_iter()
      .map(|s| {
        let s = s.unwrap_or_default();
        match root {
          Some(root) => format!("{}/{}", root.trim_end_matches('/'), s),
          None => s,
        }
      })
      .collect();

    let mappings = raw.mappings.unwrap_or_default();
    let lines = decode_mappings(&mappings, sources.len(), raw.names.len())?;

    Ok(Self {
      file: raw.file,
      sources,
      sources_content: raw.sources_content,
      names: raw.names,
      lines,
    })
  }

  pub fn file(&self) -> Option<&str> {
    self.file.as_deref()
  }

  pub fn sources(&self) -> &[String] {
    &self.sources
  }

  pub fn source(&self, index: u32) -> Option<&str> {
    self.sources.get(index as usize).map(String::as_str)
  }

  pub fn name(&self, index: u32) -> Option<&str> {
    self.names.get(index as usize).map(String::as_str)
  }

  pub fn source_content(&self, index: u32) -> Option<&str> {
    self.sources_content.get(index as usize).and_then(Option::as_deref)
  }

  pub fn line_count(&self) -> usize {
    self.lines.len()
  }

  /// Find the original position for a 0-based generated line/column: the
  /// closest segment at or before `column` on that line. Segments without a
  /// source (and lines without segments) resolve to `None`.
  pub fn lookup(&self, line: u32, column: u32) -> Option<SourcePosition> {
    let segments = self.lines.get(line as usize)?;
    let idx = segments.partition_point(|m| m.generated_column <= column);
    if idx == 0 {
      return None;
    }
    segments[idx - 1].original
  }

  /// Rewrite relative sources against `base` (the directory holding the map)
  /// and fold `.`/`..` segments lexically.
  pub fn rebase_sources(&mut self, base: &Path) {
    for source in &mut self.sources {
      if source.is_empty() || source.contains("://") || Path::new(source.as_str()).is_absolute() {
        continue;
      }
      *source = normalize(&base.join(source.as_str())).to_string_lossy().into_owned();
    }
  }
}

fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for comp in path.components() {
    match comp {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

fn segment_error(line: usize, err: VlqError) -> SourceMapError {
  let reason = match err {
    VlqError::InvalidDigit(c) => format!("invalid base64 digit {c:?}"),
    VlqError::Unterminated => "unterminated VLQ value".to_string(),
    VlqError::Overflow => "VLQ value overflows".to_string(),
  };
  SourceMapError::Mappings { line: line + 1, reason }
}

fn to_u32(value: i64, line: usize, what: &str) -> Result<u32, SourceMapError> {
  u32::try_from(value)
    .map_err(|_| SourceMapError::Mappings { line: line + 1, reason: format!("{what} is {value}") })
}

/// Invert the delta encoding: the generated column restarts at 0 on every
/// line, while source index, original line/column and name index carry
/// across the whole map.
fn decode_mappings(
  mappings: &str,
  source_count: usize,
  name_count: usize,
) -> Result<Vec<Vec<Mapping>>, SourceMapError> {
  let mut lines = Vec::new();
  let mut fields: Vec<i64> = Vec::with_capacity(5);
  let (mut source, mut orig_line, mut orig_col, mut name) = (0i64, 0i64, 0i64, 0i64);

  for (line_idx, line) in mappings.split(';').enumerate() {
    let mut gen_col: i64 = 0;
    let mut segments = Vec::new();

    for segment in line.split(',').filter(|s| !s.is_empty()) {
      fields.clear();
      vlq::decode_segment(segment, &mut fields).map_err(|e| segment_error(line_idx, e))?;

      gen_col += fields[0];
      let generated_column = to_u32(gen_col, line_idx, "generated column")?;

      let original = match fields.len() {
        1 => None,
        4 | 5 => {
          source += fields[1];
          orig_line += fields[2];
          orig_col += fields[3];
          let name_idx = if fields.len() == 5 {
            name += fields[4];
            let n = to_u32(name, line_idx, "name index")?;
            if n as usize >= name_count {
              return Err(SourceMapError::Mappings {
                line: line_idx + 1,
                reason: format!("name index {n} out of range"),
              });
            }
            Some(n)
          } else {
            None
          };
          let src = to_u32(source, line_idx, "source index")?;
          if src as usize >= source_count {
            return Err(SourceMapError::Mappings {
              line: line_idx + 1,
              reason: format!("source index {src} out of range"),
            });
          }
          Some(SourcePosition {
            source: src,
            line: to_u32(orig_line, line_idx, "original line")?,
            column: to_u32(orig_col, line_idx, "original column")?,
            name: name_idx,
          })
        }
        n => {
          return Err(SourceMapError::Mappings {
            line: line_idx + 1,
            reason: format!("segment has {n} fields"),
          });
        }
      };

      segments.push(Mapping { generated_column, original });
    }

    segments.sort_by_key(|m| m.generated_column);
    lines.push(segments);
  }

  Ok(lines)
}
