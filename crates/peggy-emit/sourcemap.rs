//! A coarse line-level source map: for each generated line that renders part
//! of the grammar, the grammar span it came from. Good enough to point a
//! reader at "this generated function came from this rule", which is the
//! granularity a `SourceAndMap` output needs; it does not
//! attempt column-accurate mapping of emitted Rust syntax.
use peggy_rust_runtime::Span;

#[derive(Clone, Debug, Default)]
pub struct SourceMap {
  /// `(generated_line, original_span)`, one-based line numbers, sorted by
  /// line as they are appended during rendering.
  pub entries: Vec<(u32, Span)>,
}

impl SourceMap {
  /// The original span responsible for `generated_line`, if any line at or
  /// before it was annotated.
  pub fn lookup(&self, generated_line: u32) -> Option<&Span> {
    self.entries.iter().rev().find(|(line, _)| *line <= generated_line).map(|(_, span)| span)
  }
}
