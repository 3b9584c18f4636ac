//! Source positions and spans, shared by the grammar AST and by trace/error
//! records produced while a compiled parser runs.
use std::fmt::{self, Debug};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A location within an input text. Lines and columns are 1-based; `offset` is a
/// 0-based byte offset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Position {
  pub offset: usize,
  pub line:   u32,
  pub column: u32,
}

impl Position {
  pub const fn start() -> Self {
    Self { offset: 0, line: 1, column: 1 }
  }
}

impl Debug for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}@{}", self.line, self.column, self.offset)
  }
}

/// An opaque tag naming the fragment a [`Span`] originated from. Grammars are
/// built from one or more named source fragments; the tag is
/// carried on every location so multi-file diagnostics can name their origin.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GrammarSource(Arc<str>);

impl GrammarSource {
  pub fn new(name: impl Into<Arc<str>>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl Default for GrammarSource {
  fn default() -> Self {
    Self(Arc::from("<anonymous>"))
  }
}

impl Debug for GrammarSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for GrammarSource {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<String> for GrammarSource {
  fn from(value: String) -> Self {
    Self::new(value)
  }
}

/// A `{source, start, end}` triple, attached to every AST node and to every
/// trace/error record.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Span {
  pub source: GrammarSource,
  pub start:  Position,
  pub end:    Position,
}

impl Span {
  pub fn new(source: GrammarSource, start: Position, end: Position) -> Self {
    debug_assert!(end.offset >= start.offset, "span end must not precede its start");
    Self { source, start, end }
  }

  /// A zero-width span at `pos`, used for point diagnostics (e.g. "expected X here").
  pub fn point(source: GrammarSource, pos: Position) -> Self {
    Self { source, start: pos, end: pos }
  }

  /// The smallest span containing both `self` and `other`. Both must share a source.
  pub fn join(&self, other: &Span) -> Span {
    let start = if self.start.offset <= other.start.offset { self.start } else { other.start };
    let end = if self.end.offset >= other.end.offset { self.end } else { other.end };
    Span { source: self.source.clone(), start, end }
  }

  pub fn contains(&self, other: &Span) -> bool {
    self.source == other.source && self.start.offset <= other.start.offset && self.end.offset >= other.end.offset
  }
}

impl Debug for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}[{:?}..{:?}]", self.source, self.start, self.end)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn join_takes_the_widest_bounds() {
    let src = GrammarSource::new("g");
    let a = Span::new(src.clone(), Position { offset: 2, line: 1, column: 3 }, Position { offset: 5, line: 1, column: 6 });
    let b = Span::new(src.clone(), Position { offset: 4, line: 1, column: 5 }, Position { offset: 9, line: 1, column: 10 });
    let j = a.join(&b);
    assert_eq!(j.start.offset, 2);
    assert_eq!(j.end.offset, 9);
  }

  #[test]
  fn contains_checks_source_and_bounds() {
    let src = GrammarSource::new("g");
    let other = GrammarSource::new("h");
    let outer = Span::new(src.clone(), Position::start(), Position { offset: 10, line: 1, column: 11 });
    let inner = Span::new(src.clone(), Position { offset: 2, line: 1, column: 3 }, Position { offset: 4, line: 1, column: 5 });
    let wrong_source = Span::new(other, Position { offset: 2, line: 1, column: 3 }, Position { offset: 4, line: 1, column: 5 });
    assert!(outer.contains(&inner));
    assert!(!outer.contains(&wrong_source));
  }
}
