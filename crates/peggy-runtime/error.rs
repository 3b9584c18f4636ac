//! Parse-time errors: the single "furthest-failure syntax error" category
//! a failed parse reports.
use std::collections::BTreeSet;
use std::fmt;

use crate::position::{GrammarSource, Position};

/// One contribution to the expected-set at the furthest-failure position.
/// Deduplicated and sorted (`Ord`) so the rendered message is stable across
/// runs for the same input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExpectedDescription {
  /// A literal string expected verbatim.
  Literal(String),
  /// A character class, rendered as its source text (e.g. `[0-9]`).
  Class(String),
  /// Any character / end-of-input marker.
  AnyCharacter,
  /// A `named` expression's override description.
  Named(String),
  /// End of input was expected (nothing more should follow).
  EndOfInput,
}

impl fmt::Display for ExpectedDescription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExpectedDescription::Literal(s) => write!(f, "\"{s}\""),
      ExpectedDescription::Class(s) => write!(f, "{s}"),
      ExpectedDescription::AnyCharacter => write!(f, "any character"),
      ExpectedDescription::Named(s) => write!(f, "{s}"),
      ExpectedDescription::EndOfInput => write!(f, "end of input"),
    }
  }
}

/// A `{source, text}` record a caller supplies so a [`ParseError`] can render
/// its message against the original input.
pub struct SourceRecord<'a> {
  pub source: GrammarSource,
  pub text:   &'a str,
}

/// The furthest-failure error produced by a failed parse.
#[derive(Clone, Debug)]
pub struct ParseError {
  pub message:  String,
  pub source:   GrammarSource,
  pub position: Position,
  pub found:    Option<String>,
  pub expected: BTreeSet<ExpectedDescription>,
}

impl ParseError {
  pub fn new(source: GrammarSource, position: Position, found: Option<String>, expected: BTreeSet<ExpectedDescription>) -> Self {
    let message = Self::format_message(&found, &expected);
    Self { message, source, position, found, expected }
  }

  fn format_message(found: &Option<String>, expected: &BTreeSet<ExpectedDescription>) -> String {
    let found_desc = match found {
      Some(c) => format!("\"{c}\""),
      None => "end of input".to_string(),
    };
    if expected.is_empty() {
      return format!("Expected nothing but found {found_desc}");
    }
    let items: Vec<String> = expected.iter().map(|e| e.to_string()).collect();
    let joined = match items.len() {
      1 => items[0].clone(),
      2 => format!("{} or {}", items[0], items[1]),
      _ => {
        let (last, rest) = items.split_last().unwrap();
        format!("{}, or {}", rest.join(", "), last)
      }
    };
    format!("Expected {joined} but found {found_desc}")
  }

  /// Render the message with a `source:line:column` prefix, plus the
  /// offending source line and a caret under the failure column when `self.source`
  /// matches one of `sources`.
  pub fn format_against(&self, sources: &[SourceRecord<'_>]) -> String {
    let header = format!("{}:{}:{}: {}", self.source.as_str(), self.position.line, self.position.column, self.message);
    match sources.iter().find(|r| r.source == self.source) {
      Some(record) => {
        let line_text = record.text.lines().nth(self.position.line.saturating_sub(1) as usize).unwrap_or("");
        let caret_col = self.position.column.saturating_sub(1) as usize;
        let caret = format!("{}^", " ".repeat(caret_col));
        format!("{header}\n{line_text}\n{caret}")
      }
      None => header,
    }
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}: {}", self.source.as_str(), self.position.line, self.position.column, self.message)
  }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod test {
  use super::*;

  fn set(items: Vec<ExpectedDescription>) -> BTreeSet<ExpectedDescription> {
    items.into_iter().collect()
  }

  #[test]
  fn message_joins_two_with_or() {
    let msg = ParseError::format_message(
      &Some("b".into()),
      &set(vec![ExpectedDescription::Literal("a".into()), ExpectedDescription::EndOfInput]),
    );
    assert!(msg.contains(" or "));
    assert!(msg.starts_with("Expected"));
  }

  #[test]
  fn message_uses_oxford_comma_for_three_or_more() {
    let msg = ParseError::format_message(
      &None,
      &set(vec![
        ExpectedDescription::Literal("a".into()),
        ExpectedDescription::Literal("b".into()),
        ExpectedDescription::Literal("c".into()),
      ]),
    );
    assert!(msg.contains(", or"));
    assert!(msg.ends_with("found end of input"));
  }
}
