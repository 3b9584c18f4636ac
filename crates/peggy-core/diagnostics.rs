//! Compile-time diagnostics: `PeggyError`, `Problem`, and the `Journal` that
//! collects them for one compile.
//! No `log`/`tracing`/`thiserror` dependency: the error enum is hand-rolled and
//! reports through a value callers can print or query, not through a logging facade.
use std::fmt;

use peggy_rust_runtime::Span;

#[cfg(feature = "serde")]
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Severity {
  Warning,
  Error,
}

/// One diagnostic raised by a pass: `{severity, message,
/// location, notes[]}`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Problem {
  pub severity: Severity,
  pub message:  String,
  pub location: Span,
  pub notes:    Vec<String>,
  /// The pass that raised this problem, for `GenerateOptions::info`/`warning`
  /// sinks keyed by pass name.
  pub pass:     &'static str,
}

impl Problem {
  pub fn error(pass: &'static str, message: impl Into<String>, location: Span) -> Self {
    Self { severity: Severity::Error, message: message.into(), location, notes: Vec::new(), pass }
  }

  pub fn warning(pass: &'static str, message: impl Into<String>, location: Span) -> Self {
    Self { severity: Severity::Warning, message: message.into(), location, notes: Vec::new(), pass }
  }

  pub fn with_note(mut self, note: impl Into<String>) -> Self {
    self.notes.push(note.into());
    self
  }
}

impl fmt::Display for Problem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}: {}", self.location.source.as_str(), self.location.start.line, self.location.start.column, self.message)?;
    for note in &self.notes {
      write!(f, "\n  note: {note}")?;
    }
    Ok(())
  }
}

/// The compile-time error taxonomy: syntax, semantic,
/// configuration, and plugin errors, each carrying enough to render a
/// source-annotated message on its own.
#[derive(Clone, Debug)]
pub enum PeggyError {
  Syntax { message: String, location: Span, expected: Vec<String> },
  Semantic { problems: Vec<Problem> },
  Configuration { message: String },
  Plugin { plugin: String, message: String },
}

impl fmt::Display for PeggyError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PeggyError::Syntax { message, location, expected } => {
        write!(f, "{}:{}:{}: {}", location.source.as_str(), location.start.line, location.start.column, message)?;
        if !expected.is_empty() {
          write!(f, " (expected {})", expected.join(", "))?;
        }
        Ok(())
      }
      PeggyError::Semantic { problems } => {
        for (i, p) in problems.iter().enumerate() {
          if i > 0 {
            writeln!(f)?;
          }
          write!(f, "{p}")?;
        }
        Ok(())
      }
      PeggyError::Configuration { message } => write!(f, "configuration error: {message}"),
      PeggyError::Plugin { plugin, message } => write!(f, "plugin '{plugin}' error: {message}"),
    }
  }
}

impl std::error::Error for PeggyError {}

/// Owns one compile's diagnostics; nothing here is process-wide. No
/// cross-thread scratch pad is needed since the pass manager runs its passes
/// strictly sequentially, never concurrently with one another.
#[derive(Debug, Default)]
pub struct Journal {
  problems: Vec<Problem>,
}

impl Journal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn report(&mut self, problem: Problem) {
    self.problems.push(problem);
  }

  pub fn problems(&self) -> &[Problem] {
    &self.problems
  }

  pub fn errors(&self) -> impl Iterator<Item = &Problem> {
    self.problems.iter().filter(|p| p.severity == Severity::Error)
  }

  pub fn warnings(&self) -> impl Iterator<Item = &Problem> {
    self.problems.iter().filter(|p| p.severity == Severity::Warning)
  }

  pub fn has_errors(&self) -> bool {
    self.errors().next().is_some()
  }

  pub fn into_problems(self) -> Vec<Problem> {
    self.problems
  }

  /// Collapse into a single `PeggyError::Semantic` if any error-severity
  /// problem was reported.
  pub fn into_error(self) -> Option<PeggyError> {
    if self.has_errors() {
      Some(PeggyError::Semantic { problems: self.problems })
    } else {
      None
    }
  }
}
