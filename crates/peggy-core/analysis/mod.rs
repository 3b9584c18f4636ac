//! Static analysis passes and the manager that runs them in a fixed order
//!. Later passes may assume the invariants of earlier
//! ones (e.g. the left-recursion pass assumes `undefined-rules` already ran
//! clean).
mod emptiness;
pub mod passes;

pub(crate) use emptiness::{compute_emptiness, expr_is_empty, leftmost_refs};

use crate::diagnostics::{Journal, PeggyError};
use crate::types::Grammar;

/// One analysis stage. Implementors report problems into the shared
/// `Journal`; they never panic on a malformed grammar and never mutate it
/// (rewriting passes, were any needed, would take `&mut Grammar` — none of
/// the eleven fixed passes need to).
pub trait Pass {
  fn name(&self) -> &'static str;
  fn run(&self, grammar: &Grammar, journal: &mut Journal);
}

/// A stable-ordered list of passes. One `PassManager` is built per
/// compile from `GenerateOptions` (allowed start rules, registered plugins)
/// and then discarded.
pub struct PassManager {
  passes: Vec<Box<dyn Pass>>,
}

impl Default for PassManager {
  fn default() -> Self {
    Self::new()
  }
}

impl PassManager {
  pub fn new() -> Self {
    Self { passes: Vec::new() }
  }

  /// The eleven fixed analysis passes, in their required order.
  pub fn standard(allowed_start_rules: Vec<String>) -> Self {
    let mut mgr = Self::new();
    mgr.push(passes::UndefinedRules);
    mgr.push(passes::DuplicateDeclarations);
    mgr.push(passes::InfiniteLoops);
    mgr.push(passes::InfiniteRecursion);
    mgr.push(passes::IncorrectPlucks);
    mgr.push(passes::DuplicateLabels);
    mgr.push(passes::UnusedRules { allowed_start_rules: allowed_start_rules.clone() });
    mgr.push(passes::AllowedStartRules { allowed_start_rules });
    mgr.push(passes::TypeInference);
    mgr.push(passes::ReservedWordCheck);
    mgr.push(passes::RepetitionBoundaries);
    mgr
  }

  pub fn push(&mut self, pass: impl Pass + 'static) -> &mut Self {
    self.passes.push(Box::new(pass));
    self
  }

  pub fn prepend(&mut self, pass: impl Pass + 'static) -> &mut Self {
    self.passes.insert(0, Box::new(pass));
    self
  }

  pub fn append_boxed(&mut self, pass: Box<dyn Pass>) -> &mut Self {
    self.passes.push(pass);
    self
  }

  pub fn names(&self) -> Vec<&'static str> {
    self.passes.iter().map(|p| p.name()).collect()
  }

  /// Runs every pass in order, stopping immediately once a pass has reported
  /// the compile's first error. Warnings never abort.
  pub fn run(&self, grammar: &Grammar) -> Journal {
    let mut journal = Journal::new();
    for pass in &self.passes {
      pass.run(grammar, &mut journal);
      if journal.has_errors() {
        break;
      }
    }
    journal
  }
}

/// A compiler-facade extension point: a plugin's `use` entry
/// point receives the pass manager (and, at the `peggy` facade layer, the
/// options) before compilation begins, and may append passes. Plugin
/// ordering is stable — whatever order `GenerateOptions::plugins` lists them
/// in. Claiming of extra parse-time options happens at the facade, which
/// owns `GenerateOptions`; this trait only sees the pass manager.
pub trait Plugin {
  fn register(&self, mgr: &mut PassManager) -> Result<(), PeggyError>;
}
