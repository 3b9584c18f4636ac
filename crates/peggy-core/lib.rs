//! # peggy_core
//!
//! The grammar AST, the hand-written DSL parser, the visitor/rewrite framework, and the analysis
//! passes plus pass manager: everything here is compile-time only and owned by a single
//! compile.
pub mod analysis;
pub mod diagnostics;
pub mod parser;
pub mod types;
pub mod visitor;

pub use diagnostics::{Journal, PeggyError, Problem, Severity};
pub use types::{ClassPart, CodeBlock, Expr, Grammar, Import, Pick, RepetitionBound, Rule};
