//! The bytecode data model and the vocabulary of
//! instructions the interpreter in [`crate::vm`] executes. `peggy_bytecode`
//! is the *generator* that lowers a grammar's expressions into these types;
//! this crate owns the shapes themselves, and the
//! interpreter, because both a directly-run `Parser` and any text the emitter
//! renders must agree on exactly what each instruction means.
//!
//! Rather than a flat array of opcodes threaded with explicit jump targets,
//! `Op` is a small tree of structured instructions, each corresponding
//! directly to one of the grammar's own expression kinds (`sequence`,
//! `choice`, `zero_or_more`, ...). Control flow for backtracking is expressed by
//! nesting rather than by jump addresses, which keeps the interpreter a
//! straightforward recursive evaluator instead of a hand-rolled bytecode
//! dispatcher, while still giving every rule a linear constant pool and a
//! reusable, inspectable instruction value (see `DESIGN.md`).
use std::collections::HashMap;
use std::sync::Arc;

use crate::position::Span;

pub type ConstIdx = u32;
pub type FunctionId = u32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct RuleId(pub u32);

/// One literal part of a character class: a single code point, an inclusive
/// range, or a Unicode property predicate (`\p{Name}`/`\P{Name}`, only legal
/// when the enclosing class's `unicode` flag is set).
#[derive(Clone, Debug, PartialEq)]
pub enum ClassPart {
  Char(char),
  Range(char, char),
  /// `name` is carried alongside the predicate (rather than just the
  /// function pointer) so `peggy_emit` can re-derive the `\p{name}` source
  /// text a rendered parser needs; matching itself only uses `predicate`.
  Property(String, fn(char) -> bool, bool),
}

impl ClassPart {
  pub fn matches(&self, c: char) -> bool {
    match self {
      ClassPart::Char(x) => *x == c,
      ClassPart::Range(lo, hi) => *lo <= c && c <= *hi,
      ClassPart::Property(_, predicate, negated) => predicate(c) != *negated,
    }
  }
}

/// A literal constant: its exact text plus whether matching is
/// case-insensitive.
#[derive(Clone, Debug)]
pub struct LiteralConst {
  pub text:             Arc<str>,
  pub case_insensitive: bool,
}

/// A compiled character class: a sorted list of parts, tested in order.
#[derive(Clone, Debug)]
pub struct CompiledClass {
  pub parts:            Vec<ClassPart>,
  pub inverted:         bool,
  pub case_insensitive: bool,
  pub unicode:          bool,
  /// The class's own source text, used as its expected-set description.
  pub display:          Arc<str>,
}

impl CompiledClass {
  pub fn matches(&self, c: char) -> bool {
    let folded = if self.case_insensitive { c.to_ascii_lowercase() } else { c };
    let hit = self.parts.iter().any(|p| {
      if self.case_insensitive {
        match p {
          ClassPart::Char(x) => x.to_ascii_lowercase() == folded,
          ClassPart::Range(lo, hi) => lo.to_ascii_lowercase() <= folded && folded <= hi.to_ascii_lowercase(),
          ClassPart::Property(_, predicate, negated) => predicate(c) != *negated,
        }
      } else {
        p.matches(c)
      }
    });
    hit != self.inverted
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
  Action,
  Predicate,
  Boundary,
}

/// An action/predicate/boundary body, carried verbatim as opaque source text
/// end to end. `params` is the ordered list of in-scope labels at the point the
/// body was written, derived from the label environment.
#[derive(Clone, Debug)]
pub struct FunctionDescriptor {
  pub kind:   FunctionKind,
  pub source: Arc<str>,
  pub params: Vec<String>,
  pub span:   Span,
}

#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
  pub literals:  Vec<LiteralConst>,
  pub classes:   Vec<CompiledClass>,
  pub functions: Vec<FunctionDescriptor>,
}

impl ConstantPool {
  pub fn push_literal(&mut self, text: impl Into<Arc<str>>, case_insensitive: bool) -> ConstIdx {
    self.literals.push(LiteralConst { text: text.into(), case_insensitive });
    (self.literals.len() - 1) as ConstIdx
  }

  pub fn push_class(&mut self, class: CompiledClass) -> ConstIdx {
    self.classes.push(class);
    (self.classes.len() - 1) as ConstIdx
  }

  pub fn push_function(&mut self, f: FunctionDescriptor) -> FunctionId {
    self.functions.push(f);
    (self.functions.len() - 1) as FunctionId
  }
}

/// A repetition boundary: a constant, a
/// named variable read from the active label scope, or an opaque code block
/// evaluated as a zero-argument host call.
#[derive(Clone, Debug)]
pub enum Boundary {
  Constant(u32),
  Variable(String),
  Code(FunctionId),
}

impl Boundary {
  pub fn is_constant_zero_max(&self) -> bool {
    matches!(self, Boundary::Constant(0))
  }
}

/// A delimiter for `repeated{min,max,delim}`.
#[derive(Clone, Debug)]
pub struct Delimiter {
  pub op: Box<Op>,
}

/// One instruction. See the module doc for why this is a tree rather than a
/// flat jump-addressed tape.
#[derive(Clone, Debug)]
pub enum Op {
  Literal(ConstIdx),
  Class(ConstIdx),
  Any { unicode: bool },
  CallRule(RuleId),
  /// `library_ref`: invoke `rule` in the program registered under `binding`
  /// at parse time.
  CallImport { binding: String, rule: String },
  Sequence(Vec<Op>),
  Choice(Vec<Op>),
  Optional(Box<Op>),
  ZeroOrMore(Box<Op>),
  OneOrMore(Box<Op>),
  Repeated { inner: Box<Op>, min: Boundary, max: Boundary, delimiter: Option<Delimiter> },
  Group(Box<Op>),
  Labeled { label: Option<String>, inner: Box<Op>, pick: bool },
  Text(Box<Op>),
  SimpleAnd(Box<Op>),
  SimpleNot(Box<Op>),
  SemanticAnd(FunctionId),
  SemanticNot(FunctionId),
  Action { inner: Box<Op>, function: FunctionId },
  Named { name: String, inner: Box<Op> },
}

/// One compiled rule: its lowered body plus the display name used in error
/// messages.
#[derive(Clone, Debug)]
pub struct Rule {
  pub name:         String,
  pub display_name: Option<String>,
  pub body:         Op,
  pub cacheable:    bool,
}

/// A whole compiled grammar: every rule plus the shared constant pool and the
/// set of names that may be used as a parse's start rule.
#[derive(Clone, Debug, Default)]
pub struct Program {
  pub grammar_name: String,
  pub rules:        Vec<Rule>,
  pub by_name:      HashMap<String, RuleId>,
  pub constants:    ConstantPool,
  pub start_rules:  Vec<String>,
}

impl Program {
  pub fn rule(&self, id: RuleId) -> &Rule {
    &self.rules[id.0 as usize]
  }

  pub fn rule_id(&self, name: &str) -> Option<RuleId> {
    self.by_name.get(name).copied()
  }

  pub fn default_start_rule(&self) -> Option<&str> {
    self.start_rules.first().map(|s| s.as_str())
  }
}
