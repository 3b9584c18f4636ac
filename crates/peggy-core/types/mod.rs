//! The grammar AST: a closed sum of expression variants,
//! per the Design Note that tagged variants replace runtime type tags on
//! plain records. Locations are shared with the runtime crate
//! (`peggy_rust_runtime::{GrammarSource, Position, Span}`) so compile-time
//! nodes and run-time trace/error records use one representation instead of
//! two parallel location types that could drift apart.
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

pub use peggy_rust_runtime::{GrammarSource, Position, Span};

/// One character-class member: a single code point, an inclusive range, or a
/// named Unicode property escape (`\p{Name}`/`\P{Name}`,
/// only legal when the class's `unicode` flag is set). Property membership is
/// backed by a plain function pointer rather than precomputed ranges, since a
/// handful of `char::is_*` predicates covers the properties grammars actually
/// use in practice; unrecognized names fall back to `unicode_unknown_property`.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassPart {
  Char(char),
  Range(char, char),
  /// `\p{Name}` (or `\P{Name}` when `negated`); only legal when the
  /// enclosing class's `unicode` flag is set.
  Property(String, fn(char) -> bool, bool),
}

#[cfg(feature = "serde")]
impl Serialize for ClassPart {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeTupleVariant;
    match self {
      ClassPart::Char(c) => serializer.serialize_newtype_variant("ClassPart", 0, "Char", c),
      ClassPart::Range(a, b) => {
        let mut tv = serializer.serialize_tuple_variant("ClassPart", 1, "Range", 2)?;
        tv.serialize_field(a)?;
        tv.serialize_field(b)?;
        tv.end()
      }
      ClassPart::Property(name, _, negated) => {
        let mut tv = serializer.serialize_tuple_variant("ClassPart", 2, "Property", 2)?;
        tv.serialize_field(name)?;
        tv.serialize_field(negated)?;
        tv.end()
      }
    }
  }
}

/// Resolves a `\p{Name}` property escape to its canonical name and matching
/// predicate. Lives in `peggy_rust_runtime` so a rendered parser can
/// reconstruct the same `ClassPart::Property` node without depending on this
/// crate; re-exported here so the parser has a natural home to call it from.
pub use peggy_rust_runtime::resolve_unicode_property;

/// A repetition boundary: a constant,
/// a named variable read from the label scope at parse time, or an opaque
/// code block. A missing bound is represented by the caller as `None`, not by
/// a variant here (see `Repeated::min`/`max`).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RepetitionBound {
  Constant(u32),
  Variable(String),
  /// Opaque code, carried verbatim.
  Code(String),
}

/// `import ... from "module"`. Semantics are
/// delegated to the hosting module loader; the AST only records the header.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Import {
  pub bindings: Vec<String>,
  pub module:   String,
  pub location: Span,
}

/// A labeled element's pick annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Pick {
  Pick,
  NoPick,
}

impl Pick {
  pub fn is_pick(self) -> bool {
    matches!(self, Pick::Pick)
  }
}

/// Embedded user code, carried as opaque text end to end. The workspace never parses or evaluates `source`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CodeBlock {
  pub source:       Arc<str>,
  pub code_location: Span,
}

/// One parsing expression. A closed sum of variant cases matched with
/// pattern matching rather than a class hierarchy's virtual dispatch.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Expr {
  Literal { text: String, case_insensitive: bool, location: Span },
  Class { parts: Vec<ClassPart>, inverted: bool, case_insensitive: bool, unicode: bool, location: Span },
  Any { unicode: bool, location: Span },
  RuleRef { name: String, location: Span },
  LibraryRef { binding: String, rule: String, location: Span },
  Sequence { items: Vec<Expr>, location: Span },
  Choice { alternatives: Vec<Expr>, location: Span },
  Optional { inner: Box<Expr>, location: Span },
  ZeroOrMore { inner: Box<Expr>, location: Span },
  OneOrMore { inner: Box<Expr>, location: Span },
  Repeated { inner: Box<Expr>, min: Option<RepetitionBound>, max: Option<RepetitionBound>, delimiter: Option<Box<Expr>>, location: Span },
  Group { inner: Box<Expr>, location: Span },
  Labeled { label: Option<String>, inner: Box<Expr>, pick: Pick, label_location: Option<Span>, location: Span },
  Text { inner: Box<Expr>, location: Span },
  SimpleAnd { inner: Box<Expr>, location: Span },
  SimpleNot { inner: Box<Expr>, location: Span },
  SemanticAnd { code: CodeBlock, location: Span },
  SemanticNot { code: CodeBlock, location: Span },
  Action { inner: Box<Expr>, code: CodeBlock, location: Span },
  Named { name: String, inner: Box<Expr>, location: Span },
}

impl Expr {
  pub fn location(&self) -> &Span {
    match self {
      Expr::Literal { location, .. }
      | Expr::Class { location, .. }
      | Expr::Any { location, .. }
      | Expr::RuleRef { location, .. }
      | Expr::LibraryRef { location, .. }
      | Expr::Sequence { location, .. }
      | Expr::Choice { location, .. }
      | Expr::Optional { location, .. }
      | Expr::ZeroOrMore { location, .. }
      | Expr::OneOrMore { location, .. }
      | Expr::Repeated { location, .. }
      | Expr::Group { location, .. }
      | Expr::Labeled { location, .. }
      | Expr::Text { location, .. }
      | Expr::SimpleAnd { location, .. }
      | Expr::SimpleNot { location, .. }
      | Expr::SemanticAnd { location, .. }
      | Expr::SemanticNot { location, .. }
      | Expr::Action { location, .. }
      | Expr::Named { location, .. } => location,
    }
  }

  /// Shallow children, front to back, for the visitor framework.
  pub fn children(&self) -> Vec<&Expr> {
    match self {
      Expr::Literal { .. } | Expr::Class { .. } | Expr::Any { .. } | Expr::RuleRef { .. } | Expr::LibraryRef { .. } => vec![],
      Expr::Sequence { items, .. } => items.iter().collect(),
      Expr::Choice { alternatives, .. } => alternatives.iter().collect(),
      Expr::Optional { inner, .. }
      | Expr::ZeroOrMore { inner, .. }
      | Expr::OneOrMore { inner, .. }
      | Expr::Group { inner, .. }
      | Expr::Labeled { inner, .. }
      | Expr::Text { inner, .. }
      | Expr::SimpleAnd { inner, .. }
      | Expr::SimpleNot { inner, .. }
      | Expr::Named { inner, .. } => vec![inner.as_ref()],
      Expr::Repeated { inner, delimiter, .. } => {
        let mut v = vec![inner.as_ref()];
        if let Some(d) = delimiter {
          v.push(d.as_ref());
        }
        v
      }
      Expr::Action { inner, .. } => vec![inner.as_ref()],
      Expr::SemanticAnd { .. } | Expr::SemanticNot { .. } => vec![],
    }
  }

  /// Whether this expression can match the empty string, by a fixed-point
  /// closure over the grammar's rules. Callers resolve `rule_ref` via
  /// `Grammar::is_rule_empty` since that requires the fixed-point closure
  /// over all rules; a bare `rule_ref` here is treated conservatively as
  /// non-empty so this function stays a pure, grammar-independent helper.
  pub fn is_trivially_empty(&self) -> bool {
    match self {
      Expr::Literal { text, .. } => text.is_empty(),
      Expr::SimpleAnd { .. } | Expr::SimpleNot { .. } | Expr::SemanticAnd { .. } | Expr::SemanticNot { .. } => true,
      Expr::Optional { .. } | Expr::ZeroOrMore { .. } => true,
      Expr::Repeated { min, .. } => !matches!(min, Some(RepetitionBound::Constant(n)) if *n > 0),
      _ => false,
    }
  }
}

/// A named expression: the rule name, an optional
/// display name used in error messages, and the expression tree.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Rule {
  pub name:          String,
  pub display_name:  Option<String>,
  pub expression:    Expr,
  pub name_location: Span,
}

/// Root node: rules plus optional per-load and
/// per-parse initializers and import headers.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Grammar {
  pub rules:              Vec<Rule>,
  pub top_level_initializer: Option<CodeBlock>,
  pub per_parse_initializer: Option<CodeBlock>,
  pub imports:             Vec<Import>,
}

impl Grammar {
  pub fn rule(&self, name: &str) -> Option<&Rule> {
    self.rules.iter().find(|r| r.name == name)
  }

  pub fn rule_names(&self) -> Vec<&str> {
    self.rules.iter().map(|r| r.name.as_str()).collect()
  }
}
