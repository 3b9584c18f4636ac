//! Runtime values produced by a parse, and the seam (`ActionHost`) through which
//! opaque user action/predicate code is invoked without this workspace ever
//! parsing or evaluating that code itself.
use std::fmt;
use std::sync::Arc;

use crate::position::Span;

/// The value a successful match produces. Structured results mirror the shape
/// of the expression that produced them; `Any` is the escape
/// hatch an [`ActionHost`] uses to hand back a value produced by real,
/// already-compiled host code.
#[derive(Clone)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(Arc<str>),
  /// The ordered results of a `sequence`, or the picked subset when `@` is used.
  Tuple(Vec<Value>),
  /// The accumulated results of a repetition.
  List(Vec<Value>),
  /// An opaque value produced by a host-supplied action. Hosts downcast this
  /// via [`Any`](std::any::Any) on their own terms; the VM never inspects it.
  Any(Arc<dyn std::any::Any + Send + Sync>),
}

impl Value {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_tuple(&self) -> Option<&[Value]> {
    match self {
      Value::Tuple(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(v) => Some(v),
      _ => None,
    }
  }

  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(b) => *b,
      Value::Int(i) => *i != 0,
      Value::Float(f) => *f != 0.0,
      Value::Str(s) => !s.is_empty(),
      Value::Tuple(t) | Value::List(t) => !t.is_empty(),
      Value::Any(_) => true,
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Int(i) => write!(f, "{i}"),
      Value::Float(x) => write!(f, "{x}"),
      Value::Str(s) => write!(f, "{:?}", s.as_ref()),
      Value::Tuple(v) => f.debug_tuple("Tuple").field(v).finish(),
      Value::List(v) => f.debug_list().entries(v.iter()).finish(),
      Value::Any(_) => write!(f, "<host value>"),
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Int(a), Value::Int(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a == b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::Tuple(a), Value::Tuple(b)) => a == b,
      (Value::List(a), Value::List(b)) => a == b,
      _ => false,
    }
  }
}

/// Raised by a host action that calls the runtime's `fail()` helper to
/// signal match failure without panicking.
#[derive(Clone, Debug)]
pub struct ActionFailure {
  pub message: Option<String>,
}

/// A value bound to a label in the active sequence/action scope, passed to
/// [`ActionHost`] calls in declaration order.
#[derive(Clone, Debug)]
pub struct BoundArg {
  pub label: Arc<str>,
  pub value: Value,
}

/// The seam between the bytecode VM and opaque, already-compiled action and
/// predicate code. `output: "parser"` callers supply a host built from real
/// Rust closures; `output: "source"` instead splices the stored source text
/// verbatim into generated function bodies (`peggy_emit`), never calling this
/// trait at all.
pub trait ActionHost: Send + Sync {
  /// Invoke the action at `action_index` within `rule`, with the bound labels
  /// of the enclosing scope in declaration order. Returning `Err` signals the
  /// action called the runtime's `fail()` helper.
  fn call_action(&self, rule: &str, action_index: u32, args: &[BoundArg], matched_text: &str) -> Result<Value, ActionFailure>;

  /// Invoke the predicate at `predicate_index` within `rule`. Truthiness
  /// gates the match; predicates never advance position.
  fn call_predicate(&self, rule: &str, predicate_index: u32, args: &[BoundArg], matched_text: &str) -> bool;
}

/// The default host used when a caller registers none: it never calls user
/// code (there is none to call) and instead returns the plain structural
/// [`Value`] the match already produced, so action-free grammars still run.
#[derive(Default, Clone, Copy)]
pub struct NullActionHost;

impl ActionHost for NullActionHost {
  fn call_action(&self, _rule: &str, _action_index: u32, args: &[BoundArg], matched_text: &str) -> Result<Value, ActionFailure> {
    if args.is_empty() {
      Ok(Value::Str(Arc::from(matched_text)))
    } else if args.len() == 1 {
      Ok(args[0].value.clone())
    } else {
      Ok(Value::Tuple(args.iter().map(|a| a.value.clone()).collect()))
    }
  }

  fn call_predicate(&self, _rule: &str, _predicate_index: u32, _args: &[BoundArg], _matched_text: &str) -> bool {
    true
  }
}

/// Carried purely for diagnostics: the span an action/predicate's opaque code
/// occupied in the original grammar source, so emitted source maps and
/// `output: "ast"` dumps can point back at it.
#[derive(Clone, Debug)]
pub struct CodeSite {
  pub text: Arc<str>,
  pub span: Span,
}
