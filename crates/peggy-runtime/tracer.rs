//! Opt-in tracing hooks.
use std::fmt;

use crate::position::Span;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEventKind {
  RuleEnter,
  RuleMatch,
  RuleFail,
}

impl TraceEventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TraceEventKind::RuleEnter => "rule.enter",
      TraceEventKind::RuleMatch => "rule.match",
      TraceEventKind::RuleFail => "rule.fail",
    }
  }
}

/// One event of the shared tracing schema:
/// `{ type: "rule.enter"|"rule.match"|"rule.fail", rule, result?, location }`.
#[derive(Clone, Debug)]
pub struct TraceEvent {
  pub kind:     TraceEventKind,
  pub rule:     String,
  pub result:   Option<Value>,
  pub location: Span,
}

/// A tracer object receives one event per rule invocation boundary. The
/// default tracer prints human-readable lines to stderr.
pub trait Tracer {
  fn trace(&mut self, event: &TraceEvent);
}

#[derive(Default)]
pub struct DefaultTracer;

impl Tracer for DefaultTracer {
  fn trace(&mut self, event: &TraceEvent) {
    match event.kind {
      TraceEventKind::RuleEnter => eprintln!("{} {}", event.kind.as_str(), event.rule),
      TraceEventKind::RuleMatch => {
        eprintln!("{} {} -> {:?}", event.kind.as_str(), event.rule, event.result.as_ref().unwrap_or(&Value::Null))
      }
      TraceEventKind::RuleFail => eprintln!("{} {}", event.kind.as_str(), event.rule),
    }
  }
}

/// A tracer that silently drops every event; used when tracing is disabled so
/// the VM's trace call sites do not need to branch.
#[derive(Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
  fn trace(&mut self, _event: &TraceEvent) {}
}

impl fmt::Display for TraceEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} @ {:?}", self.kind.as_str(), self.rule, self.location)
  }
}
