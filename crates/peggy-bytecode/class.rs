//! Translates a parsed character class into the runtime's compiled
//! representation, including a rendered display string used as the class's
//! own expected-set description when a match fails.
use std::sync::Arc;

use peggy_core::types::ClassPart as AstClassPart;
use peggy_rust_runtime::{ClassPart as RtClassPart, CompiledClass};

pub fn compile_class(parts: &[AstClassPart], inverted: bool, case_insensitive: bool, unicode: bool) -> CompiledClass {
  let compiled = parts
    .iter()
    .map(|p| match p {
      AstClassPart::Char(c) => RtClassPart::Char(*c),
      AstClassPart::Range(lo, hi) => RtClassPart::Range(*lo, *hi),
      AstClassPart::Property(name, predicate, negated) => RtClassPart::Property(name.clone(), *predicate, *negated),
    })
    .collect();
  let display = render(parts, inverted, case_insensitive, unicode);
  CompiledClass { parts: compiled, inverted, case_insensitive, unicode, display: Arc::from(display) }
}

fn render(parts: &[AstClassPart], inverted: bool, case_insensitive: bool, unicode: bool) -> String {
  let mut out = String::from("[");
  if inverted {
    out.push('^');
  }
  for part in parts {
    match part {
      AstClassPart::Char(c) => out.push(*c),
      AstClassPart::Range(lo, hi) => {
        out.push(*lo);
        out.push('-');
        out.push(*hi);
      }
      AstClassPart::Property(name, _, negated) => {
        out.push_str(if *negated { "\\P{" } else { "\\p{" });
        out.push_str(name);
        out.push('}');
      }
    }
  }
  out.push(']');
  if case_insensitive {
    out.push('i');
  }
  if unicode {
    out.push('u');
  }
  out
}
