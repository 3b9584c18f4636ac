//! Emptiness and leftmost-reference helpers shared by the infinite-loop and
//! left-recursion passes.
use std::collections::HashMap;

use crate::types::{Expr, Grammar, RepetitionBound};

/// Whether `expr` can match the empty string, resolving `rule_ref` through
/// `empty` (the fixed-point table `compute_emptiness` builds). Unlike
/// `Expr::is_trivially_empty`, this recurses into `sequence`/`choice`/
/// `rule_ref` rather than treating them conservatively.
pub(crate) fn expr_is_empty(expr: &Expr, empty: &HashMap<&str, bool>) -> bool {
  match expr {
    Expr::RuleRef { name, .. } => *empty.get(name.as_str()).unwrap_or(&false),
    Expr::Sequence { items, .. } => items.iter().all(|e| expr_is_empty(e, empty)),
    Expr::Choice { alternatives, .. } => alternatives.iter().any(|e| expr_is_empty(e, empty)),
    Expr::Group { inner, .. }
    | Expr::Labeled { inner, .. }
    | Expr::Text { inner, .. }
    | Expr::Named { inner, .. }
    | Expr::Action { inner, .. } => expr_is_empty(inner, empty),
    Expr::Repeated { inner, min, .. } => {
      if matches!(min, Some(RepetitionBound::Constant(n)) if *n > 0) {
        expr_is_empty(inner, empty)
      } else {
        true
      }
    }
    other => other.is_trivially_empty(),
  }
}

/// A fixed point over every rule's emptiness.
pub(crate) fn compute_emptiness(grammar: &Grammar) -> HashMap<&str, bool> {
  let mut empty: HashMap<&str, bool> = grammar.rule_names().into_iter().map(|n| (n, false)).collect();
  loop {
    let mut changed = false;
    for rule in &grammar.rules {
      let is_empty = expr_is_empty(&rule.expression, &empty);
      if empty.get(rule.name.as_str()) != Some(&is_empty) {
        empty.insert(rule.name.as_str(), is_empty);
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }
  empty
}

/// Rule names reachable from `expr` through a "first position" chain: the
/// first element of a sequence, every alternative of a choice, any element
/// after one that empty-matches, and so on. Used to detect left recursion.
pub(crate) fn leftmost_refs<'a>(expr: &'a Expr, empty: &HashMap<&str, bool>, out: &mut Vec<&'a str>) {
  match expr {
    Expr::RuleRef { name, .. } => out.push(name.as_str()),
    Expr::Sequence { items, .. } => {
      for item in items {
        leftmost_refs(item, empty, out);
        if !expr_is_empty(item, empty) {
          break;
        }
      }
    }
    Expr::Choice { alternatives, .. } => {
      for alt in alternatives {
        leftmost_refs(alt, empty, out);
      }
    }
    Expr::Group { inner, .. }
    | Expr::Labeled { inner, .. }
    | Expr::Optional { inner, .. }
    | Expr::ZeroOrMore { inner, .. }
    | Expr::OneOrMore { inner, .. }
    | Expr::Text { inner, .. }
    | Expr::Named { inner, .. }
    | Expr::Action { inner, .. }
    | Expr::Repeated { inner, .. } => leftmost_refs(inner, empty, out),
    _ => {}
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::parser::{parse_sources, SourceFragment};

  #[test]
  fn sequence_is_empty_only_when_every_element_is() {
    let g = parse_sources(&[SourceFragment::new("g", r#"a = "" "" ; b = "" "x""#)]).unwrap();
    let empty = compute_emptiness(&g);
    assert!(empty["a"]);
    assert!(!empty["b"]);
  }

  #[test]
  fn leftmost_refs_stops_at_first_non_empty_element() {
    let g = parse_sources(&[SourceFragment::new("g", r#"a = "" b c; b = "x"; c = "y""#)]).unwrap();
    let empty = compute_emptiness(&g);
    let mut out = Vec::new();
    leftmost_refs(&g.rule("a").unwrap().expression, &empty, &mut out);
    assert_eq!(out, vec!["b"]);
  }
}
