//! The eleven fixed analysis passes, in the order `PassManager::standard`
//! wires them up in.
use std::collections::{HashMap, HashSet};

use peggy_rust_runtime::{GrammarSource, Position, Span};

use super::{compute_emptiness, expr_is_empty, leftmost_refs, Pass};
use crate::diagnostics::{Journal, Problem};
use crate::parser::is_reserved_word;
use crate::types::{Expr, Grammar, Pick, RepetitionBound};
use crate::visitor::walk;

/// Pass 1: every `rule_ref` resolves to a declared rule and every
/// `library_ref` names a declared import binding.
pub struct UndefinedRules;

impl Pass for UndefinedRules {
  fn name(&self) -> &'static str {
    "undefined-rules"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    let known: HashSet<&str> = grammar.rule_names().into_iter().collect();
    let bindings: HashSet<&str> = grammar.imports.iter().flat_map(|i| i.bindings.iter().map(String::as_str)).collect();
    for rule in &grammar.rules {
      walk(&rule.expression, &mut |e| match e {
        Expr::RuleRef { name, location } if !known.contains(name.as_str()) => {
          journal.report(Problem::error(self.name(), format!("undefined rule '{name}'"), location.clone()));
        }
        Expr::LibraryRef { binding, location, .. } if !bindings.contains(binding.as_str()) => {
          journal.report(Problem::error(self.name(), format!("undefined import binding '{binding}'"), location.clone()));
        }
        _ => {}
      });
    }
  }
}

/// Pass 2: duplicate rule names and duplicate import bindings.
pub struct DuplicateDeclarations;

impl Pass for DuplicateDeclarations {
  fn name(&self) -> &'static str {
    "duplicate-declarations"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    let mut seen_rules: HashSet<&str> = HashSet::new();
    for rule in &grammar.rules {
      if !seen_rules.insert(rule.name.as_str()) {
        journal.report(Problem::error(self.name(), format!("duplicate rule '{}'", rule.name), rule.name_location.clone()));
      }
    }
    let mut seen_bindings: HashSet<&str> = HashSet::new();
    for import in &grammar.imports {
      for binding in &import.bindings {
        if !seen_bindings.insert(binding.as_str()) {
          journal.report(Problem::error(self.name(), format!("duplicate import binding '{binding}'"), import.location.clone()));
        }
      }
    }
  }
}

/// Pass 3: loop-unsafe `*`/`+`/`repeated` nodes.
pub struct InfiniteLoops;

impl Pass for InfiniteLoops {
  fn name(&self) -> &'static str {
    "infinite-loops"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    let empty = compute_emptiness(grammar);
    for rule in &grammar.rules {
      walk(&rule.expression, &mut |e| match e {
        Expr::ZeroOrMore { inner, location } | Expr::OneOrMore { inner, location } if expr_is_empty(inner, &empty) => {
          journal.report(Problem::error(self.name(), "repetition body can match the empty string, which would loop forever", location.clone()));
        }
        Expr::Repeated { inner, min, max, location, .. } => {
          let has_positive_min = matches!(min, Some(RepetitionBound::Constant(n)) if *n > 0);
          let unbounded_max = !matches!(max, Some(RepetitionBound::Constant(_)));
          if !has_positive_min && unbounded_max && expr_is_empty(inner, &empty) {
            journal.report(Problem::error(self.name(), "repetition body can match the empty string, which would loop forever", location.clone()));
          }
        }
        _ => {}
      });
    }
  }
}

/// Pass 4: left-recursion detection via cycles in the leftmost-reference
/// graph.
pub struct InfiniteRecursion;

impl Pass for InfiniteRecursion {
  fn name(&self) -> &'static str {
    "infinite-recursion"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    let empty = compute_emptiness(grammar);
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for rule in &grammar.rules {
      let mut refs = Vec::new();
      leftmost_refs(&rule.expression, &empty, &mut refs);
      edges.insert(rule.name.as_str(), refs);
    }
    for rule in &grammar.rules {
      if reaches_self(rule.name.as_str(), &edges) {
        journal.report(Problem::error(self.name(), format!("rule '{}' is left-recursive", rule.name), rule.name_location.clone()));
      }
    }
  }
}

fn reaches_self<'a>(start: &'a str, edges: &HashMap<&'a str, Vec<&'a str>>) -> bool {
  let mut visited: HashSet<&str> = HashSet::new();
  let mut stack: Vec<&str> = edges.get(start).cloned().unwrap_or_default();
  while let Some(next) = stack.pop() {
    if next == start {
      return true;
    }
    if visited.insert(next) {
      if let Some(more) = edges.get(next) {
        stack.extend(more.iter().copied());
      }
    }
  }
  false
}

/// Pass 5: `@` picks are only legal as a sequence element, and an action
/// wrapping a sequence that contains a pick is itself an error.
pub struct IncorrectPlucks;

impl Pass for IncorrectPlucks {
  fn name(&self) -> &'static str {
    "incorrect-plucks"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    for rule in &grammar.rules {
      check_plucks(&rule.expression, false, journal, self.name());
    }
  }
}

fn check_plucks(expr: &Expr, in_sequence_item: bool, journal: &mut Journal, pass_name: &'static str) {
  match expr {
    Expr::Sequence { items, .. } => {
      for item in items {
        check_plucks(item, true, journal, pass_name);
      }
    }
    Expr::Labeled { pick, inner, location, .. } => {
      if pick.is_pick() && !in_sequence_item {
        journal.report(Problem::error(pass_name, "'@' pick is only valid on an element of a sequence", location.clone()));
      }
      check_plucks(inner, false, journal, pass_name);
    }
    Expr::Action { inner, location, .. } => {
      if let Expr::Sequence { items, .. } = inner.as_ref() {
        if items.iter().any(|i| matches!(i, Expr::Labeled { pick: Pick::Pick, .. })) {
          journal.report(Problem::error(
            pass_name,
            "an action return value cannot be combined with an '@' pick in the same sequence",
            location.clone(),
          ));
        }
      }
      check_plucks(inner, false, journal, pass_name);
    }
    _ => {
      for child in expr.children() {
        check_plucks(child, false, journal, pass_name);
      }
    }
  }
}

/// Pass 6: duplicate labels within one sequence's scope.
pub struct DuplicateLabels;

impl Pass for DuplicateLabels {
  fn name(&self) -> &'static str {
    "duplicate-labels"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    for rule in &grammar.rules {
      check_label_scope(&rule.expression, journal, self.name());
    }
  }
}

fn check_label_scope(expr: &Expr, journal: &mut Journal, pass_name: &'static str) {
  if let Expr::Sequence { items, .. } = expr {
    let mut seen: HashSet<&str> = HashSet::new();
    for item in items {
      if let Expr::Labeled { label: Some(name), label_location: Some(loc), .. } = item {
        if !seen.insert(name.as_str()) {
          journal.report(Problem::error(pass_name, format!("duplicate label '{name}' in the same scope"), loc.clone()));
        }
      }
    }
  }
  for child in expr.children() {
    check_label_scope(child, journal, pass_name);
  }
}

/// Pass 7: rules unreachable from the allowed start set, a warning rather than an error.
pub struct UnusedRules {
  pub allowed_start_rules: Vec<String>,
}

impl Pass for UnusedRules {
  fn name(&self) -> &'static str {
    "unused-rules"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    let wants_all = self.allowed_start_rules.is_empty() || self.allowed_start_rules.iter().any(|s| s == "*");
    let starts: Vec<&str> = if wants_all {
      grammar.rule_names()
    } else {
      self.allowed_start_rules.iter().map(String::as_str).filter(|s| grammar.rule(s).is_some()).collect()
    };

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = starts;
    while let Some(name) = stack.pop() {
      if !reachable.insert(name) {
        continue;
      }
      if let Some(rule) = grammar.rule(name) {
        walk(&rule.expression, &mut |e| {
          if let Expr::RuleRef { name, .. } = e {
            stack.push(name.as_str());
          }
        });
      }
    }

    for rule in &grammar.rules {
      if !reachable.contains(rule.name.as_str()) {
        journal.report(Problem::warning(self.name(), format!("rule '{}' is unreachable from the allowed start rules", rule.name), rule.name_location.clone()));
      }
    }
  }
}

/// Pass 8: every allowed start rule must name a declared rule; `*` expands
/// to the full set.
pub struct AllowedStartRules {
  pub allowed_start_rules: Vec<String>,
}

impl Pass for AllowedStartRules {
  fn name(&self) -> &'static str {
    "allowed-start-rules"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    for start in &self.allowed_start_rules {
      if start == "*" {
        continue;
      }
      if grammar.rule(start).is_none() {
        let location = grammar
          .rules
          .first()
          .map(|r| r.name_location.clone())
          .unwrap_or_else(|| Span::point(GrammarSource::default(), Position::start()));
        journal.report(Problem::error(self.name(), format!("unknown start rule '{start}'"), location));
      }
    }
  }
}

/// Pass 9: advisory result-type inference for emitter hints. The fixed-order slot is reserved here; the
/// actual per-expression type hint is computed on demand by the bytecode
/// generator, which is the only consumer and already walks the same tree, so
/// this pass never needs a side channel back out of `Journal`.
pub struct TypeInference;

impl Pass for TypeInference {
  fn name(&self) -> &'static str {
    "type-inference"
  }

  fn run(&self, _grammar: &Grammar, _journal: &mut Journal) {}
}

/// Pass 10: reserved words as rule or label names. The hand-written parser
/// (`crate::parser`) already rejects these unless escaped at parse time,
/// since only the parser still has the information needed to tell `class`
/// from `class` apart; this pass is the safety net for a `Grammar` built
/// by something other than that parser (a plugin, a test fixture).
pub struct ReservedWordCheck;

impl Pass for ReservedWordCheck {
  fn name(&self) -> &'static str {
    "reserved-word-check"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    for rule in &grammar.rules {
      if is_reserved_word(&rule.name) {
        journal.report(Problem::error(self.name(), format!("'{}' is a reserved word and cannot be used as a rule name", rule.name), rule.name_location.clone()));
      }
      walk(&rule.expression, &mut |e| {
        if let Expr::Labeled { label: Some(name), label_location: Some(loc), .. } = e {
          if is_reserved_word(name) {
            journal.report(Problem::error(self.name(), format!("'{name}' is a reserved word and cannot be used as a label"), loc.clone()));
          }
        }
      });
    }
  }
}

/// Pass 11: constant repetition boundaries must be sane. `RepetitionBound::Constant` is a `u32`, so "negative constants"
/// can never reach this pass — the parser can't produce one.
pub struct RepetitionBoundaries;

impl Pass for RepetitionBoundaries {
  fn name(&self) -> &'static str {
    "repetition-boundaries"
  }

  fn run(&self, grammar: &Grammar, journal: &mut Journal) {
    for rule in &grammar.rules {
      walk(&rule.expression, &mut |e| {
        if let Expr::Repeated { min, max, location, .. } = e {
          if let Some(RepetitionBound::Constant(0)) = max {
            journal.report(Problem::error(self.name(), "repetition cannot have a constant maximum of zero", location.clone()));
          }
          if let (Some(RepetitionBound::Constant(lo)), Some(RepetitionBound::Constant(hi))) = (min, max) {
            if hi < lo {
              journal.report(Problem::error(self.name(), format!("repetition maximum {hi} is less than its minimum {lo}"), location.clone()));
            }
          }
        }
      });
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::parser::{parse_sources, SourceFragment};

  fn grammar(text: &str) -> Grammar {
    parse_sources(&[SourceFragment::new("g", text)]).unwrap()
  }

  #[test]
  fn flags_undefined_rule_reference() {
    let g = grammar("start = missing");
    let mut j = Journal::new();
    UndefinedRules.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn flags_duplicate_rule_names() {
    let g = grammar(r#"a = "x"; a = "y""#);
    let mut j = Journal::new();
    DuplicateDeclarations.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn flags_unbounded_empty_match_repetition() {
    let g = grammar(r#"start = ""*"#);
    let mut j = Journal::new();
    InfiniteLoops.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn allows_non_empty_repetition() {
    let g = grammar(r#"start = "x"*"#);
    let mut j = Journal::new();
    InfiniteLoops.run(&g, &mut j);
    assert!(!j.has_errors());
  }

  #[test]
  fn flags_direct_left_recursion() {
    let g = grammar(r#"start = start "x" / "y""#);
    let mut j = Journal::new();
    InfiniteRecursion.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn allows_right_recursion() {
    let g = grammar(r#"start = "x" start / "y""#);
    let mut j = Journal::new();
    InfiniteRecursion.run(&g, &mut j);
    assert!(!j.has_errors());
  }

  #[test]
  fn flags_pick_outside_sequence() {
    let g = grammar(r#"start = @"x""#);
    let mut j = Journal::new();
    IncorrectPlucks.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn flags_pick_mixed_with_action() {
    let g = grammar(r#"start = a:"x" @b:"y" { a }"#);
    let mut j = Journal::new();
    IncorrectPlucks.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn flags_duplicate_label_in_same_sequence() {
    let g = grammar(r#"start = a:"x" a:"y""#);
    let mut j = Journal::new();
    DuplicateLabels.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn warns_on_unreachable_rule() {
    let g = grammar(r#"start = "x"; orphan = "y""#);
    let mut j = Journal::new();
    UnusedRules { allowed_start_rules: vec!["start".to_string()] }.run(&g, &mut j);
    assert!(!j.has_errors());
    assert_eq!(j.warnings().count(), 1);
  }

  #[test]
  fn flags_unknown_start_rule() {
    let g = grammar(r#"start = "x""#);
    let mut j = Journal::new();
    AllowedStartRules { allowed_start_rules: vec!["missing".to_string()] }.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn flags_inverted_repetition_bounds() {
    let g = grammar(r#"start = "x"|3..1|"#);
    let mut j = Journal::new();
    RepetitionBoundaries.run(&g, &mut j);
    assert!(j.has_errors());
  }

  #[test]
  fn pass_manager_stops_after_first_error() {
    let g = grammar("start = missing");
    let mgr = super::super::PassManager::standard(vec!["start".to_string()]);
    let journal = mgr.run(&g);
    assert!(journal.has_errors());
  }
}
