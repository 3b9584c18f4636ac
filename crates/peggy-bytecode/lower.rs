//! The Grammar -> Program lowering pass: walks each rule's expression tree
//! and emits the corresponding `Op` tree, threading a label-scope stack so
//! actions, predicates, and code-evaluated repetition boundaries are given
//! the ordered list of labels bound ahead of them in the same sequence or
//! action, exactly as the interpreter resolves them at parse time.
use std::collections::HashMap;
use std::sync::Arc;

use peggy_core::types::{CodeBlock, Expr, Grammar, RepetitionBound};
use peggy_rust_runtime::{
  Boundary, ConstantPool, Delimiter, FunctionDescriptor, FunctionId, FunctionKind, Op, Program, Rule as BcRule, RuleId, Span,
};

use crate::class::compile_class;

#[derive(Clone, Debug)]
pub struct LowerOptions {
  pub grammar_name: String,
  pub start_rules:  Vec<String>,
}

/// Lowers every rule of `grammar` into a `Program`. Assumes `grammar` has
/// already passed the standard analysis passes: an unresolved `rule_ref`
/// reaching this function is a bug upstream, not a user-facing error.
pub fn lower_grammar(grammar: &Grammar, options: &LowerOptions) -> Program {
  let by_name: HashMap<String, RuleId> =
    grammar.rules.iter().enumerate().map(|(i, r)| (r.name.clone(), RuleId(i as u32))).collect();

  let mut constants = ConstantPool::default();
  let mut rules = Vec::with_capacity(grammar.rules.len());
  for rule in &grammar.rules {
    let mut ctx = LowerCtx::new(&by_name, &mut constants);
    ctx.push_scope();
    let body = ctx.lower_expr(&rule.expression);
    ctx.pop_scope();
    rules.push(BcRule { name: rule.name.clone(), display_name: rule.display_name.clone(), body, cacheable: true });
  }

  Program {
    grammar_name: options.grammar_name.clone(),
    rules,
    by_name,
    constants,
    start_rules: expand_start_rules(&options.start_rules, grammar),
  }
}

fn expand_start_rules(requested: &[String], grammar: &Grammar) -> Vec<String> {
  if requested.iter().any(|s| s == "*") {
    return grammar.rule_names().into_iter().map(str::to_string).collect();
  }
  if requested.is_empty() {
    return grammar.rules.first().map(|r| vec![r.name.clone()]).unwrap_or_default();
  }
  requested.to_vec()
}

struct LowerCtx<'a> {
  by_name:   &'a HashMap<String, RuleId>,
  constants: &'a mut ConstantPool,
  /// One frame per enclosing `sequence`/`action`; the top frame accumulates
  /// labels as a sequence's items are lowered left to right.
  scopes:    Vec<Vec<String>>,
}

impl<'a> LowerCtx<'a> {
  fn new(by_name: &'a HashMap<String, RuleId>, constants: &'a mut ConstantPool) -> Self {
    Self { by_name, constants, scopes: Vec::new() }
  }

  fn push_scope(&mut self) {
    self.scopes.push(Vec::new());
  }

  fn pop_scope(&mut self) -> Vec<String> {
    self.scopes.pop().unwrap_or_default()
  }

  fn bind_label(&mut self, name: String) {
    if let Some(top) = self.scopes.last_mut() {
      top.push(name);
    }
  }

  fn current_params(&self) -> Vec<String> {
    self.scopes.last().cloned().unwrap_or_default()
  }

  fn push_function(&mut self, kind: FunctionKind, code: &CodeBlock) -> FunctionId {
    let params = self.current_params();
    self.constants.push_function(FunctionDescriptor { kind, source: code.source.clone(), params, span: code.code_location.clone() })
  }

  fn lower_expr(&mut self, expr: &Expr) -> Op {
    match expr {
      Expr::Literal { text, case_insensitive, .. } => Op::Literal(self.constants.push_literal(text.clone(), *case_insensitive)),
      Expr::Class { parts, inverted, case_insensitive, unicode, .. } => {
        Op::Class(self.constants.push_class(compile_class(parts, *inverted, *case_insensitive, *unicode)))
      }
      Expr::Any { unicode, .. } => Op::Any { unicode: *unicode },
      Expr::RuleRef { name, .. } => {
        let id = *self
          .by_name
          .get(name.as_str())
          .expect("undefined rule_ref reached the bytecode generator; analysis should have rejected it first");
        Op::CallRule(id)
      }
      Expr::LibraryRef { binding, rule, .. } => Op::CallImport { binding: binding.clone(), rule: rule.clone() },
      Expr::Sequence { items, .. } => self.lower_sequence(items),
      Expr::Choice { alternatives, .. } => Op::Choice(alternatives.iter().map(|a| self.lower_expr(a)).collect()),
      Expr::Optional { inner, .. } => Op::Optional(Box::new(self.lower_expr(inner))),
      Expr::ZeroOrMore { inner, .. } => Op::ZeroOrMore(Box::new(self.lower_expr(inner))),
      Expr::OneOrMore { inner, .. } => Op::OneOrMore(Box::new(self.lower_expr(inner))),
      Expr::Repeated { inner, min, max, delimiter, location } => {
        let min = self.lower_boundary(min, Boundary::Constant(0), location);
        let max = self.lower_boundary(max, Boundary::Constant(u32::MAX), location);
        let inner = Box::new(self.lower_expr(inner));
        let delimiter = delimiter.as_ref().map(|d| Delimiter { op: Box::new(self.lower_expr(d)) });
        Op::Repeated { inner, min, max, delimiter }
      }
      Expr::Group { inner, .. } => Op::Group(Box::new(self.lower_expr(inner))),
      Expr::Labeled { label, inner, pick, .. } => {
        Op::Labeled { label: label.clone(), inner: Box::new(self.lower_expr(inner)), pick: pick.is_pick() }
      }
      Expr::Text { inner, .. } => Op::Text(Box::new(self.lower_expr(inner))),
      Expr::SimpleAnd { inner, .. } => Op::SimpleAnd(Box::new(self.lower_expr(inner))),
      Expr::SimpleNot { inner, .. } => Op::SimpleNot(Box::new(self.lower_expr(inner))),
      Expr::SemanticAnd { code, .. } => Op::SemanticAnd(self.push_function(FunctionKind::Predicate, code)),
      Expr::SemanticNot { code, .. } => Op::SemanticNot(self.push_function(FunctionKind::Predicate, code)),
      Expr::Action { inner, code, .. } => self.lower_action(inner, code),
      Expr::Named { name, inner, .. } => Op::Named { name: name.clone(), inner: Box::new(self.lower_expr(inner)) },
    }
  }

  /// A bare `sequence` (not wrapped by an `action`) gets its own scope frame
  /// so a semantic predicate in the middle of it sees only the labels bound
  /// by elements ahead of it.
  fn lower_sequence(&mut self, items: &[Expr]) -> Op {
    self.push_scope();
    let ops = self.lower_sequence_items(items);
    self.pop_scope();
    Op::Sequence(ops)
  }

  fn lower_sequence_items(&mut self, items: &[Expr]) -> Vec<Op> {
    items
      .iter()
      .map(|item| {
        let op = self.lower_expr(item);
        if let Expr::Labeled { label: Some(name), .. } = item {
          self.bind_label(name.clone());
        }
        op
      })
      .collect()
  }

  /// `action` owns the scope its body's labels bind into: when the body is a
  /// bare `sequence`, its items extend the action's own frame directly
  /// rather than a nested one, so the action code sees every label the
  /// sequence bound, in declaration order.
  fn lower_action(&mut self, inner: &Expr, code: &CodeBlock) -> Op {
    self.push_scope();
    let inner_op = match inner {
      Expr::Sequence { items, .. } => Op::Sequence(self.lower_sequence_items(items)),
      other => {
        let op = self.lower_expr(other);
        if let Expr::Labeled { label: Some(name), .. } = other {
          self.bind_label(name.clone());
        }
        op
      }
    };
    let function = self.push_function(FunctionKind::Action, code);
    self.pop_scope();
    Op::Action { inner: Box::new(inner_op), function }
  }

  fn lower_boundary(&mut self, bound: &Option<RepetitionBound>, default: Boundary, location: &Span) -> Boundary {
    match bound {
      None => default,
      Some(RepetitionBound::Constant(n)) => Boundary::Constant(*n),
      Some(RepetitionBound::Variable(name)) => Boundary::Variable(name.clone()),
      Some(RepetitionBound::Code(source)) => {
        // The parser doesn't track a separate span for a boundary's code
        // block (`RepetitionBound::Code` carries only its text); the
        // enclosing `repeated` node's location is the closest thing to a
        // useful diagnostic anchor.
        let code = CodeBlock { source: Arc::from(source.as_str()), code_location: location.clone() };
        Boundary::Code(self.push_function(FunctionKind::Boundary, &code))
      }
    }
  }
}

#[cfg(test)]
mod test {
  use peggy_core::parser::{parse_sources, SourceFragment};

  use super::*;

  fn lower(src: &str, start_rules: &[&str]) -> Program {
    let grammar = parse_sources(&[SourceFragment::new("g", src)]).unwrap();
    lower_grammar(
      &grammar,
      &LowerOptions { grammar_name: "g".into(), start_rules: start_rules.iter().map(|s| s.to_string()).collect() },
    )
  }

  #[test]
  fn literal_rule_lowers_to_a_single_literal_op() {
    let program = lower(r#"start = "hi";"#, &[]);
    let rule = program.rule(program.rule_id("start").unwrap());
    assert!(matches!(rule.body, Op::Literal(_)));
    assert_eq!(program.constants.literals[0].text.as_ref(), "hi");
  }

  #[test]
  fn action_params_follow_declaration_order() {
    let program = lower(r#"start = a:"x" b:"y" { a + b };"#, &[]);
    let rule = program.rule(program.rule_id("start").unwrap());
    match &rule.body {
      Op::Action { function, .. } => {
        assert_eq!(program.constants.functions[*function as usize].params, vec!["a".to_string(), "b".to_string()]);
      }
      other => panic!("expected an action, got {other:?}"),
    }
  }

  #[test]
  fn predicate_only_sees_labels_bound_before_it() {
    let program = lower(r#"start = a:"x" &{ a } b:"y";"#, &[]);
    let rule = program.rule(program.rule_id("start").unwrap());
    match &rule.body {
      Op::Sequence(items) => match &items[1] {
        Op::SemanticAnd(fid) => assert_eq!(program.constants.functions[*fid as usize].params, vec!["a".to_string()]),
        other => panic!("expected a semantic predicate, got {other:?}"),
      },
      other => panic!("expected a sequence, got {other:?}"),
    }
  }

  #[test]
  fn labels_bound_inside_a_repetition_do_not_leak() {
    let program = lower(r#"start = (a:"x")* { a };"#, &[]);
    let rule = program.rule(program.rule_id("start").unwrap());
    match &rule.body {
      Op::Action { function, .. } => assert!(program.constants.functions[*function as usize].params.is_empty()),
      other => panic!("expected an action, got {other:?}"),
    }
  }

  #[test]
  fn star_expands_to_a_default_unbounded_max() {
    let program = lower(r#"start = "x"*;"#, &[]);
    let rule = program.rule(program.rule_id("start").unwrap());
    match &rule.body {
      Op::ZeroOrMore(_) => {}
      other => panic!("expected a zero_or_more, got {other:?}"),
    }
  }

  #[test]
  fn constant_repetition_boundaries_carry_through() {
    let program = lower(r#"start = "x"|2..3|;"#, &[]);
    let rule = program.rule(program.rule_id("start").unwrap());
    match &rule.body {
      Op::Repeated { min, max, .. } => {
        assert!(matches!(min, Boundary::Constant(2)));
        assert!(matches!(max, Boundary::Constant(3)));
      }
      other => panic!("expected a repeated, got {other:?}"),
    }
  }

  #[test]
  fn star_start_rules_expand_to_every_rule() {
    let program = lower(r#"a = "x"; b = "y";"#, &["*"]);
    assert_eq!(program.start_rules, vec!["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn first_rule_is_the_default_start_when_none_requested() {
    let program = lower(r#"a = "x"; b = "y";"#, &[]);
    assert_eq!(program.start_rules, vec!["a".to_string()]);
  }
}
