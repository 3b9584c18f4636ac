//! The bytecode interpreter: a from-scratch realization of the runtime
//! contract over the instruction vocabulary of
//! [`crate::bytecode`]. Honors ordered choice and backtracking, furthest-failure
//! tracking, opt-in memoization and tracing, and library mode.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::bytecode::{Boundary, FunctionId, FunctionKind, Op, Program, Rule as CompiledRule, RuleId};
use crate::error::{ExpectedDescription, ParseError};
use crate::position::{GrammarSource, Position};
use crate::tracer::{TraceEvent, TraceEventKind, Tracer};
use crate::value::{ActionHost, BoundArg, Value};

/// Per-call configuration. The tracer and
/// action host are passed separately to [`Parser::parse`] since they are
/// trait objects, not plain data.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
  pub start_rule:    Option<String>,
  /// `peg$library`: return a [`LibraryResult`] instead of raising.
  pub library_mode:  bool,
}

/// The partial-result descriptor returned by a library-mode parse: the best
/// match found so far plus how far the furthest failure reached.
/// `throw()` plays the role of the JS original's nullary `throw` field as a
/// method, since Rust structs cannot portably store a self-borrowing closure.
#[derive(Clone, Debug)]
pub struct LibraryResult {
  pub result:            Option<Value>,
  pub curr_pos:          Position,
  pub success:           bool,
  pub max_fail_expected: BTreeSet<ExpectedDescription>,
  pub max_fail_pos:      Position,
  source:                GrammarSource,
  found:                 Option<String>,
}

impl LibraryResult {
  pub fn throw(&self) -> ParseError {
    ParseError::new(self.source.clone(), self.max_fail_pos, self.found.clone(), self.max_fail_expected.clone())
  }
}

/// A compiled, immutable parser: a [`Program`] plus the set of rule names a
/// caller may start a parse from. `Send + Sync` so independent `parse()` calls
/// may run concurrently.
pub struct Parser {
  pub program:             Arc<Program>,
  pub allowed_start_rules: Vec<String>,
  pub source:              GrammarSource,
  pub imports:             HashMap<String, Arc<Program>>,
  pub cache:                bool,
}

impl Parser {
  pub fn new(program: Arc<Program>, allowed_start_rules: Vec<String>, source: GrammarSource) -> Self {
    Self { program, allowed_start_rules, source, imports: HashMap::new(), cache: false }
  }

  pub fn with_imports(mut self, imports: HashMap<String, Arc<Program>>) -> Self {
    self.imports = imports;
    self
  }

  pub fn with_cache(mut self, enable: bool) -> Self {
    self.cache = enable;
    self
  }

  fn resolve_start_rule(&self, requested: Option<&str>) -> Result<RuleId, ParseError> {
    let name = requested
      .map(str::to_string)
      .or_else(|| self.allowed_start_rules.first().cloned())
      .ok_or_else(|| self.unknown_start_rule_error("<none>"))?;

    if !self.allowed_start_rules.iter().any(|r| r == &name) {
      return Err(self.unknown_start_rule_error(&name));
    }
    self.program.rule_id(&name).ok_or_else(|| self.unknown_start_rule_error(&name))
  }

  fn unknown_start_rule_error(&self, name: &str) -> ParseError {
    ParseError::new(
      self.source.clone(),
      Position::start(),
      Some(name.to_string()),
      [ExpectedDescription::Named("a declared start rule".into())].into_iter().collect(),
    )
  }

  /// Run a parse to completion. A successful parse
  /// must consume the entirety of `text`; otherwise the furthest-failure
  /// error is raised.
  pub fn parse(
    &self,
    text: &str,
    options: &ParseOptions,
    host: &dyn ActionHost,
    tracer: Option<&mut dyn Tracer>,
  ) -> Result<Value, ParseError> {
    let lib = self.parse_library_inner(text, options, host, tracer)?;
    if lib.success {
      Ok(lib.result.unwrap_or(Value::Null))
    } else {
      Err(lib.throw())
    }
  }

  /// `peg$library` mode: never raises, returns a descriptor the caller may
  /// inspect or escalate via [`LibraryResult::throw`].
  pub fn parse_library(
    &self,
    text: &str,
    options: &ParseOptions,
    host: &dyn ActionHost,
    tracer: Option<&mut dyn Tracer>,
  ) -> Result<LibraryResult, ParseError> {
    self.parse_library_inner(text, options, host, tracer)
  }

  fn parse_library_inner(
    &self,
    text: &str,
    options: &ParseOptions,
    host: &dyn ActionHost,
    tracer: Option<&mut dyn Tracer>,
  ) -> Result<LibraryResult, ParseError> {
    let start_rule = self.resolve_start_rule(options.start_rule.as_deref())?;

    let mut interp = Interpreter {
      program: &self.program,
      text,
      imports: &self.imports,
      source: self.source.clone(),
      cache_enabled: self.cache,
      cache: HashMap::new(),
      max_fail_pos: 0,
      max_fail_expected: BTreeSet::new(),
      silent: 0,
      host,
      tracer,
      current_rule: String::new(),
    };

    let outcome = interp.eval_rule(start_rule, 0);
    let (result, curr_pos) = match outcome {
      Ok((pos, v)) => (Some(v), pos),
      Err(()) => (None, 0),
    };

    let consumed_all = result.is_some() && curr_pos == text.len();
    if result.is_some() && !consumed_all {
      interp.record_fail(curr_pos, ExpectedDescription::EndOfInput);
    }

    let max_fail_pos = interp.offset_to_position(interp.max_fail_pos);
    let found = text[interp.max_fail_pos..].chars().next().map(|c| c.to_string());

    Ok(LibraryResult {
      result,
      curr_pos: interp.offset_to_position(curr_pos),
      success: consumed_all,
      max_fail_expected: interp.max_fail_expected,
      max_fail_pos,
      source: self.source.clone(),
      found,
    })
  }
}

type EvalResult = Result<(usize, Value), ()>;

struct Interpreter<'a> {
  program:           &'a Program,
  text:              &'a str,
  imports:           &'a HashMap<String, Arc<Program>>,
  source:            GrammarSource,
  cache_enabled:     bool,
  cache:             HashMap<(RuleId, usize, bool), EvalResult>,
  max_fail_pos:      usize,
  max_fail_expected: BTreeSet<ExpectedDescription>,
  silent:            u32,
  host:              &'a dyn ActionHost,
  tracer:            Option<&'a mut dyn Tracer>,
  current_rule:      String,
}

impl<'a> Interpreter<'a> {
  fn offset_to_position(&self, offset: usize) -> Position {
    let mut line = 1u32;
    let mut col = 1u32;
    for ch in self.text[..offset.min(self.text.len())].chars() {
      if ch == '\n' {
        line += 1;
        col = 1;
      } else {
        col += 1;
      }
    }
    Position { offset, line, column: col }
  }

  fn record_fail(&mut self, pos: usize, desc: ExpectedDescription) {
    if self.silent > 0 {
      return;
    }
    match pos.cmp(&self.max_fail_pos) {
      std::cmp::Ordering::Greater => {
        self.max_fail_pos = pos;
        self.max_fail_expected.clear();
        self.max_fail_expected.insert(desc);
      }
      std::cmp::Ordering::Equal => {
        self.max_fail_expected.insert(desc);
      }
      std::cmp::Ordering::Less => {}
    }
  }

  fn trace(&mut self, kind: TraceEventKind, rule: &str, pos_start: usize, pos_end: usize, result: Option<&Value>) {
    if let Some(tracer) = self.tracer.as_deref_mut() {
      let span = crate::position::Span::new(
        self.source.clone(),
        self.offset_to_position(pos_start.min(pos_end)),
        self.offset_to_position(pos_end.max(pos_start)),
      );
      tracer.trace(&TraceEvent { kind, rule: rule.to_string(), result: result.cloned(), location: span });
    }
  }

  fn eval_rule(&mut self, id: RuleId, pos: usize) -> EvalResult {
    let rule: &CompiledRule = self.program.rule(id);
    let name = rule.name.clone();
    let cacheable = self.cache_enabled && rule.cacheable;
    let key = (id, pos, self.silent > 0);

    self.trace(TraceEventKind::RuleEnter, &name, pos, pos, None);

    if cacheable {
      if let Some(cached) = self.cache.get(&key).cloned() {
        match &cached {
          Ok((end, v)) => self.trace(TraceEventKind::RuleMatch, &name, pos, *end, Some(v)),
          Err(()) => self.trace(TraceEventKind::RuleFail, &name, pos, pos, None),
        }
        return cached;
      }
    }

    let prior_rule = std::mem::replace(&mut self.current_rule, name.clone());
    let body = rule.body.clone();
    let display_name = rule.display_name.clone();
    let result = if display_name.is_some() {
      // A display name behaves like a `named` wrapper around the whole rule
      // body: suppress every inner expected-set contribution and report only
      // the rule's own description at the position the rule as a whole failed.
      self.silent += 1;
      let r = self.eval(&body, pos, &[]);
      self.silent -= 1;
      if r.is_err() {
        self.record_fail(pos, ExpectedDescription::Named(display_name.unwrap()));
      }
      r
    } else {
      self.eval(&body, pos, &[])
    };
    self.current_rule = prior_rule;

    match &result {
      Ok((end, v)) => self.trace(TraceEventKind::RuleMatch, &name, pos, *end, Some(v)),
      Err(()) => self.trace(TraceEventKind::RuleFail, &name, pos, pos, None),
    }

    if cacheable {
      self.cache.insert(key, result.clone());
    }
    result
  }

  fn eval(&mut self, op: &Op, pos: usize, active: &[BoundArg]) -> EvalResult {
    self.eval_with_labels(op, pos, active).map(|(p, v, _)| (p, v))
  }

  /// Like [`Self::eval`], but for `Sequence`/`Group`/bare `Labeled` nodes also
  /// hands back the labels bound directly within that node, so an enclosing
  /// `Action` can see them. Every other op kind returns an empty label list:
  /// labels bound inside a nested repetition/choice/lookahead are local to
  /// that subtree and never leak past it. `active` is the label environment already bound by
  /// the nearest enclosing sequence/action, up to this point in its
  /// evaluation; `Sequence` replaces it with its own (starting empty) scope
  /// rather than extending it, matching the bytecode generator's
  /// `push_scope` at every `Sequence`/`Action` boundary.
  fn eval_with_labels(&mut self, op: &Op, pos: usize, active: &[BoundArg]) -> Result<(usize, Value, Vec<BoundArg>), ()> {
    match op {
      Op::Sequence(ops) => self.eval_sequence(ops, pos),
      Op::Group(inner) => self.eval_with_labels(inner, pos, active),
      Op::Labeled { label, inner, .. } => {
        let (np, v) = self.eval(inner, pos, active)?;
        let labels = match label {
          Some(name) => vec![BoundArg { label: Arc::from(name.as_str()), value: v.clone() }],
          None => Vec::new(),
        };
        Ok((np, v, labels))
      }
      _ => self.eval_plain(op, pos, active).map(|(p, v)| (p, v, Vec::new())),
    }
  }

  fn eval_sequence(&mut self, ops: &[Op], pos: usize) -> Result<(usize, Value, Vec<BoundArg>), ()> {
    let mut cur = pos;
    let mut results = Vec::with_capacity(ops.len());
    let mut labels: Vec<BoundArg> = Vec::new();
    for op in ops {
      match op {
        Op::Labeled { label, inner, .. } => {
          let (np, v) = self.eval(inner, cur, &labels)?;
          cur = np;
          if let Some(name) = label {
            labels.push(BoundArg { label: Arc::from(name.as_str()), value: v.clone() });
          }
          results.push(v);
        }
        other => {
          let (np, v) = self.eval(other, cur, &labels)?;
          cur = np;
          results.push(v);
        }
      }
    }

    let has_pick = ops.iter().any(|o| matches!(o, Op::Labeled { pick: true, .. }));
    let value = if has_pick {
      let picks: Vec<Value> =
        ops.iter().zip(results.iter()).filter(|(o, _)| matches!(o, Op::Labeled { pick: true, .. })).map(|(_, v)| v.clone()).collect();
      if picks.len() == 1 {
        picks.into_iter().next().unwrap()
      } else {
        Value::Tuple(picks)
      }
    } else {
      Value::Tuple(results)
    };

    Ok((cur, value, labels))
  }

  fn eval_plain(&mut self, op: &Op, pos: usize, active: &[BoundArg]) -> EvalResult {
    match op {
      Op::Literal(idx) => self.eval_literal(*idx, pos),
      Op::Class(idx) => self.eval_class(*idx, pos),
      Op::Any { .. } => self.eval_any(pos),
      Op::CallRule(id) => self.eval_rule(*id, pos),
      Op::CallImport { binding, rule } => self.eval_import(binding, rule, pos),
      Op::Sequence(_) | Op::Group(_) | Op::Labeled { .. } => unreachable!("handled by eval_with_labels"),
      Op::Choice(alts) => self.eval_choice(alts, pos, active),
      Op::Optional(inner) => match self.eval(inner, pos, active) {
        Ok(r) => Ok(r),
        Err(()) => Ok((pos, Value::Null)),
      },
      Op::ZeroOrMore(inner) => self.eval_repeat(inner, pos, 0, None, None, active),
      Op::OneOrMore(inner) => self.eval_repeat(inner, pos, 1, None, None, active),
      Op::Repeated { inner, min, max, delimiter } => {
        let min = self.resolve_boundary(min, active);
        let max = self.resolve_boundary(max, active);
        self.eval_repeat(inner, pos, min, Some(max), delimiter.as_ref(), active)
      }
      Op::Text(inner) => {
        let (np, _) = self.eval(inner, pos, active)?;
        Ok((np, Value::Str(Arc::from(&self.text[pos..np]))))
      }
      Op::SimpleAnd(inner) => {
        self.silent += 1;
        let r = self.eval(inner, pos, active);
        self.silent -= 1;
        r.map(|_| (pos, Value::Null))
      }
      Op::SimpleNot(inner) => {
        self.silent += 1;
        let r = self.eval(inner, pos, active);
        self.silent -= 1;
        match r {
          Ok(_) => Err(()),
          Err(()) => Ok((pos, Value::Null)),
        }
      }
      Op::SemanticAnd(fid) => {
        if self.call_predicate(*fid, pos, active) {
          Ok((pos, Value::Null))
        } else {
          Err(())
        }
      }
      Op::SemanticNot(fid) => {
        if self.call_predicate(*fid, pos, active) {
          Err(())
        } else {
          Ok((pos, Value::Null))
        }
      }
      Op::Action { inner, function } => {
        let (np, _, labels) = self.eval_with_labels(inner, pos, &[])?;
        let matched = &self.text[pos..np];
        match self.host.call_action(&self.current_rule, *function, &labels, matched) {
          Ok(v) => Ok((np, v)),
          Err(_) => Err(()),
        }
      }
      Op::Named { name, inner } => {
        self.silent += 1;
        let r = self.eval(inner, pos, active);
        self.silent -= 1;
        match r {
          Ok(r) => Ok(r),
          Err(()) => {
            self.record_fail(pos, ExpectedDescription::Named(name.clone()));
            Err(())
          }
        }
      }
    }
  }

  fn eval_literal(&mut self, idx: u32, pos: usize) -> EvalResult {
    let lit = &self.program.constants.literals[idx as usize];
    let len = lit.text.len();
    let slice = self.text.get(pos..pos.saturating_add(len));
    let matched = match slice {
      Some(s) if lit.case_insensitive => s.eq_ignore_ascii_case(lit.text.as_ref()) || s.to_lowercase() == lit.text.to_lowercase(),
      Some(s) => s == lit.text.as_ref(),
      None => false,
    };
    if matched {
      Ok((pos + len, Value::Str(Arc::from(slice.unwrap()))))
    } else {
      self.record_fail(pos, ExpectedDescription::Literal(lit.text.to_string()));
      Err(())
    }
  }

  fn eval_class(&mut self, idx: u32, pos: usize) -> EvalResult {
    let class = &self.program.constants.classes[idx as usize];
    match self.text[pos..].chars().next() {
      Some(c) if class.matches(c) => Ok((pos + c.len_utf8(), Value::Str(Arc::from(c.to_string())))),
      _ => {
        self.record_fail(pos, ExpectedDescription::Class(class.display.to_string()));
        Err(())
      }
    }
  }

  fn eval_any(&mut self, pos: usize) -> EvalResult {
    match self.text[pos..].chars().next() {
      Some(c) => Ok((pos + c.len_utf8(), Value::Str(Arc::from(c.to_string())))),
      None => {
        self.record_fail(pos, ExpectedDescription::AnyCharacter);
        Err(())
      }
    }
  }

  fn eval_import(&mut self, binding: &str, rule: &str, pos: usize) -> EvalResult {
    let Some(program) = self.imports.get(binding).cloned() else {
      self.record_fail(pos, ExpectedDescription::Named(format!("import '{binding}.{rule}'")));
      return Err(());
    };
    let Some(rule_id) = program.rule_id(rule) else {
      self.record_fail(pos, ExpectedDescription::Named(format!("import '{binding}.{rule}'")));
      return Err(());
    };

    let mut sub = Interpreter {
      program: &program,
      text: self.text,
      imports: self.imports,
      source: self.source.clone(),
      cache_enabled: false,
      cache: HashMap::new(),
      max_fail_pos: 0,
      max_fail_expected: BTreeSet::new(),
      silent: self.silent,
      host: self.host,
      tracer: self.tracer.as_deref_mut(),
      current_rule: String::new(),
    };
    let result = sub.eval_rule(rule_id, pos);
    // Imports are a new grammar entirely; no label scope carries across.
    if sub.max_fail_pos > self.max_fail_pos {
      self.max_fail_pos = sub.max_fail_pos;
      self.max_fail_expected = sub.max_fail_expected;
    }
    result
  }

  fn eval_choice(&mut self, alts: &[Op], pos: usize, active: &[BoundArg]) -> EvalResult {
    for alt in alts {
      match self.eval(alt, pos, active) {
        Ok(r) => return Ok(r),
        Err(()) => continue,
      }
    }
    Err(())
  }

  fn eval_repeat(
    &mut self,
    inner: &Op,
    pos: usize,
    min: u32,
    max: Option<u32>,
    delimiter: Option<&crate::bytecode::Delimiter>,
    active: &[BoundArg],
  ) -> EvalResult {
    let mut cur = pos;
    let mut items = Vec::new();

    loop {
      if let Some(max) = max {
        if items.len() as u32 >= max {
          break;
        }
      }

      let attempt_start = cur;
      let mut before_delim = cur;

      if !items.is_empty() {
        if let Some(delim) = delimiter {
          match self.eval(&delim.op, cur, active) {
            Ok((np, _)) => before_delim = np,
            Err(()) => break,
          }
        }
      }

      match self.eval(inner, before_delim, active) {
        Ok((np, v)) => {
          if np == attempt_start && !items.is_empty() {
            // Zero-width iteration guard: stop rather than loop forever
            // when emptiness could not be ruled out statically
            break;
          }
          items.push(v);
          cur = np;
        }
        Err(()) => break,
      }
    }

    if (items.len() as u32) < min {
      return Err(());
    }

    Ok((cur, Value::List(items)))
  }

  fn resolve_boundary(&mut self, boundary: &Boundary, active: &[BoundArg]) -> u32 {
    match boundary {
      Boundary::Constant(n) => *n,
      Boundary::Variable(name) => active
        .iter()
        .find(|b| b.label.as_ref() == name.as_str())
        .and_then(|b| match &b.value {
          Value::Int(i) if *i >= 0 => Some(*i as u32),
          _ => None,
        })
        .unwrap_or(0),
      Boundary::Code(fid) => match self.host.call_action(&self.current_rule, *fid, active, "") {
        Ok(Value::Int(i)) if i >= 0 => i as u32,
        _ => 0,
      },
    }
  }

  fn call_predicate(&mut self, fid: FunctionId, pos: usize, args: &[BoundArg]) -> bool {
    debug_assert_eq!(self.program.constants.functions[fid as usize].kind, FunctionKind::Predicate);
    let matched = &self.text[pos..pos];
    self.host.call_predicate(&self.current_rule, fid, args, matched)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::bytecode::{ClassPart, CompiledClass, FunctionDescriptor, LiteralConst, Rule as CompiledRule};
  use crate::value::{ActionFailure, NullActionHost};
  use std::collections::HashMap as Map;

  fn literal_program(text: &str) -> Program {
    let mut constants = crate::bytecode::ConstantPool::default();
    let idx = constants.push_literal(text, false);
    let rule = CompiledRule { name: "start".into(), display_name: None, body: Op::Literal(idx), cacheable: false };
    Program { grammar_name: "g".into(), rules: vec![rule], by_name: Map::from([("start".to_string(), RuleId(0))]), constants, start_rules: vec!["start".into()] }
  }

  #[test]
  fn matches_a_literal() {
    let program = Arc::new(literal_program("a"));
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = NullActionHost;
    let result = parser.parse("a", &ParseOptions::default(), &host, None).unwrap();
    assert_eq!(result, Value::Str(Arc::from("a")));
  }

  #[test]
  fn failed_literal_reports_expected_and_found() {
    let program = Arc::new(literal_program("a"));
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = NullActionHost;
    let err = parser.parse("b", &ParseOptions::default(), &host, None).unwrap_err();
    assert!(err.message.contains("\"a\""));
    assert_eq!(err.found.as_deref(), Some("b"));
  }

  #[test]
  fn display_name_replaces_the_inner_expected_description_on_failure() {
    let mut constants = crate::bytecode::ConstantPool::default();
    let idx = constants.push_literal("a", false);
    let rule = CompiledRule { name: "start".into(), display_name: Some("letter a".into()), body: Op::Literal(idx), cacheable: false };
    let program = Arc::new(Program {
      grammar_name: "g".into(),
      rules: vec![rule],
      by_name: Map::from([("start".to_string(), RuleId(0))]),
      constants,
      start_rules: vec!["start".into()],
    });
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = NullActionHost;
    let err = parser.parse("b", &ParseOptions::default(), &host, None).unwrap_err();
    assert!(err.message.contains("letter a"), "message was: {}", err.message);
    assert!(!err.message.contains("\"a\""), "message was: {}", err.message);
  }

  #[test]
  fn ordered_choice_commits_to_first_match() {
    let mut constants = crate::bytecode::ConstantPool::default();
    let a = constants.push_literal("a", false);
    let ab = constants.push_literal("ab", false);
    let body = Op::Choice(vec![Op::Literal(a), Op::Literal(ab)]);
    let rule = CompiledRule { name: "start".into(), display_name: None, body, cacheable: false };
    let program = Arc::new(Program {
      grammar_name: "g".into(),
      rules: vec![rule],
      by_name: Map::from([("start".to_string(), RuleId(0))]),
      constants,
      start_rules: vec!["start".into()],
    });
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = NullActionHost;
    // "ab" should fail overall: first alternative "a" commits, leaving "b"
    // unconsumed, and ordered choice never backtracks to try "ab".
    let err = parser.parse("ab", &ParseOptions::default(), &host, None).unwrap_err();
    assert!(err.message.contains("end of input"));
  }

  #[test]
  fn library_mode_reports_partial_progress() {
    let mut constants = crate::bytecode::ConstantPool::default();
    let a = constants.push_literal("a", false);
    let rule =
      CompiledRule { name: "start".into(), display_name: None, body: Op::OneOrMore(Box::new(Op::Literal(a))), cacheable: false };
    let program = Arc::new(Program {
      grammar_name: "g".into(),
      rules: vec![rule],
      by_name: Map::from([("start".to_string(), RuleId(0))]),
      constants,
      start_rules: vec!["start".into()],
    });
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = NullActionHost;
    let lib = parser
      .parse_library("aab", &ParseOptions { start_rule: None, library_mode: true }, &host, None)
      .unwrap();
    assert!(!lib.success);
    assert_eq!(lib.max_fail_pos.offset, 2);
    assert_eq!(lib.result, Some(Value::List(vec![Value::Str(Arc::from("a")), Value::Str(Arc::from("a"))])));
  }

  #[test]
  fn class_matching_respects_inversion() {
    let mut constants = crate::bytecode::ConstantPool::default();
    let class = constants.push_class(CompiledClass {
      parts: vec![ClassPart::Range('0', '9')],
      inverted: true,
      case_insensitive: false,
      unicode: false,
      display: Arc::from("[^0-9]"),
    });
    let rule = CompiledRule { name: "start".into(), display_name: None, body: Op::Class(class), cacheable: false };
    let program = Arc::new(Program {
      grammar_name: "g".into(),
      rules: vec![rule],
      by_name: Map::from([("start".to_string(), RuleId(0))]),
      constants,
      start_rules: vec!["start".into()],
    });
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = NullActionHost;
    assert!(parser.parse("x", &ParseOptions::default(), &host, None).is_ok());
    assert!(parser.parse("5", &ParseOptions::default(), &host, None).is_err());
  }

  #[test]
  fn cache_is_transparent() {
    let text = LiteralConst { text: Arc::from("a"), case_insensitive: false };
    let _ = text; // sanity only
    let program = Arc::new(literal_program("a"));
    let uncached = Parser::new(program.clone(), vec!["start".into()], GrammarSource::new("g"));
    let cached = Parser::new(program, vec!["start".into()], GrammarSource::new("g")).with_cache(true);
    let host = NullActionHost;
    let a = uncached.parse("a", &ParseOptions::default(), &host, None);
    let b = cached.parse("a", &ParseOptions::default(), &host, None);
    assert_eq!(a.is_ok(), b.is_ok());
  }

  #[test]
  fn predicate_sees_labels_bound_earlier_in_the_same_sequence() {
    struct CheckHost;
    impl ActionHost for CheckHost {
      fn call_action(&self, rule: &str, idx: FunctionId, args: &[BoundArg], matched: &str) -> Result<Value, ActionFailure> {
        NullActionHost.call_action(rule, idx, args, matched)
      }
      fn call_predicate(&self, _rule: &str, _idx: FunctionId, args: &[BoundArg], _matched: &str) -> bool {
        args.len() == 1 && args[0].label.as_ref() == "a" && args[0].value == Value::Str(Arc::from("x"))
      }
    }

    let mut constants = crate::bytecode::ConstantPool::default();
    let lit = constants.push_literal("x", false);
    let fid = constants.push_function(FunctionDescriptor {
      kind:   FunctionKind::Predicate,
      source: Arc::from(""),
      params: vec!["a".to_string()],
      span:   crate::position::Span::point(GrammarSource::new("g"), Position::start()),
    });
    let body = Op::Sequence(vec![
      Op::Labeled { label: Some("a".to_string()), inner: Box::new(Op::Literal(lit)), pick: false },
      Op::SemanticAnd(fid),
    ]);
    let rule = CompiledRule { name: "start".into(), display_name: None, body, cacheable: false };
    let program = Arc::new(Program {
      grammar_name: "g".into(),
      rules: vec![rule],
      by_name: Map::from([("start".to_string(), RuleId(0))]),
      constants,
      start_rules: vec!["start".into()],
    });
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    let host = CheckHost;
    assert!(parser.parse("x", &ParseOptions::default(), &host, None).is_ok());
  }

  #[test]
  fn boundary_variable_resolves_against_the_label_bound_before_it() {
    let mut constants = crate::bytecode::ConstantPool::default();
    let count_fn = constants.push_function(FunctionDescriptor {
      kind:   FunctionKind::Action,
      source: Arc::from("2"),
      params: vec![],
      span:   crate::position::Span::point(GrammarSource::new("g"), Position::start()),
    });
    let a_lit = constants.push_literal("a", false);
    let body = Op::Sequence(vec![
      Op::Labeled {
        label: Some("n".to_string()),
        inner: Box::new(Op::Action { inner: Box::new(Op::Literal(a_lit)), function: count_fn }),
        pick:  false,
      },
      Op::Repeated {
        inner:     Box::new(Op::Literal(a_lit)),
        min:       Boundary::Constant(0),
        max:       Boundary::Variable("n".to_string()),
        delimiter: None,
      },
    ]);
    let rule = CompiledRule { name: "start".into(), display_name: None, body, cacheable: false };
    let program = Arc::new(Program {
      grammar_name: "g".into(),
      rules: vec![rule],
      by_name: Map::from([("start".to_string(), RuleId(0))]),
      constants,
      start_rules: vec!["start".into()],
    });
    let parser = Parser::new(program, vec!["start".into()], GrammarSource::new("g"));
    struct IntHost;
    impl ActionHost for IntHost {
      fn call_action(&self, _rule: &str, _idx: FunctionId, _args: &[BoundArg], _matched: &str) -> Result<Value, ActionFailure> {
        Ok(Value::Int(2))
      }
      fn call_predicate(&self, _rule: &str, _idx: FunctionId, _args: &[BoundArg], _matched: &str) -> bool {
        true
      }
    }
    let host = IntHost;
    // First "a" is consumed by the labeled action (always reporting 2), then
    // at most 2 more "a"s are allowed — "aaa" leaves none unconsumed, "aaaa"
    // leaves one, which fails since a successful parse must consume all input.
    assert!(parser.parse("aaaa", &ParseOptions::default(), &host, None).is_err());
    assert!(parser.parse("aaa", &ParseOptions::default(), &host, None).is_ok());
  }
}
