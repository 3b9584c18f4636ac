//! The actual text renderer: reconstructs a `Program` as a Rust literal,
//! splices every action/predicate/boundary's opaque source text into its own
//! named function, and wires a generated `ActionHost` that dispatches to
//! them by constant-pool index.
use peggy_rust_runtime::{Boundary, ClassPart, CompiledClass, FunctionDescriptor, FunctionKind, LiteralConst, Op, Program, Rule, Span};

use crate::sourcemap::SourceMap;
use crate::{EmitOptions, ModuleFormat};

pub(crate) struct Renderer<'a> {
  program: &'a Program,
  options: &'a EmitOptions,
  buf:     String,
  line:    u32,
  entries: Vec<(u32, Span)>,
}

impl<'a> Renderer<'a> {
  pub(crate) fn new(program: &'a Program, options: &'a EmitOptions) -> Self {
    Self { program, options, buf: String::new(), line: 1, entries: Vec::new() }
  }

  pub(crate) fn into_source_map(self) -> SourceMap {
    SourceMap { entries: self.entries }
  }

  fn push_line(&mut self, text: &str) {
    self.buf.push_str(text);
    self.buf.push('\n');
    self.line += 1;
  }

  fn push_lines(&mut self, text: &str) {
    for line in text.lines() {
      self.push_line(line);
    }
  }

  fn note(&mut self, span: &Span) {
    self.entries.push((self.line, span.clone()));
  }

  pub(crate) fn render(&mut self) -> String {
    self.header();
    self.module_open();
    self.functions();
    self.host();
    self.program_fn();
    self.entry_point();
    self.module_close();
    std::mem::take(&mut self.buf)
  }

  fn header(&mut self) {
    self.push_line(&format!("// Generated by peggy from grammar `{}`. Do not edit by hand.", self.program.grammar_name));
    if matches!(self.options.format, ModuleFormat::Umd) {
      self.push_line("#[cfg(feature = \"module\")]");
      self.push_line("use peggy_rust_runtime::{ActionFailure, ActionHost, BoundArg, ParseOptions, Parser, Program, Value};");
    }
    for (path, alias) in &self.options.dependencies {
      self.push_line(&format!("use {path} as {alias};"));
    }
  }

  fn module_open(&mut self) {
    match self.options.format {
      ModuleFormat::CommonJs => self.push_line("pub mod generated {"),
      ModuleFormat::Es => self.push_line("pub mod generated {"),
      _ => {}
    }
  }

  fn module_close(&mut self) {
    match self.options.format {
      ModuleFormat::CommonJs => {
        self.push_line("  pub use self::parse;");
        self.push_line("}");
      }
      ModuleFormat::Es => {
        self.push_line("  pub use self::parse;");
        self.push_line("}");
      }
      _ => {}
    }
  }

  fn vis(&self) -> &'static str {
    match self.options.format {
      ModuleFormat::Es => "pub ",
      _ => "",
    }
  }

  /// One named Rust function per action/predicate/boundary descriptor, its
  /// body the descriptor's opaque source text spliced in verbatim.
  fn functions(&mut self) {
    for (idx, f) in self.program.constants.functions.iter().enumerate() {
      self.note(&f.span);
      let vis = self.vis();
      match f.kind {
        FunctionKind::Action => {
          let params = render_params(f);
          self.push_line(&format!("{vis}fn peggy_action_{idx}({params}) -> Result<peggy_rust_runtime::Value, peggy_rust_runtime::ActionFailure> {{"));
          self.push_lines(&indent(&f.source));
          self.push_line("}");
        }
        FunctionKind::Predicate => {
          let params = render_params(f);
          self.push_line(&format!("{vis}fn peggy_predicate_{idx}({params}) -> bool {{"));
          self.push_lines(&indent(&f.source));
          self.push_line("}");
        }
        FunctionKind::Boundary => {
          let params = render_params(f);
          self.push_line(&format!("{vis}fn peggy_boundary_{idx}({params}) -> i64 {{"));
          self.push_lines(&indent(&f.source));
          self.push_line("}");
        }
      }
    }
  }

  /// The `ActionHost` a rendered parser runs with: dispatches purely on the
  /// constant-pool index (already unique grammar-wide), ignoring the `rule`
  /// argument that exists only for diagnostics.
  fn host(&mut self) {
    let vis = self.vis();
    self.push_line(&format!("{vis}struct GeneratedHost;"));
    self.push_line("fn peggy_arg<'a>(args: &'a [peggy_rust_runtime::BoundArg], name: &str) -> peggy_rust_runtime::Value {");
    self.push_line("  args.iter().find(|b| b.label.as_ref() == name).map(|b| b.value.clone()).unwrap_or(peggy_rust_runtime::Value::Null)");
    self.push_line("}");
    self.push_line("impl peggy_rust_runtime::ActionHost for GeneratedHost {");
    self.push_line("  fn call_action(&self, _rule: &str, action_index: u32, args: &[peggy_rust_runtime::BoundArg], matched_text: &str) -> Result<peggy_rust_runtime::Value, peggy_rust_runtime::ActionFailure> {");
    self.push_line("    match action_index {");
    for (idx, f) in self.program.constants.functions.iter().enumerate() {
      let call_args = f.params.iter().map(|p| format!("peggy_arg(args, {p:?})")).collect::<Vec<_>>().join(", ");
      match f.kind {
        FunctionKind::Action => self.push_line(&format!("      {idx} => peggy_action_{idx}({call_args}),")),
        // A code-evaluated repetition boundary is dispatched through
        // `call_action` too (`ActionHost` has no dedicated `call_boundary`);
        // its rendered function returns `i64`, not a `Value`.
        FunctionKind::Boundary => self.push_line(&format!("      {idx} => Ok(peggy_rust_runtime::Value::Int(peggy_boundary_{idx}({call_args}))),")),
        FunctionKind::Predicate => {}
      }
    }
    self.push_line("      _ => Ok(peggy_rust_runtime::Value::Str(std::sync::Arc::from(matched_text))),");
    self.push_line("    }");
    self.push_line("  }");
    self.push_line("  fn call_predicate(&self, _rule: &str, predicate_index: u32, args: &[peggy_rust_runtime::BoundArg], _matched_text: &str) -> bool {");
    self.push_line("    match predicate_index {");
    for (idx, f) in self.program.constants.functions.iter().enumerate() {
      if f.kind != FunctionKind::Predicate {
        continue;
      }
      let call_args = f.params.iter().map(|p| format!("peggy_arg(args, {p:?})")).collect::<Vec<_>>().join(", ");
      self.push_line(&format!("      {idx} => peggy_predicate_{idx}({call_args}),"));
    }
    self.push_line("      _ => true,");
    self.push_line("    }");
    self.push_line("  }");
    self.push_line("}");
  }

  /// A literal reconstruction of `self.program`, so the rest of the file can
  /// build a `Parser` without this workspace at its own compile time —
  /// `peggy_rust_runtime` is the only runtime dependency a caller of the
  /// generated file needs.
  fn program_fn(&mut self) {
    let vis = self.vis();
    self.push_line(&format!("{vis}fn peggy_program() -> peggy_rust_runtime::Program {{"));
    self.push_line("  let mut constants = peggy_rust_runtime::ConstantPool::default();");
    for lit in &self.program.constants.literals {
      self.push_line(&format!("  constants.literals.push({});", render_literal(lit)));
    }
    for class in &self.program.constants.classes {
      self.push_line(&format!("  constants.classes.push({});", render_class(class)));
    }
    for f in &self.program.constants.functions {
      self.push_line(&format!("  constants.functions.push({});", render_function_descriptor(f)));
    }
    self.push_line("  let rules = vec![");
    for rule in &self.program.rules {
      self.push_line(&format!("    {},", render_rule(rule)));
    }
    self.push_line("  ];");
    self.push_line("  let mut by_name = std::collections::HashMap::new();");
    for (name, id) in &self.program.by_name {
      self.push_line(&format!("  by_name.insert({name:?}.to_string(), peggy_rust_runtime::RuleId({}));", id.0));
    }
    let start_rules = self.program.start_rules.iter().map(|s| format!("{s:?}.to_string()")).collect::<Vec<_>>().join(", ");
    self.push_line("  peggy_rust_runtime::Program {");
    self.push_line(&format!("    grammar_name: {:?}.to_string(),", self.program.grammar_name));
    self.push_line("    rules,");
    self.push_line("    by_name,");
    self.push_line("    constants,");
    self.push_line(&format!("    start_rules: vec![{start_rules}],"));
    self.push_line("  }");
    self.push_line("}");
  }

  fn entry_point(&mut self) {
    let vis = self.vis();
    let signature = if self.options.trace {
      "(input: &str, tracer: Option<&mut dyn peggy_rust_runtime::Tracer>)"
    } else {
      "(input: &str)"
    };
    self.push_line(&format!("{vis}fn parse{signature} -> Result<peggy_rust_runtime::Value, peggy_rust_runtime::ParseError> {{"));
    self.push_line("  let program = std::sync::Arc::new(peggy_program());");
    self.push_line(&format!(
      "  let parser = peggy_rust_runtime::Parser::new(program, vec![{}], peggy_rust_runtime::GrammarSource::new({:?}));",
      self.program.start_rules.iter().map(|s| format!("{s:?}.to_string()")).collect::<Vec<_>>().join(", "),
      self.program.grammar_name,
    ));
    self.push_line("  let host = GeneratedHost;");
    if self.options.trace {
      self.push_line("  parser.parse(input, &peggy_rust_runtime::ParseOptions::default(), &host, tracer)");
    } else {
      self.push_line("  parser.parse(input, &peggy_rust_runtime::ParseOptions::default(), &host, None)");
    }
    self.push_line("}");

    if matches!(self.options.format, ModuleFormat::Globals) {
      let fn_type = if self.options.trace {
        "fn(&str, Option<&mut dyn peggy_rust_runtime::Tracer>) -> Result<peggy_rust_runtime::Value, peggy_rust_runtime::ParseError>"
      } else {
        "fn(&str) -> Result<peggy_rust_runtime::Value, peggy_rust_runtime::ParseError>"
      };
      self.push_line(&format!("pub static {}: {fn_type} = parse;", self.options.export_var));
    }
  }
}

fn indent(source: &str) -> String {
  source.lines().map(|l| format!("  {l}")).collect::<Vec<_>>().join("\n")
}

fn render_params(f: &FunctionDescriptor) -> String {
  f.params.iter().map(|p| format!("{p}: peggy_rust_runtime::Value")).collect::<Vec<_>>().join(", ")
}

fn render_literal(lit: &LiteralConst) -> String {
  format!(
    "peggy_rust_runtime::LiteralConst {{ text: std::sync::Arc::from({:?}), case_insensitive: {} }}",
    lit.text.as_ref(),
    lit.case_insensitive
  )
}

fn render_class_part(part: &ClassPart) -> String {
  match part {
    ClassPart::Char(c) => format!("peggy_rust_runtime::ClassPart::Char({c:?})"),
    ClassPart::Range(lo, hi) => format!("peggy_rust_runtime::ClassPart::Range({lo:?}, {hi:?})"),
    ClassPart::Property(name, _, negated) => {
      format!("{{ let (_, p) = peggy_rust_runtime::resolve_unicode_property({name:?}); peggy_rust_runtime::ClassPart::Property({name:?}.to_string(), p, {negated}) }}")
    }
  }
}

fn render_class(class: &CompiledClass) -> String {
  let parts = class.parts.iter().map(render_class_part).collect::<Vec<_>>().join(", ");
  format!(
    "peggy_rust_runtime::CompiledClass {{ parts: vec![{parts}], inverted: {}, case_insensitive: {}, unicode: {}, display: std::sync::Arc::from({:?}) }}",
    class.inverted,
    class.case_insensitive,
    class.unicode,
    class.display.as_ref()
  )
}

fn render_function_descriptor(f: &FunctionDescriptor) -> String {
  let kind = match f.kind {
    FunctionKind::Action => "peggy_rust_runtime::FunctionKind::Action",
    FunctionKind::Predicate => "peggy_rust_runtime::FunctionKind::Predicate",
    FunctionKind::Boundary => "peggy_rust_runtime::FunctionKind::Boundary",
  };
  let params = f.params.iter().map(|p| format!("{p:?}.to_string()")).collect::<Vec<_>>().join(", ");
  format!(
    "peggy_rust_runtime::FunctionDescriptor {{ kind: {kind}, source: std::sync::Arc::from({:?}), params: vec![{params}], span: {} }}",
    f.source.as_ref(),
    render_span(&f.span)
  )
}

fn render_span(span: &Span) -> String {
  format!(
    "peggy_rust_runtime::Span::new(peggy_rust_runtime::GrammarSource::new({:?}), peggy_rust_runtime::Position {{ offset: {}, line: {}, column: {} }}, peggy_rust_runtime::Position {{ offset: {}, line: {}, column: {} }})",
    span.source.as_str(),
    span.start.offset,
    span.start.line,
    span.start.column,
    span.end.offset,
    span.end.line,
    span.end.column,
  )
}

fn render_boundary(boundary: &Boundary) -> String {
  match boundary {
    Boundary::Constant(n) => format!("peggy_rust_runtime::Boundary::Constant({n})"),
    Boundary::Variable(name) => format!("peggy_rust_runtime::Boundary::Variable({name:?}.to_string())"),
    Boundary::Code(fid) => format!("peggy_rust_runtime::Boundary::Code({fid})"),
  }
}

fn render_op(op: &Op) -> String {
  match op {
    Op::Literal(idx) => format!("peggy_rust_runtime::Op::Literal({idx})"),
    Op::Class(idx) => format!("peggy_rust_runtime::Op::Class({idx})"),
    Op::Any { unicode } => format!("peggy_rust_runtime::Op::Any {{ unicode: {unicode} }}"),
    Op::CallRule(id) => format!("peggy_rust_runtime::Op::CallRule(peggy_rust_runtime::RuleId({}))", id.0),
    Op::CallImport { binding, rule } => {
      format!("peggy_rust_runtime::Op::CallImport {{ binding: {binding:?}.to_string(), rule: {rule:?}.to_string() }}")
    }
    Op::Sequence(ops) => format!("peggy_rust_runtime::Op::Sequence(vec![{}])", ops.iter().map(render_op).collect::<Vec<_>>().join(", ")),
    Op::Choice(alts) => format!("peggy_rust_runtime::Op::Choice(vec![{}])", alts.iter().map(render_op).collect::<Vec<_>>().join(", ")),
    Op::Optional(inner) => format!("peggy_rust_runtime::Op::Optional(Box::new({}))", render_op(inner)),
    Op::ZeroOrMore(inner) => format!("peggy_rust_runtime::Op::ZeroOrMore(Box::new({}))", render_op(inner)),
    Op::OneOrMore(inner) => format!("peggy_rust_runtime::Op::OneOrMore(Box::new({}))", render_op(inner)),
    Op::Repeated { inner, min, max, delimiter } => {
      let delim = match delimiter {
        Some(d) => format!("Some(peggy_rust_runtime::Delimiter {{ op: Box::new({}) }})", render_op(&d.op)),
        None => "None".to_string(),
      };
      format!(
        "peggy_rust_runtime::Op::Repeated {{ inner: Box::new({}), min: {}, max: {}, delimiter: {delim} }}",
        render_op(inner),
        render_boundary(min),
        render_boundary(max)
      )
    }
    Op::Group(inner) => format!("peggy_rust_runtime::Op::Group(Box::new({}))", render_op(inner)),
    Op::Labeled { label, inner, pick } => {
      let label = match label {
        Some(s) => format!("Some({s:?}.to_string())"),
        None => "None".to_string(),
      };
      format!("peggy_rust_runtime::Op::Labeled {{ label: {label}, inner: Box::new({}), pick: {pick} }}", render_op(inner))
    }
    Op::Text(inner) => format!("peggy_rust_runtime::Op::Text(Box::new({}))", render_op(inner)),
    Op::SimpleAnd(inner) => format!("peggy_rust_runtime::Op::SimpleAnd(Box::new({}))", render_op(inner)),
    Op::SimpleNot(inner) => format!("peggy_rust_runtime::Op::SimpleNot(Box::new({}))", render_op(inner)),
    Op::SemanticAnd(fid) => format!("peggy_rust_runtime::Op::SemanticAnd({fid})"),
    Op::SemanticNot(fid) => format!("peggy_rust_runtime::Op::SemanticNot({fid})"),
    Op::Action { inner, function } => format!("peggy_rust_runtime::Op::Action {{ inner: Box::new({}), function: {function} }}", render_op(inner)),
    Op::Named { name, inner } => format!("peggy_rust_runtime::Op::Named {{ name: {name:?}.to_string(), inner: Box::new({}) }}", render_op(inner)),
  }
}

fn render_rule(rule: &Rule) -> String {
  let display = match &rule.display_name {
    Some(s) => format!("Some({s:?}.to_string())"),
    None => "None".to_string(),
  };
  format!(
    "peggy_rust_runtime::Rule {{ name: {:?}.to_string(), display_name: {display}, body: {}, cacheable: {} }}",
    rule.name,
    render_op(&rule.body),
    rule.cacheable
  )
}
