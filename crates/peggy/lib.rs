//! The facade crate: `generate()` wires the grammar parser, the standard
//! analysis passes, the bytecode generator, and the emitter into the single
//! entry point a caller (library user or the `peggy-cli` binary) uses.
use std::fmt;
use std::sync::Arc;

use peggy_core::analysis::{PassManager, Plugin};
use peggy_core::diagnostics::{PeggyError, Problem};
use peggy_core::parser::{parse_sources, SourceFragment};
pub use peggy_core::types::Grammar;
use peggy_rust_runtime::{GrammarSource, Parser};

pub use peggy_emit::{EmitOptions, ModuleFormat, SourceMap};

/// One named grammar source fragment. `generate` concatenates every fragment
/// it is given (`peggy_core::parser::parse_sources`'s "one or more source
/// fragments" semantics).
pub type GrammarSourceText = SourceFragment;

/// Which shape `generate` should hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
  /// A callable, `Send + Sync` parser built directly over the bytecode.
  Parser,
  /// Rendered Rust source text.
  Source,
  /// Rendered Rust source text plus a line-level source map.
  SourceAndMap,
  /// The analyzed grammar AST, for tooling that wants a structural dump.
  Ast,
}

impl Default for OutputKind {
  fn default() -> Self {
    OutputKind::Parser
  }
}

/// A diagnostic sink keyed by pass name, e.g. `GenerateOptions::info`.
pub type DiagnosticSink = Arc<dyn Fn(&Problem) + Send + Sync>;

/// Every option `generate` recognizes. Builder-style (`fn foo(mut self, ...)
/// -> Self`) so the CLI can assemble one from parsed arguments the same way
/// a library caller would.
#[derive(Clone, Default)]
pub struct GenerateOptions {
  pub allowed_start_rules: Vec<String>,
  pub cache:               bool,
  pub trace:               bool,
  pub output:               OutputKind,
  pub format:               ModuleFormat,
  pub dependencies:         Vec<(String, String)>,
  pub export_var:           String,
  pub plugins:              Vec<Arc<dyn Plugin>>,
  pub grammar_source:       Option<String>,
  pub info:                 Option<DiagnosticSink>,
  pub warning:              Option<DiagnosticSink>,
}

impl fmt::Debug for GenerateOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GenerateOptions")
      .field("allowed_start_rules", &self.allowed_start_rules)
      .field("cache", &self.cache)
      .field("trace", &self.trace)
      .field("output", &self.output)
      .field("format", &self.format)
      .field("dependencies", &self.dependencies)
      .field("export_var", &self.export_var)
      .field("plugins", &self.plugins.len())
      .field("grammar_source", &self.grammar_source)
      .field("info", &self.info.is_some())
      .field("warning", &self.warning.is_some())
      .finish()
  }
}

impl GenerateOptions {
  pub fn allowed_start_rules(mut self, rules: Vec<String>) -> Self {
    self.allowed_start_rules = rules;
    self
  }

  pub fn cache(mut self, enable: bool) -> Self {
    self.cache = enable;
    self
  }

  pub fn trace(mut self, enable: bool) -> Self {
    self.trace = enable;
    self
  }

  pub fn output(mut self, kind: OutputKind) -> Self {
    self.output = kind;
    self
  }

  pub fn format(mut self, format: ModuleFormat) -> Self {
    self.format = format;
    self
  }

  pub fn dependencies(mut self, deps: Vec<(String, String)>) -> Self {
    self.dependencies = deps;
    self
  }

  pub fn export_var(mut self, name: impl Into<String>) -> Self {
    self.export_var = name.into();
    self
  }

  pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
    self.plugins.push(plugin);
    self
  }

  pub fn grammar_source(mut self, tag: impl Into<String>) -> Self {
    self.grammar_source = Some(tag.into());
    self
  }

  pub fn info(mut self, sink: DiagnosticSink) -> Self {
    self.info = Some(sink);
    self
  }

  pub fn warning(mut self, sink: DiagnosticSink) -> Self {
    self.warning = Some(sink);
    self
  }
}

/// The result of a successful `generate` call, one variant per
/// [`OutputKind`].
pub enum GenerateOutput {
  Parser(Parser),
  Source(String),
  SourceAndMap(String, SourceMap),
  Ast(Grammar),
}

/// Parses `sources`, runs the standard analysis passes (plus anything
/// `options.plugins` appends), and produces whichever shape `options.output`
/// asks for. Analysis errors (and any `Syntax` error from the parser) abort
/// before the bytecode generator or emitter ever run.
pub fn generate(sources: Vec<GrammarSourceText>, options: GenerateOptions) -> Result<GenerateOutput, PeggyError> {
  let grammar = parse_sources(&sources)?;

  let mut mgr = PassManager::standard(options.allowed_start_rules.clone());
  for plugin in &options.plugins {
    plugin.register(&mut mgr)?;
  }

  let journal = mgr.run(&grammar);
  for problem in journal.warnings() {
    if let Some(sink) = &options.warning {
      sink(problem);
    }
  }
  if let Some(sink) = &options.info {
    for problem in journal.errors() {
      sink(problem);
    }
  }
  if let Some(err) = journal.into_error() {
    return Err(err);
  }

  if matches!(options.output, OutputKind::Ast) {
    return Ok(GenerateOutput::Ast(grammar));
  }

  let grammar_name = options.grammar_source.clone().unwrap_or_else(|| "grammar".to_string());
  let lower_options = peggy_bytecode::LowerOptions { grammar_name: grammar_name.clone(), start_rules: options.allowed_start_rules.clone() };
  let program = peggy_bytecode::lower_grammar(&grammar, &lower_options);

  match options.output {
    OutputKind::Parser => {
      let parser = Parser::new(Arc::new(program), program_start_rules(&grammar, &options), GrammarSource::new(grammar_name)).with_cache(options.cache);
      Ok(GenerateOutput::Parser(parser))
    }
    OutputKind::Source | OutputKind::SourceAndMap => {
      let emit_options = EmitOptions {
        format:       options.format,
        export_var:   options.export_var.clone(),
        dependencies: options.dependencies.clone(),
        source_map:   matches!(options.output, OutputKind::SourceAndMap),
        trace:        options.trace,
      };
      let (source, map) = peggy_emit::emit(&program, &emit_options);
      match map {
        Some(map) => Ok(GenerateOutput::SourceAndMap(source, map)),
        None => Ok(GenerateOutput::Source(source)),
      }
    }
    OutputKind::Ast => unreachable!("handled above"),
  }
}

/// The allowed-start-rule set a returned `Parser` enforces at parse time,
/// expanded the same way the bytecode generator expands `["*"]`/empty.
fn program_start_rules(grammar: &Grammar, options: &GenerateOptions) -> Vec<String> {
  if options.allowed_start_rules.iter().any(|s| s == "*") {
    return grammar.rule_names().into_iter().map(str::to_string).collect();
  }
  if options.allowed_start_rules.is_empty() {
    return grammar.rules.first().map(|r| vec![r.name.clone()]).unwrap_or_default();
  }
  options.allowed_start_rules.clone()
}

#[cfg(test)]
mod test {
  use super::*;

  fn src(text: &str) -> Vec<GrammarSourceText> {
    vec![GrammarSourceText::new("test.peggy", text)]
  }

  #[test]
  fn generates_a_working_parser_for_a_literal_rule() {
    let out = generate(src("start = 'a'"), GenerateOptions::default().output(OutputKind::Parser)).unwrap();
    let GenerateOutput::Parser(parser) = out else { panic!("expected Parser") };
    let host = peggy_rust_runtime::NullActionHost;
    assert!(parser.parse("a", &peggy_rust_runtime::ParseOptions::default(), &host, None).is_ok());
    assert!(parser.parse("b", &peggy_rust_runtime::ParseOptions::default(), &host, None).is_err());
  }

  #[test]
  fn ast_output_returns_the_analyzed_grammar() {
    let out = generate(src("start = 'a'"), GenerateOptions::default().output(OutputKind::Ast)).unwrap();
    let GenerateOutput::Ast(grammar) = out else { panic!("expected Ast") };
    assert_eq!(grammar.rule_names(), vec!["start"]);
  }

  #[test]
  fn source_output_renders_rust_text_mentioning_the_grammar_name() {
    let out = generate(
      src("start = 'a'"),
      GenerateOptions::default().output(OutputKind::Source).grammar_source("literal_a"),
    )
    .unwrap();
    let GenerateOutput::Source(text) = out else { panic!("expected Source") };
    assert!(text.contains("literal_a"));
    assert!(text.contains("fn parse"));
  }

  #[test]
  fn source_and_map_output_carries_a_populated_source_map() {
    let out = generate(src("start = x:'a' { x }"), GenerateOptions::default().output(OutputKind::SourceAndMap)).unwrap();
    let GenerateOutput::SourceAndMap(_, map) = out else { panic!("expected SourceAndMap") };
    assert!(map.lookup(u32::MAX).is_some());
  }

  #[test]
  fn trace_option_adds_a_tracer_parameter_to_the_rendered_entry_point() {
    let out = generate(src("start = 'a'"), GenerateOptions::default().output(OutputKind::Source).trace(true)).unwrap();
    let GenerateOutput::Source(text) = out else { panic!("expected Source") };
    assert!(text.contains("tracer: Option<&mut dyn peggy_rust_runtime::Tracer>"));
  }

  #[test]
  fn undefined_rule_reference_is_a_semantic_error_not_a_panic() {
    let err = generate(src("start = missing"), GenerateOptions::default()).unwrap_err();
    assert!(matches!(err, PeggyError::Semantic { .. }));
  }

  #[test]
  fn star_allowed_start_rules_exposes_every_rule_to_the_parser() {
    let out = generate(
      src("a = 'x'\nb = 'y'"),
      GenerateOptions::default().allowed_start_rules(vec!["*".to_string()]).output(OutputKind::Parser),
    )
    .unwrap();
    let GenerateOutput::Parser(parser) = out else { panic!("expected Parser") };
    let host = peggy_rust_runtime::NullActionHost;
    let mut opts = peggy_rust_runtime::ParseOptions::default();
    opts.start_rule = Some("b".to_string());
    assert!(parser.parse("y", &opts, &host, None).is_ok());
  }
}
