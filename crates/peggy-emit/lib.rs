//! Renders a compiled [`peggy_rust_runtime::Program`] as Rust source text, in
//! one of the module-wrapping conventions `ModuleFormat` names, plus an
//! optional line-level source map back to the grammar it came from.
//!
//! The generated file depends on `peggy_rust_runtime` (a small, stable crate
//! with no compiler-side dependencies of its own) rather than re-embedding a
//! second copy of the interpreter as literal text: a generated parser links
//! that runtime crate at the target's own build time instead (see
//! `DESIGN.md`). What gets generated is a literal reconstruction of the
//! `Program` value, not a restatement of the grammar as hand-written
//! recursive-descent code — the interpreter in `peggy_rust_runtime::vm` is
//! the single source of truth for how an `Op` tree is evaluated, at
//! compile time and in any file this crate emits.
mod render;
mod sourcemap;

pub use sourcemap::SourceMap;

use peggy_rust_runtime::Program;

/// Rust-target reinterpretation of the `format` option:
/// each variant controls how the emitted items are wrapped, not a JS loader
/// shim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModuleFormat {
  /// A free-standing `fn parse(...)` plus supporting items, no module wrapper.
  #[default]
  Bare,
  /// Wraps the generated items in `pub mod generated`, re-exporting `parse`.
  CommonJs,
  /// Gathers `dependencies` as `use` statements at the top of the module.
  Amd,
  /// Emits both a module-mode `use` block and fully-qualified inline paths,
  /// so the same snippet compiles either pasted inline or as a submodule.
  Umd,
  /// `pub mod generated` with `pub` visibility on every dispatch item.
  Es,
  /// A `pub static` dispatch table named by `export_var` alongside the module.
  Globals,
}

/// Mirrors `GenerateOptions`' emitter-facing fields: everything
/// the renderer needs beyond the compiled `Program` itself.
#[derive(Clone, Debug)]
pub struct EmitOptions {
  pub format:      ModuleFormat,
  /// `export_var`: the identifier `format: "globals"` attaches
  /// the dispatch table to. Ignored by every other format.
  pub export_var:  String,
  /// Extra `use` paths gathered into the module header for `amd`/`umd`
  /// (`path`, `alias`) pairs, e.g. `("serde_json::Value", "JsonValue")`.
  pub dependencies: Vec<(String, String)>,
  pub source_map:  bool,
  /// Whether the rendered `parse` function accepts a `tracer` parameter. When
  /// false, the generated entry point always runs with `None` and the
  /// VM's trace call sites are simply no-ops.
  pub trace:       bool,
}

impl Default for EmitOptions {
  fn default() -> Self {
    Self { format: ModuleFormat::default(), export_var: "PARSER".to_string(), dependencies: Vec::new(), source_map: false, trace: false }
  }
}

/// Renders `program` as Rust source text per `options.format`, with an
/// optional source map when `options.source_map` is set
/// (`GenerateOutput::SourceAndMap`).
pub fn emit(program: &Program, options: &EmitOptions) -> (String, Option<SourceMap>) {
  let mut out = render::Renderer::new(program, options);
  let source = out.render();
  let map = options.source_map.then(|| out.into_source_map());
  (source, map)
}
