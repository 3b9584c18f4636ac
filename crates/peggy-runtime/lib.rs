//! # peggy_rust_runtime
//!
//! Primitives shared between compile-time (the grammar AST, annotated by
//! `peggy_core`) and run-time (the bytecode interpreter below, and any source text
//! `peggy_emit` renders). Nothing in this crate depends on the grammar AST or the
//! bytecode generator; it is the lowest layer of the workspace, with no
//! dependency running back up toward the compiler crates.
pub mod bytecode;
pub mod error;
pub mod position;
pub mod properties;
pub mod tracer;
pub mod value;
pub mod vm;

pub use bytecode::{
  Boundary, ClassPart, CompiledClass, ConstIdx, ConstantPool, Delimiter, FunctionDescriptor, FunctionId, FunctionKind, LiteralConst, Op,
  Program, Rule, RuleId,
};
pub use error::{ExpectedDescription, ParseError, SourceRecord};
pub use position::{GrammarSource, Position, Span};
pub use properties::resolve_unicode_property;
pub use tracer::{DefaultTracer, TraceEvent, TraceEventKind, Tracer};
pub use value::{ActionFailure, ActionHost, BoundArg, CodeSite, NullActionHost, Value};
pub use vm::{LibraryResult, ParseOptions, Parser};
