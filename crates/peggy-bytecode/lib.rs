//! Lowers a grammar's expression trees into the tree-structured bytecode
//! `peggy_rust_runtime::bytecode` defines, so that both a directly-run
//! interpreter and anything `peggy_emit` renders as source text agree on the
//! same `Program`.
mod class;
mod lower;

pub use lower::{lower_grammar, LowerOptions};
