//! Compiler: AST → compiled unit → emitted image pair.

pub mod ast;
pub mod bytecode;
pub mod compile;
pub mod unit;

pub use compile::compile_unit;
pub use unit::{emit, CompiledArtifact, CompiledUnit, ENTRY_NAME};
