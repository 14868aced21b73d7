//! # Skiff - An Incremental Scripting Engine
//!
//! Skiff compiles and runs script submissions one at a time against a
//! session that accumulates declarations across submissions, and reports
//! each outcome as exactly one of: success with a return value, compile
//! failure, or execute failure.
//!
//! ## Quick Start
//!
//! ```
//! use skiff::{Engine, Session, Value};
//!
//! let engine = Engine::new();
//! let mut session = Session::new();
//!
//! let result = engine.execute_submission(&mut session, "let x = 21;");
//! assert!(result.is_success());
//!
//! let result = engine.execute_submission(&mut session, "x + x");
//! assert_eq!(result.return_value(), Some(&Value::Int(42)));
//! ```
//!
//! ## Architecture
//!
//! Each submission flows through four stages:
//!
//! 1. **Reader** - Lex and parse the source text
//! 2. **Compiler** - Compile against the session's declarations and emit an
//!    in-memory image pair (primary code image + debug location image)
//! 3. **Loader** - Decode the images into an executable unit
//! 4. **VM** - Invoke the unit's generated entry function with the session
//!
//! Failures at the compile stage short-circuit the pipeline; faults during
//! invocation are captured with their frame stack intact and classified by
//! origin, so engine-side defects are never reported as script errors.

pub mod builtins;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod loader;
pub mod reader;
pub mod repl;
pub mod session;
pub mod symbol;
pub mod value;
pub mod vm;

pub use engine::{CompileFailure, Engine, ExecuteFailure, ExecutionResult};
pub use error::{CompileError, Diagnostic};
pub use loader::{InProcessLoader, LoadError, UnitHandle, UnitLoader};
pub use session::Session;
pub use symbol::{SymbolId, SymbolTable};
pub use value::Value;
pub use vm::{Fault, FaultKind, FaultOrigin, Vm};
