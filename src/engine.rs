//! The submission pipeline and its result model.
//!
//! One inbound operation: [`Engine::execute_submission`]. Source text is
//! compiled against the session, emitted to an image pair, loaded through
//! the engine's [`UnitLoader`], and its generated entry function invoked
//! with the session as context. Every exit path resolves to one of the
//! three [`ExecutionResult`] states; nothing escapes as a panic or error
//! return.

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::compiler::unit::{emit, ENTRY_NAME};
use crate::error::{CompileError, Diagnostic};
use crate::loader::{InProcessLoader, UnitLoader};
use crate::session::Session;
use crate::value::Value;
use crate::vm::{Fault, Vm};

/// A submission that failed to compile.
///
/// Carries the human-readable aggregate of everything that went wrong plus
/// the original error (and through it, the structured diagnostics).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CompileFailure {
    message: String,
    #[source]
    source: CompileError,
}

impl CompileFailure {
    fn new(source: CompileError) -> Self {
        CompileFailure {
            message: source.aggregate_message(),
            source,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.source.diagnostics()
    }
}

/// A submission that compiled but faulted while running.
///
/// The captured fault is preserved unmodified: message, kind, frames, and
/// location are exactly what the VM recorded at the raise point.
#[derive(Debug, Error)]
#[error("{fault}")]
pub struct ExecuteFailure {
    fault: Fault,
}

impl ExecuteFailure {
    pub fn fault(&self) -> &Fault {
        &self.fault
    }
}

/// Tri-state outcome of one submission.
///
/// At most one failure is ever present, by construction. A successful
/// submission may legitimately produce no value (declarations, empty
/// source); it also reports no value when the engine absorbed an
/// invocation-layer fault, so success with no value is ambiguous to
/// callers.
#[derive(Debug)]
pub enum ExecutionResult {
    Success { value: Option<Value> },
    CompileFailure(CompileFailure),
    ExecuteFailure(ExecuteFailure),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// The submission's return value; present only on success.
    pub fn return_value(&self) -> Option<&Value> {
        match self {
            ExecutionResult::Success { value } => value.as_ref(),
            _ => None,
        }
    }

    pub fn compile_failure(&self) -> Option<&CompileFailure> {
        match self {
            ExecutionResult::CompileFailure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn execute_failure(&self) -> Option<&ExecuteFailure> {
        match self {
            ExecutionResult::ExecuteFailure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// The submission execution engine.
///
/// Stateless apart from its loader; all accumulated state lives in the
/// session passed to each call. Single-threaded and synchronous: a call
/// runs to completion, and there is no retry.
pub struct Engine<L = InProcessLoader> {
    loader: L,
}

impl Engine<InProcessLoader> {
    pub fn new() -> Self {
        Engine {
            loader: InProcessLoader,
        }
    }
}

impl Default for Engine<InProcessLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: UnitLoader> Engine<L> {
    /// Build an engine around a custom loading capability.
    pub fn with_loader(loader: L) -> Self {
        Engine { loader }
    }

    /// Compile and run one submission against the session.
    pub fn execute_submission(&self, session: &mut Session, source: &str) -> ExecutionResult {
        debug!("compiling submission");
        let unit = match session.compile(source) {
            Ok(unit) => unit,
            Err(err) => {
                error!("compilation failed: {}", err.aggregate_message());
                return ExecutionResult::CompileFailure(CompileFailure::new(err));
            }
        };
        debug!(unit = %unit.name, functions = unit.functions.len(), "compiled submission");

        let artifact = match emit(&unit) {
            Ok(artifact) => artifact,
            Err(err) => {
                error!("emission failed: {}", err);
                return ExecutionResult::CompileFailure(CompileFailure::new(err));
            }
        };
        debug!(
            primary_bytes = artifact.primary.len(),
            debug_bytes = artifact.debug.len(),
            "emitted unit images"
        );

        // A successfully emitted artifact is not expected to fail here; a
        // loader failure is an engine defect, reported as an execute
        // failure rather than masked.
        debug!("loading unit");
        let handle = match self.loader.load_unit(&artifact.primary, &artifact.debug) {
            Ok(handle) => handle,
            Err(err) => {
                debug!("loaded unit is unusable: {}", err);
                return ExecutionResult::ExecuteFailure(ExecuteFailure {
                    fault: Fault::defect(format!("failed to load unit: {}", err)),
                });
            }
        };

        debug!(unit = handle.unit_name(), "locating entry function");
        let Some(entry) = handle.function(ENTRY_NAME) else {
            debug!("entry function missing from loaded unit");
            return ExecutionResult::ExecuteFailure(ExecuteFailure {
                fault: Fault::defect(format!(
                    "generated entry function '{}' missing from unit '{}'",
                    ENTRY_NAME,
                    handle.unit_name()
                )),
            });
        };

        debug!("invoking entry function");
        let mut vm = Vm::new();
        match vm.invoke(&entry, session) {
            Ok(value) => {
                debug!("submission completed");
                ExecutionResult::Success {
                    value: handle.has_result().then_some(value),
                }
            }
            Err(fault) if fault.is_submission_fault() => {
                error!("submission raised a fault: {}", fault);
                ExecutionResult::ExecuteFailure(ExecuteFailure { fault })
            }
            Err(fault) => {
                // Invocation-layer fault that did not originate in the
                // submission's own code: not surfaced as a script error.
                warn!("engine fault during invocation, result discarded: {}", fault);
                ExecutionResult::Success { value: None }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_expression() {
        let engine = Engine::new();
        let mut session = Session::new();
        let result = engine.execute_submission(&mut session, "1 + 1");
        assert_eq!(result.return_value(), Some(&Value::Int(2)));
        assert!(result.compile_failure().is_none());
        assert!(result.execute_failure().is_none());
    }

    #[test]
    fn test_empty_submission_is_success_without_value() {
        let engine = Engine::new();
        let mut session = Session::new();
        let result = engine.execute_submission(&mut session, "");
        assert!(result.is_success());
        assert!(result.return_value().is_none());
    }

    #[test]
    fn test_compile_failure_shape() {
        let engine = Engine::new();
        let mut session = Session::new();
        let result = engine.execute_submission(&mut session, "let x = ;");
        let failure = result.compile_failure().expect("compile failure");
        assert!(failure.message().contains("expected expression"));
        assert!(!failure.diagnostics().is_empty());
        assert!(result.execute_failure().is_none());
        assert!(result.return_value().is_none());
    }

    #[test]
    fn test_execute_failure_preserves_fault() {
        let engine = Engine::new();
        let mut session = Session::new();
        let result = engine.execute_submission(&mut session, "throw \"boom\";");
        let failure = result.execute_failure().expect("execute failure");
        assert_eq!(failure.fault().message, "boom");
        assert!(failure.fault().is_submission_fault());
        assert!(result.compile_failure().is_none());
    }

    #[test]
    fn test_nil_literal_is_a_value() {
        let engine = Engine::new();
        let mut session = Session::new();
        let result = engine.execute_submission(&mut session, "nil");
        // A legitimate nil return value is distinct from "no value".
        assert_eq!(result.return_value(), Some(&Value::Nil));
    }

    #[test]
    fn test_declaration_produces_no_value() {
        let engine = Engine::new();
        let mut session = Session::new();
        let result = engine.execute_submission(&mut session, "let x = 5;");
        assert!(result.is_success());
        assert!(result.return_value().is_none());
    }
}
