//! Compile-stage error types.
//!
//! Runtime faults live in `vm::fault`; the engine-facing failure wrappers
//! live in `engine`.

use std::fmt;

use thiserror::Error;

use crate::reader::SourceLoc;

/// A single compile diagnostic with an optional source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<SourceLoc>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, location: SourceLoc) -> Self {
        Diagnostic {
            message: message.into(),
            location: Some(location),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Render a diagnostic set as one line per diagnostic.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Error produced by the compile stage of a submission.
///
/// Every compile-stage failure funnels into this type, including
/// infrastructure failures while encoding the unit images; the caller always
/// receives one failure shape.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("submission failed to compile")]
    Invalid { diagnostics: Vec<Diagnostic> },

    #[error("failed to encode unit image")]
    Encode(#[from] bincode::Error),

    #[error("failed to encode debug image")]
    EncodeDebug(#[from] serde_json::Error),
}

impl CompileError {
    pub fn invalid(diagnostics: Vec<Diagnostic>) -> Self {
        CompileError::Invalid { diagnostics }
    }

    /// The diagnostics behind this error, if it carries any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Invalid { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// Human-readable aggregate of everything that went wrong.
    pub fn aggregate_message(&self) -> String {
        match self {
            CompileError::Invalid { diagnostics } => render_diagnostics(diagnostics),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_with_location() {
        let d = Diagnostic::at("expected expression", SourceLoc::new(2, 9));
        assert_eq!(d.to_string(), "2:9: expected expression");
    }

    #[test]
    fn test_diagnostic_display_without_location() {
        let d = Diagnostic::new("something went wrong");
        assert_eq!(d.to_string(), "something went wrong");
    }

    #[test]
    fn test_aggregate_message_joins_diagnostics() {
        let err = CompileError::invalid(vec![
            Diagnostic::new("first"),
            Diagnostic::new("second"),
        ]);
        assert_eq!(err.aggregate_message(), "first\nsecond");
        assert_eq!(err.diagnostics().len(), 2);
    }
}
