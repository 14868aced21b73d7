//! First-class captured runtime faults.
//!
//! A fault records everything needed to present the failure later without
//! re-wrapping: message, kind, the frame stack at the raise point, source
//! location, and a structured origin marker distinguishing faults raised by
//! submission code from faults raised by the engine's own machinery.

use std::fmt;

use crate::reader::SourceLoc;

/// Where a fault was raised.
///
/// Stamped by the VM at the raise site. `Submission` means the fault is the
/// script author's concern; `Engine` means decode/dispatch machinery failed
/// (malformed image, pool index out of range, entry arity skew).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    Submission,
    Engine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Raised by `throw`
    Thrown,
    /// Operand type error
    Type,
    /// Call arity mismatch
    Arity,
    /// Division by zero, integer overflow
    Arithmetic,
    /// Declared global read before any submission stored it
    Undefined,
    /// Called a non-function value
    NotCallable,
    /// Call depth limit exceeded
    StackOverflow,
    /// Error returned by a native function
    Builtin,
    /// Engine-side defect (malformed image, loader failure)
    Defect,
}

/// One frame of a fault's captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub function: String,
    pub location: Option<SourceLoc>,
}

/// A captured runtime fault with its original identity intact.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FaultKind,
    pub origin: FaultOrigin,
    pub message: String,
    pub location: Option<SourceLoc>,
    /// Call stack at the raise point, innermost first. For any fault raised
    /// while a unit was executing, the outermost frame is the generated
    /// entry function.
    pub frames: Vec<FrameInfo>,
}

impl Fault {
    /// A frameless engine defect (used for loader and image-shape failures).
    pub fn defect(message: impl Into<String>) -> Self {
        Fault {
            kind: FaultKind::Defect,
            origin: FaultOrigin::Engine,
            message: message.into(),
            location: None,
            frames: Vec::new(),
        }
    }

    pub fn is_submission_fault(&self) -> bool {
        self.origin == FaultOrigin::Submission
    }

    /// Multi-line rendering: message plus one line per captured frame.
    pub fn render_trace(&self) -> String {
        let mut out = self.message.clone();
        for frame in &self.frames {
            match frame.location {
                Some(loc) => out.push_str(&format!("\n  at {} ({})", frame.function, loc)),
                None => out.push_str(&format!("\n  at {}", frame.function)),
            }
        }
        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_is_engine_origin() {
        let fault = Fault::defect("bad image");
        assert_eq!(fault.origin, FaultOrigin::Engine);
        assert!(!fault.is_submission_fault());
    }

    #[test]
    fn test_render_trace() {
        let fault = Fault {
            kind: FaultKind::Thrown,
            origin: FaultOrigin::Submission,
            message: "boom".to_string(),
            location: Some(SourceLoc::new(1, 1)),
            frames: vec![
                FrameInfo {
                    function: "inner".to_string(),
                    location: Some(SourceLoc::new(2, 3)),
                },
                FrameInfo {
                    function: "<entry>".to_string(),
                    location: None,
                },
            ],
        };
        let trace = fault.render_trace();
        assert!(trace.starts_with("boom"));
        assert!(trace.contains("at inner (2:3)"));
        assert!(trace.ends_with("at <entry>"));
    }

    #[test]
    fn test_display_is_message_only() {
        let fault = Fault::defect("bad image");
        assert_eq!(fault.to_string(), "bad image");
    }
}
