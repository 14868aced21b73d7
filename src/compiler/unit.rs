//! Compiled unit and image forms.
//!
//! A successful compile produces a [`CompiledUnit`]; the emitter encodes it
//! into a [`CompiledArtifact`] image pair, which is all the loader ever
//! sees. The primary image carries everything needed to execute; the debug
//! image carries only location tables and may be empty at load time.

use serde::{Deserialize, Serialize};

use crate::compiler::bytecode::LocationEntry;
use crate::error::CompileError;

/// Name of the generated entry function in every unit.
///
/// Engine invariant shared between the compiler (which always generates a
/// nullary function with this name for the submission's top-level code) and
/// the invoker (which locates the entry by it). The angle brackets are not
/// lexable in an identifier, so user functions can never collide with it.
pub const ENTRY_NAME: &str = "<entry>";

/// Serializable constant pool entry.
///
/// `Function` refers to an earlier function in the same unit by index; the
/// compiler only ever emits it inside the entry function, and the loader
/// rejects forward references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Function(u16),
}

/// One function of a unit, in image form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionImage {
    pub name: String,
    pub arity: u8,
    pub num_locals: u8,
    pub code: Vec<u8>,
    pub constants: Vec<Constant>,
    /// Session global names referenced by LoadGlobal/StoreGlobal operands.
    pub globals: Vec<String>,
}

/// The primary image: a whole compiled unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitImage {
    pub name: String,
    /// Whether the unit's final statement was an expression, i.e. whether
    /// invoking the entry yields a submission return value.
    pub has_result: bool,
    pub functions: Vec<FunctionImage>,
}

/// Per-function location table in the debug image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDebug {
    pub name: String,
    pub locations: Vec<LocationEntry>,
}

/// The debug image: location tables for every function of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugImage {
    pub functions: Vec<FunctionDebug>,
}

/// One compiled function before emission: its image plus debug locations.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub image: FunctionImage,
    pub locations: Vec<LocationEntry>,
}

/// A successfully compiled submission, before emission.
///
/// The last function is always the generated entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    pub name: String,
    pub has_result: bool,
    pub functions: Vec<CompiledFunction>,
}

/// The emitted in-memory binary form of a compiled submission.
///
/// Consumed by a `UnitLoader` immediately after emission; never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    pub primary: Vec<u8>,
    pub debug: Vec<u8>,
}

/// Emit a compiled unit to its image pair.
pub fn emit(unit: &CompiledUnit) -> Result<CompiledArtifact, CompileError> {
    let image = UnitImage {
        name: unit.name.clone(),
        has_result: unit.has_result,
        functions: unit.functions.iter().map(|f| f.image.clone()).collect(),
    };
    let primary = bincode::serialize(&image)?;

    let debug_image = DebugImage {
        functions: unit
            .functions
            .iter()
            .map(|f| FunctionDebug {
                name: f.image.name.clone(),
                locations: f.locations.clone(),
            })
            .collect(),
    };
    let debug = serde_json::to_vec(&debug_image)?;

    Ok(CompiledArtifact { primary, debug })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::Op;

    fn tiny_unit() -> CompiledUnit {
        CompiledUnit {
            name: "script:0".to_string(),
            has_result: true,
            functions: vec![CompiledFunction {
                image: FunctionImage {
                    name: ENTRY_NAME.to_string(),
                    arity: 0,
                    num_locals: 0,
                    code: vec![Op::Const as u8, 0, 0, Op::Return as u8],
                    constants: vec![Constant::Int(2)],
                    globals: vec![],
                },
                locations: vec![LocationEntry { offset: 0, line: 1, col: 1 }],
            }],
        }
    }

    #[test]
    fn test_emit_produces_both_images() {
        let artifact = emit(&tiny_unit()).unwrap();
        assert!(!artifact.primary.is_empty());
        assert!(!artifact.debug.is_empty());
    }

    #[test]
    fn test_primary_image_decodes_back() {
        let unit = tiny_unit();
        let artifact = emit(&unit).unwrap();
        let decoded: UnitImage = bincode::deserialize(&artifact.primary).unwrap();
        assert_eq!(decoded.name, unit.name);
        assert!(decoded.has_result);
        assert_eq!(decoded.functions[0].name, ENTRY_NAME);
    }

    #[test]
    fn test_debug_image_is_json() {
        let artifact = emit(&tiny_unit()).unwrap();
        let decoded: DebugImage = serde_json::from_slice(&artifact.debug).unwrap();
        assert_eq!(decoded.functions[0].locations.len(), 1);
    }
}
