//! Abstract unit-loading capability.
//!
//! The engine hands the emitted image pair to a [`UnitLoader`] and gets back
//! a [`UnitHandle`] exposing function lookup by name. The in-process loader
//! decodes the images directly; tests and alternative hosts can supply their
//! own implementation.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::compiler::bytecode::Chunk;
use crate::compiler::unit::{Constant, DebugImage, UnitImage};
use crate::value::{Function, Value};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to decode unit image")]
    Decode(#[from] bincode::Error),

    #[error("failed to decode debug image")]
    DecodeDebug(#[from] serde_json::Error),

    #[error("function '{function}' references function {index} before it is defined")]
    ForwardFunctionReference { function: String, index: u16 },
}

/// Loading capability supplied by the environment.
pub trait UnitLoader {
    /// Load a unit from its image pair. The debug buffer may be empty, in
    /// which case the loaded functions carry no location tables.
    fn load_unit(&self, primary: &[u8], debug: &[u8]) -> Result<UnitHandle, LoadError>;
}

/// A loaded unit: executable functions, addressable by name.
#[derive(Debug)]
pub struct UnitHandle {
    name: String,
    has_result: bool,
    functions: Vec<Rc<Function>>,
    by_name: FxHashMap<String, usize>,
}

impl UnitHandle {
    /// Assemble a handle from already-materialized functions. When two
    /// functions share a name, the later one wins, matching redefinition
    /// order inside a unit.
    pub fn from_functions(
        name: impl Into<String>,
        has_result: bool,
        functions: Vec<Rc<Function>>,
    ) -> Self {
        let by_name = functions
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.name.to_string(), idx))
            .collect();
        UnitHandle {
            name: name.into(),
            has_result,
            functions,
            by_name,
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.name
    }

    /// Whether invoking the entry yields a submission return value.
    pub fn has_result(&self) -> bool {
        self.has_result
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<Rc<Function>> {
        self.by_name
            .get(name)
            .and_then(|&idx| self.functions.get(idx))
            .cloned()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

/// Loads units into the current process by decoding their images.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessLoader;

impl UnitLoader for InProcessLoader {
    fn load_unit(&self, primary: &[u8], debug: &[u8]) -> Result<UnitHandle, LoadError> {
        let image: UnitImage = bincode::deserialize(primary)?;

        let debug_image: Option<DebugImage> = if debug.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(debug)?)
        };

        let mut functions: Vec<Rc<Function>> = Vec::with_capacity(image.functions.len());
        for (idx, func) in image.functions.iter().enumerate() {
            let mut constants = Vec::with_capacity(func.constants.len());
            for constant in &func.constants {
                let value = match constant {
                    Constant::Nil => Value::Nil,
                    Constant::Bool(b) => Value::Bool(*b),
                    Constant::Int(n) => Value::Int(*n),
                    Constant::Float(f) => Value::Float(*f),
                    Constant::Str(s) => Value::str(s.as_str()),
                    Constant::Function(target) => {
                        if *target as usize >= idx {
                            return Err(LoadError::ForwardFunctionReference {
                                function: func.name.clone(),
                                index: *target,
                            });
                        }
                        Value::Function(functions[*target as usize].clone())
                    }
                };
                constants.push(value);
            }

            let locations = debug_image
                .as_ref()
                .and_then(|d| d.functions.get(idx))
                .map(|d| d.locations.clone())
                .unwrap_or_default();

            functions.push(Rc::new(Function {
                name: Rc::from(func.name.as_str()),
                arity: func.arity,
                num_locals: func.num_locals,
                chunk: Chunk {
                    code: func.code.clone(),
                    constants,
                    globals: func.globals.iter().map(|g| Rc::from(g.as_str())).collect(),
                    locations,
                },
            }));
        }

        Ok(UnitHandle::from_functions(
            image.name,
            image.has_result,
            functions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::unit::{emit, ENTRY_NAME};
    use crate::session::Session;

    fn emitted(source: &str) -> (Vec<u8>, Vec<u8>) {
        let mut session = Session::new();
        let unit = session.compile(source).unwrap();
        let artifact = emit(&unit).unwrap();
        (artifact.primary, artifact.debug)
    }

    #[test]
    fn test_load_exposes_entry() {
        let (primary, debug) = emitted("1 + 1");
        let handle = InProcessLoader.load_unit(&primary, &debug).unwrap();
        let entry = handle.function(ENTRY_NAME).expect("entry function");
        assert_eq!(entry.arity, 0);
        assert!(handle.has_result());
    }

    #[test]
    fn test_load_exposes_user_functions() {
        let (primary, debug) = emitted("fn double(n) { return n * 2; }");
        let handle = InProcessLoader.load_unit(&primary, &debug).unwrap();
        assert!(handle.function("double").is_some());
        assert_eq!(handle.function_count(), 2);
    }

    #[test]
    fn test_load_accepts_empty_debug_image() {
        let (primary, _) = emitted("1 + 1");
        let handle = InProcessLoader.load_unit(&primary, &[]).unwrap();
        let entry = handle.function(ENTRY_NAME).unwrap();
        assert!(entry.chunk.locations.is_empty());
    }

    #[test]
    fn test_load_attaches_locations_from_debug_image() {
        let (primary, debug) = emitted("1 + 1");
        let handle = InProcessLoader.load_unit(&primary, &debug).unwrap();
        let entry = handle.function(ENTRY_NAME).unwrap();
        assert!(!entry.chunk.locations.is_empty());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = InProcessLoader.load_unit(b"not an image", &[]).unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)));
    }

    #[test]
    fn test_missing_function_lookup() {
        let (primary, debug) = emitted("1");
        let handle = InProcessLoader.load_unit(&primary, &debug).unwrap();
        assert!(handle.function("nope").is_none());
    }
}
