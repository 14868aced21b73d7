//! Session: accumulated state shared across submissions.
//!
//! A session owns the interned symbol table, the set of declared global
//! names (what the compiler of a later submission may reference), and the
//! map of global values (what executed submissions have stored). The engine
//! borrows a session per call and never owns its lifecycle; compiling a
//! submission registers its new top-level declarations here, and executing
//! it stores their values.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::builtins::register_builtins;
use crate::compiler::{compile_unit, CompiledUnit};
use crate::error::CompileError;
use crate::reader::parse_source;
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::Value;

pub struct Session {
    name: String,
    symbols: SymbolTable,
    declared: FxHashSet<SymbolId>,
    globals: FxHashMap<SymbolId, Value>,
    submissions: usize,
}

impl Session {
    /// Create a session with the builtin functions installed.
    pub fn new() -> Self {
        Self::with_name("script")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        let mut session = Session {
            name: name.into(),
            symbols: SymbolTable::new(),
            declared: FxHashSet::default(),
            globals: FxHashMap::default(),
            submissions: 0,
        };
        register_builtins(&mut session);
        session
    }

    /// Expose a host object to scripts under the given name.
    pub fn with_host(mut self, name: &str, value: Value) -> Self {
        self.define(name, value);
        self
    }

    /// Declare a name and store its value. Used for builtins and host
    /// objects; submissions go through `declare` + the VM's global store.
    pub fn define(&mut self, name: &str, value: Value) {
        let id = self.symbols.intern(name);
        self.declared.insert(id);
        self.globals.insert(id, value);
    }

    /// Register a top-level declaration, making the name visible to the
    /// compiler of this and later submissions. The value only appears once
    /// the declaring submission executes its store.
    pub fn declare(&mut self, name: &str) {
        let id = self.symbols.intern(name);
        self.declared.insert(id);
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.symbols
            .get(name)
            .is_some_and(|id| self.declared.contains(&id))
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        self.symbols.intern(name)
    }

    pub fn get_global(&self, id: SymbolId) -> Option<&Value> {
        self.globals.get(&id)
    }

    pub fn set_global(&mut self, id: SymbolId, value: Value) {
        self.globals.insert(id, value);
    }

    /// Look up a global value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.symbols.get(name).and_then(|id| self.globals.get(&id))
    }

    /// Number of submissions compiled so far.
    pub fn submissions(&self) -> usize {
        self.submissions
    }

    /// Compile one submission against the accumulated declarations.
    ///
    /// Empty source compiles to a no-op unit. Every compile-stage failure
    /// comes back as a `CompileError`.
    pub fn compile(&mut self, source: &str) -> Result<CompiledUnit, CompileError> {
        let program = parse_source(source).map_err(CompileError::invalid)?;
        let unit_name = format!("{}:{}", self.name, self.submissions);
        self.submissions += 1;
        compile_unit(self, &unit_name, &program).map_err(CompileError::invalid)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
