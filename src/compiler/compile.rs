//! Bytecode compiler: statement list → compiled unit.
//!
//! Every submission compiles to a unit whose last function is the generated
//! entry (see [`crate::compiler::unit::ENTRY_NAME`]): a nullary function
//! holding the submission's top-level code. Top-level `let` and `fn` become
//! session globals; block-level `let` becomes a local slot of the enclosing
//! function.

use crate::compiler::ast::{BinOp, Expr, Lit, Stmt, UnaryOp};
use crate::compiler::bytecode::{LocationEntry, Op};
use crate::compiler::unit::{CompiledFunction, CompiledUnit, Constant, FunctionImage, ENTRY_NAME};
use crate::error::Diagnostic;
use crate::reader::SourceLoc;
use crate::session::Session;

const MAX_LOCALS: usize = u8::MAX as usize;
const MAX_CALL_ARGS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FuncKind {
    /// The generated entry: depth-0 `let` declares session globals and a
    /// trailing expression becomes the submission's return value.
    Entry,
    /// A user `fn`: `let` always declares locals, `return` is allowed.
    Function,
}

struct Local {
    name: String,
    depth: u32,
}

/// In-progress function: code buffer, pools, and lexical scope state.
struct FuncState {
    name: String,
    kind: FuncKind,
    arity: u8,
    code: Vec<u8>,
    constants: Vec<Constant>,
    globals: Vec<String>,
    locations: Vec<LocationEntry>,
    locals: Vec<Local>,
    max_locals: usize,
    scope_depth: u32,
}

impl FuncState {
    fn new(name: impl Into<String>, kind: FuncKind) -> Self {
        FuncState {
            name: name.into(),
            kind,
            arity: 0,
            code: Vec::new(),
            constants: Vec::new(),
            globals: Vec::new(),
            locations: Vec::new(),
            locals: Vec::new(),
            max_locals: 0,
            scope_depth: 0,
        }
    }

    fn emit(&mut self, op: Op) {
        self.code.push(op as u8);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.push((value >> 8) as u8);
        self.code.push((value & 0xff) as u8);
    }

    fn current_pos(&self) -> usize {
        self.code.len()
    }

    /// Emit a forward jump with a placeholder offset; returns the operand
    /// position for `patch_jump`.
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit(op);
        let pos = self.current_pos();
        self.emit_u16(0xffff);
        pos
    }

    fn patch_jump(&mut self, pos: usize, loc: SourceLoc) -> Result<(), Diagnostic> {
        let offset = self.current_pos() as i64 - (pos as i64 + 2);
        let offset = i16::try_from(offset)
            .map_err(|_| Diagnostic::at("jump distance exceeds bytecode limits", loc))?;
        self.code[pos] = ((offset as u16) >> 8) as u8;
        self.code[pos + 1] = ((offset as u16) & 0xff) as u8;
        Ok(())
    }

    /// Emit a backward jump to `target`.
    fn emit_loop(&mut self, target: usize, loc: SourceLoc) -> Result<(), Diagnostic> {
        self.emit(Op::Jump);
        let offset = target as i64 - (self.current_pos() as i64 + 2);
        let offset = i16::try_from(offset)
            .map_err(|_| Diagnostic::at("loop body exceeds bytecode limits", loc))?;
        self.emit_u16(offset as u16);
        Ok(())
    }

    fn add_constant(&mut self, constant: Constant, loc: SourceLoc) -> Result<u16, Diagnostic> {
        if let Some(idx) = self.constants.iter().position(|c| c == &constant) {
            return Ok(idx as u16);
        }
        if self.constants.len() > u16::MAX as usize {
            return Err(Diagnostic::at("too many constants in one function", loc));
        }
        self.constants.push(constant);
        Ok((self.constants.len() - 1) as u16)
    }

    fn add_global(&mut self, name: &str, loc: SourceLoc) -> Result<u16, Diagnostic> {
        if let Some(idx) = self.globals.iter().position(|g| g == name) {
            return Ok(idx as u16);
        }
        if self.globals.len() > u16::MAX as usize {
            return Err(Diagnostic::at("too many global references in one function", loc));
        }
        self.globals.push(name.to_string());
        Ok((self.globals.len() - 1) as u16)
    }

    /// Record the source location of the next instruction.
    fn record_location(&mut self, loc: SourceLoc) {
        let offset = self.current_pos() as u32;
        // Collapse repeated entries at the same offset.
        if let Some(last) = self.locations.last() {
            if last.offset == offset {
                return;
            }
        }
        self.locations.push(LocationEntry {
            offset,
            line: loc.line as u32,
            col: loc.col as u32,
        });
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while self
            .locals
            .last()
            .is_some_and(|local| local.depth > self.scope_depth)
        {
            self.locals.pop();
        }
    }

    fn declare_local(&mut self, name: &str, loc: SourceLoc) -> Result<u8, Diagnostic> {
        if self.locals.len() >= MAX_LOCALS {
            return Err(Diagnostic::at("too many local variables", loc));
        }
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
        });
        self.max_locals = self.max_locals.max(self.locals.len());
        Ok((self.locals.len() - 1) as u8)
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|idx| idx as u8)
    }

    fn finish(self) -> CompiledFunction {
        CompiledFunction {
            image: FunctionImage {
                name: self.name,
                arity: self.arity,
                num_locals: self.max_locals as u8,
                code: self.code,
                constants: self.constants,
                globals: self.globals,
            },
            locations: self.locations,
        }
    }
}

/// Compiler for one submission against a session's accumulated declarations.
struct Compiler<'s> {
    session: &'s mut Session,
    functions: Vec<CompiledFunction>,
    diagnostics: Vec<Diagnostic>,
}

/// Compile a parsed submission into a unit, registering its new top-level
/// declarations with the session.
pub fn compile_unit(
    session: &mut Session,
    unit_name: &str,
    program: &[Stmt],
) -> Result<CompiledUnit, Vec<Diagnostic>> {
    Compiler {
        session,
        functions: Vec::new(),
        diagnostics: Vec::new(),
    }
    .compile(unit_name, program)
}

impl<'s> Compiler<'s> {
    fn compile(mut self, unit_name: &str, program: &[Stmt]) -> Result<CompiledUnit, Vec<Diagnostic>> {
        // Pre-scan top-level declarations so later statements (and function
        // bodies) can reference names defined further down in the same
        // submission. Extending the declaration set is the session's
        // responsibility; it persists even if this submission never runs.
        for stmt in program {
            match stmt {
                Stmt::Let { name, .. } | Stmt::Fn { name, .. } => {
                    self.session.declare(name);
                }
                _ => {}
            }
        }

        let mut entry = FuncState::new(ENTRY_NAME, FuncKind::Entry);
        let mut has_result = false;

        for (idx, stmt) in program.iter().enumerate() {
            let is_last = idx == program.len() - 1;

            if is_last {
                if let Stmt::Expr(expr) = stmt {
                    match self.compile_expr(&mut entry, expr) {
                        Ok(()) => {
                            entry.emit(Op::Return);
                            has_result = true;
                        }
                        Err(diagnostic) => self.diagnostics.push(diagnostic),
                    }
                    continue;
                }
            }

            if let Err(diagnostic) = self.compile_stmt(&mut entry, stmt) {
                self.diagnostics.push(diagnostic);
            }
        }

        if !has_result {
            entry.emit(Op::Nil);
            entry.emit(Op::Return);
        }

        self.functions.push(entry.finish());

        if self.diagnostics.is_empty() {
            Ok(CompiledUnit {
                name: unit_name.to_string(),
                has_result,
                functions: self.functions,
            })
        } else {
            Err(self.diagnostics)
        }
    }

    fn compile_stmt(&mut self, func: &mut FuncState, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::Let { name, value, loc } => {
                self.compile_expr(func, value)?;
                if func.kind == FuncKind::Entry && func.scope_depth == 0 {
                    let idx = func.add_global(name, *loc)?;
                    func.record_location(*loc);
                    func.emit(Op::StoreGlobal);
                    func.emit_u16(idx);
                } else {
                    let slot = func.declare_local(name, *loc)?;
                    func.emit(Op::StoreLocal);
                    func.emit_byte(slot);
                }
                Ok(())
            }
            Stmt::Assign { name, value, loc } => {
                self.compile_expr(func, value)?;
                if let Some(slot) = func.resolve_local(name) {
                    func.emit(Op::StoreLocal);
                    func.emit_byte(slot);
                } else if self.session.is_declared(name) {
                    let idx = func.add_global(name, *loc)?;
                    func.record_location(*loc);
                    func.emit(Op::StoreGlobal);
                    func.emit_u16(idx);
                } else {
                    return Err(Diagnostic::at(
                        format!("unknown variable '{}'", name),
                        *loc,
                    ));
                }
                Ok(())
            }
            Stmt::Fn {
                name,
                params,
                body,
                loc,
            } => {
                if func.kind != FuncKind::Entry || func.scope_depth != 0 {
                    return Err(Diagnostic::at(
                        "function definitions are only allowed at the top level",
                        *loc,
                    ));
                }
                let fn_idx = self.compile_function(name, params, body, *loc)?;
                let const_idx = func.add_constant(Constant::Function(fn_idx), *loc)?;
                func.emit(Op::Const);
                func.emit_u16(const_idx);
                let global_idx = func.add_global(name, *loc)?;
                func.record_location(*loc);
                func.emit(Op::StoreGlobal);
                func.emit_u16(global_idx);
                Ok(())
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                loc,
            } => {
                self.compile_expr(func, cond)?;
                let else_jump = func.emit_jump(Op::JumpIfFalse);
                self.compile_block(func, then_body)?;

                if let Some(else_body) = else_body {
                    let end_jump = func.emit_jump(Op::Jump);
                    func.patch_jump(else_jump, *loc)?;
                    self.compile_block(func, else_body)?;
                    func.patch_jump(end_jump, *loc)?;
                } else {
                    func.patch_jump(else_jump, *loc)?;
                }
                Ok(())
            }
            Stmt::While { cond, body, loc } => {
                let loop_start = func.current_pos();
                self.compile_expr(func, cond)?;
                let exit_jump = func.emit_jump(Op::JumpIfFalse);
                self.compile_block(func, body)?;
                func.emit_loop(loop_start, *loc)?;
                func.patch_jump(exit_jump, *loc)?;
                Ok(())
            }
            Stmt::Return { value, loc } => {
                if func.kind != FuncKind::Function {
                    return Err(Diagnostic::at("'return' outside of a function", *loc));
                }
                match value {
                    Some(expr) => self.compile_expr(func, expr)?,
                    None => func.emit(Op::Nil),
                }
                func.emit(Op::Return);
                Ok(())
            }
            Stmt::Throw { value, loc } => {
                self.compile_expr(func, value)?;
                func.record_location(*loc);
                func.emit(Op::Throw);
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.compile_expr(func, expr)?;
                func.emit(Op::Pop);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, func: &mut FuncState, body: &[Stmt]) -> Result<(), Diagnostic> {
        func.begin_scope();
        let result = body
            .iter()
            .try_for_each(|stmt| self.compile_stmt(func, stmt));
        func.end_scope();
        result
    }

    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Stmt],
        loc: SourceLoc,
    ) -> Result<u16, Diagnostic> {
        if params.len() > MAX_CALL_ARGS {
            return Err(Diagnostic::at("too many parameters", loc));
        }

        let mut func = FuncState::new(name, FuncKind::Function);
        func.arity = params.len() as u8;
        func.begin_scope();
        for param in params {
            if func.resolve_local(param).is_some() {
                return Err(Diagnostic::at(
                    format!("duplicate parameter '{}'", param),
                    loc,
                ));
            }
            func.declare_local(param, loc)?;
        }

        for stmt in body {
            self.compile_stmt(&mut func, stmt)?;
        }

        // Implicit nil return for bodies that fall off the end.
        func.emit(Op::Nil);
        func.emit(Op::Return);

        if self.functions.len() >= u16::MAX as usize {
            return Err(Diagnostic::at("too many functions in one submission", loc));
        }
        self.functions.push(func.finish());
        Ok((self.functions.len() - 1) as u16)
    }

    fn compile_expr(&mut self, func: &mut FuncState, expr: &Expr) -> Result<(), Diagnostic> {
        match expr {
            Expr::Literal { value, loc } => {
                match value {
                    Lit::Nil => func.emit(Op::Nil),
                    Lit::Bool(true) => func.emit(Op::True),
                    Lit::Bool(false) => func.emit(Op::False),
                    Lit::Int(n) => {
                        let idx = func.add_constant(Constant::Int(*n), *loc)?;
                        func.emit(Op::Const);
                        func.emit_u16(idx);
                    }
                    Lit::Float(f) => {
                        let idx = func.add_constant(Constant::Float(*f), *loc)?;
                        func.emit(Op::Const);
                        func.emit_u16(idx);
                    }
                    Lit::Str(s) => {
                        let idx = func.add_constant(Constant::Str(s.clone()), *loc)?;
                        func.emit(Op::Const);
                        func.emit_u16(idx);
                    }
                }
                Ok(())
            }
            Expr::Var { name, loc } => {
                if let Some(slot) = func.resolve_local(name) {
                    func.emit(Op::LoadLocal);
                    func.emit_byte(slot);
                } else if self.session.is_declared(name) {
                    let idx = func.add_global(name, *loc)?;
                    func.record_location(*loc);
                    func.emit(Op::LoadGlobal);
                    func.emit_u16(idx);
                } else {
                    return Err(Diagnostic::at(
                        format!("unknown variable '{}'", name),
                        *loc,
                    ));
                }
                Ok(())
            }
            Expr::Unary { op, operand, loc } => {
                self.compile_expr(func, operand)?;
                func.record_location(*loc);
                match op {
                    UnaryOp::Neg => func.emit(Op::Neg),
                    UnaryOp::Not => func.emit(Op::Not),
                }
                Ok(())
            }
            Expr::Binary { op, lhs, rhs, loc } => match op {
                BinOp::And => {
                    self.compile_expr(func, lhs)?;
                    func.emit(Op::Dup);
                    let short = func.emit_jump(Op::JumpIfFalse);
                    func.emit(Op::Pop);
                    self.compile_expr(func, rhs)?;
                    func.patch_jump(short, *loc)
                }
                BinOp::Or => {
                    self.compile_expr(func, lhs)?;
                    func.emit(Op::Dup);
                    let short = func.emit_jump(Op::JumpIfTrue);
                    func.emit(Op::Pop);
                    self.compile_expr(func, rhs)?;
                    func.patch_jump(short, *loc)
                }
                _ => {
                    self.compile_expr(func, lhs)?;
                    self.compile_expr(func, rhs)?;
                    func.record_location(*loc);
                    func.emit(match op {
                        BinOp::Add => Op::Add,
                        BinOp::Sub => Op::Sub,
                        BinOp::Mul => Op::Mul,
                        BinOp::Div => Op::Div,
                        BinOp::Rem => Op::Rem,
                        BinOp::Eq => Op::Eq,
                        BinOp::Ne => Op::Ne,
                        BinOp::Lt => Op::Lt,
                        BinOp::Le => Op::Le,
                        BinOp::Gt => Op::Gt,
                        BinOp::Ge => Op::Ge,
                        BinOp::And | BinOp::Or => unreachable!("handled above"),
                    });
                    Ok(())
                }
            },
            Expr::Call { callee, args, loc } => {
                if args.len() > MAX_CALL_ARGS {
                    return Err(Diagnostic::at("too many call arguments", *loc));
                }
                self.compile_expr(func, callee)?;
                for arg in args {
                    self.compile_expr(func, arg)?;
                }
                func.record_location(*loc);
                func.emit(Op::Call);
                func.emit_byte(args.len() as u8);
                Ok(())
            }
        }
    }
}
