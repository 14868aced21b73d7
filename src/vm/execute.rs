//! Bytecode dispatch loop.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::compiler::bytecode::Op;
use crate::session::Session;
use crate::value::{Function, Value};
use crate::vm::core::{Vm, MAX_CALL_DEPTH};
use crate::vm::fault::{Fault, FaultKind};

/// Read a big-endian u16 operand, advancing `ip`.
fn read_u16(code: &[u8], ip: &mut usize) -> Option<u16> {
    let high = *code.get(*ip)?;
    let low = *code.get(*ip + 1)?;
    *ip += 2;
    Some(((high as u16) << 8) | (low as u16))
}

fn read_u8(code: &[u8], ip: &mut usize) -> Option<u8> {
    let byte = *code.get(*ip)?;
    *ip += 1;
    Some(byte)
}

/// Arithmetic and comparison kernels. Errors carry the fault kind and
/// message; the dispatch loop attaches location and frames.
fn binary_op(op: Op, lhs: Value, rhs: Value) -> Result<Value, (FaultKind, String)> {
    use Value::{Float, Int, Str};

    let type_error = |verb: &str, lhs: &Value, rhs: &Value| {
        (
            FaultKind::Type,
            format!("cannot {} {} and {}", verb, lhs.type_name(), rhs.type_name()),
        )
    };

    match op {
        Op::Add => match (&lhs, &rhs) {
            (Int(a), Int(b)) => a
                .checked_add(*b)
                .map(Int)
                .ok_or((FaultKind::Arithmetic, "integer overflow".to_string())),
            (Str(a), Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Float(a + b)),
                _ => Err(type_error("add", &lhs, &rhs)),
            },
        },
        Op::Sub => match (&lhs, &rhs) {
            (Int(a), Int(b)) => a
                .checked_sub(*b)
                .map(Int)
                .ok_or((FaultKind::Arithmetic, "integer overflow".to_string())),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Float(a - b)),
                _ => Err(type_error("subtract", &lhs, &rhs)),
            },
        },
        Op::Mul => match (&lhs, &rhs) {
            (Int(a), Int(b)) => a
                .checked_mul(*b)
                .map(Int)
                .ok_or((FaultKind::Arithmetic, "integer overflow".to_string())),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Float(a * b)),
                _ => Err(type_error("multiply", &lhs, &rhs)),
            },
        },
        Op::Div => match (&lhs, &rhs) {
            (Int(_), Int(0)) => Err((FaultKind::Arithmetic, "division by zero".to_string())),
            (Int(a), Int(b)) => a
                .checked_div(*b)
                .map(Int)
                .ok_or((FaultKind::Arithmetic, "integer overflow".to_string())),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Float(a / b)),
                _ => Err(type_error("divide", &lhs, &rhs)),
            },
        },
        Op::Rem => match (&lhs, &rhs) {
            (Int(_), Int(0)) => Err((FaultKind::Arithmetic, "division by zero".to_string())),
            (Int(a), Int(b)) => a
                .checked_rem(*b)
                .map(Int)
                .ok_or((FaultKind::Arithmetic, "integer overflow".to_string())),
            _ => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Float(a % b)),
                _ => Err(type_error("take remainder of", &lhs, &rhs)),
            },
        },
        Op::Eq => Ok(Value::Bool(lhs == rhs)),
        Op::Ne => Ok(Value::Bool(lhs != rhs)),
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let ordering = match (&lhs, &rhs) {
                (Str(a), Str(b)) => a.partial_cmp(b),
                _ => match (lhs.as_number(), rhs.as_number()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            let Some(ordering) = ordering else {
                return Err(type_error("compare", &lhs, &rhs));
            };
            let result = match op {
                Op::Lt => ordering == Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
                Op::Gt => ordering == Ordering::Greater,
                Op::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        _ => unreachable!("not a binary op: {:?}", op),
    }
}

impl Vm {
    /// Execute until the outermost frame returns.
    pub(super) fn run(&mut self, session: &mut Session) -> Result<Value, Fault> {
        loop {
            let (func, base, ip): (Rc<Function>, usize, usize) = {
                let frame = self
                    .frames
                    .last()
                    .expect("dispatch loop entered without a frame");
                (frame.function.clone(), frame.base, frame.ip)
            };

            let code = &func.chunk.code;
            let Some(&byte) = code.get(ip) else {
                return Err(self.defect("instruction pointer out of range", &func, ip));
            };
            let Some(op) = Op::from_byte(byte) else {
                return Err(self.defect(format!("invalid opcode {:#04x}", byte), &func, ip));
            };

            let mut next_ip = ip + 1;

            macro_rules! operand_u16 {
                () => {
                    match read_u16(code, &mut next_ip) {
                        Some(value) => value,
                        None => return Err(self.defect("truncated instruction", &func, ip)),
                    }
                };
            }
            macro_rules! operand_u8 {
                () => {
                    match read_u8(code, &mut next_ip) {
                        Some(value) => value,
                        None => return Err(self.defect("truncated instruction", &func, ip)),
                    }
                };
            }

            match op {
                Op::Const => {
                    let idx = operand_u16!();
                    let Some(value) = func.chunk.constants.get(idx as usize) else {
                        return Err(self.defect(
                            format!("constant index {} out of range", idx),
                            &func,
                            ip,
                        ));
                    };
                    self.stack.push(value.clone());
                }
                Op::Nil => self.stack.push(Value::Nil),
                Op::True => self.stack.push(Value::Bool(true)),
                Op::False => self.stack.push(Value::Bool(false)),
                Op::Pop => {
                    if self.stack.pop().is_none() {
                        return Err(self.defect("stack underflow", &func, ip));
                    }
                }
                Op::Dup => {
                    let Some(top) = self.stack.last().cloned() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    self.stack.push(top);
                }
                Op::LoadLocal => {
                    let slot = operand_u8!() as usize;
                    let Some(value) = self.stack.get(base + slot).cloned() else {
                        return Err(self.defect(
                            format!("local slot {} out of range", slot),
                            &func,
                            ip,
                        ));
                    };
                    self.stack.push(value);
                }
                Op::StoreLocal => {
                    let slot = operand_u8!() as usize;
                    let Some(value) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    if base + slot >= self.stack.len() {
                        return Err(self.defect(
                            format!("local slot {} out of range", slot),
                            &func,
                            ip,
                        ));
                    }
                    self.stack[base + slot] = value;
                }
                Op::LoadGlobal => {
                    let idx = operand_u16!();
                    let Some(name) = func.chunk.globals.get(idx as usize).cloned() else {
                        return Err(self.defect(
                            format!("global reference {} out of range", idx),
                            &func,
                            ip,
                        ));
                    };
                    let id = session.intern(&name);
                    let Some(value) = session.get_global(id).cloned() else {
                        return Err(self.script_fault(
                            FaultKind::Undefined,
                            format!("undefined variable '{}'", name),
                            &func,
                            ip,
                        ));
                    };
                    self.stack.push(value);
                }
                Op::StoreGlobal => {
                    let idx = operand_u16!();
                    let Some(name) = func.chunk.globals.get(idx as usize).cloned() else {
                        return Err(self.defect(
                            format!("global reference {} out of range", idx),
                            &func,
                            ip,
                        ));
                    };
                    let Some(value) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    let id = session.intern(&name);
                    session.set_global(id, value);
                }
                Op::Add
                | Op::Sub
                | Op::Mul
                | Op::Div
                | Op::Rem
                | Op::Eq
                | Op::Ne
                | Op::Lt
                | Op::Le
                | Op::Gt
                | Op::Ge => {
                    let Some(rhs) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    let Some(lhs) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    match binary_op(op, lhs, rhs) {
                        Ok(value) => self.stack.push(value),
                        Err((kind, message)) => {
                            return Err(self.script_fault(kind, message, &func, ip));
                        }
                    }
                }
                Op::Neg => {
                    let Some(value) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    let negated = match value {
                        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                            self.script_fault(
                                FaultKind::Arithmetic,
                                "integer overflow",
                                &func,
                                ip,
                            )
                        })?,
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(self.script_fault(
                                FaultKind::Type,
                                format!("cannot negate {}", other.type_name()),
                                &func,
                                ip,
                            ));
                        }
                    };
                    self.stack.push(negated);
                }
                Op::Not => {
                    let Some(value) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    self.stack.push(Value::Bool(!value.is_truthy()));
                }
                Op::Jump | Op::JumpIfFalse | Op::JumpIfTrue => {
                    let offset = operand_u16!() as i16;
                    let take = match op {
                        Op::Jump => true,
                        Op::JumpIfFalse => {
                            let Some(cond) = self.stack.pop() else {
                                return Err(self.defect("stack underflow", &func, ip));
                            };
                            !cond.is_truthy()
                        }
                        Op::JumpIfTrue => {
                            let Some(cond) = self.stack.pop() else {
                                return Err(self.defect("stack underflow", &func, ip));
                            };
                            cond.is_truthy()
                        }
                        _ => unreachable!(),
                    };
                    if take {
                        let target = next_ip as i64 + offset as i64;
                        if target < 0 || target as usize > code.len() {
                            return Err(self.defect(
                                format!("jump target {} out of range", target),
                                &func,
                                ip,
                            ));
                        }
                        next_ip = target as usize;
                    }
                }
                Op::Call => {
                    let argc = operand_u8!() as usize;
                    if self.stack.len() < argc + 1 {
                        return Err(self.defect("stack underflow", &func, ip));
                    }
                    let callee_idx = self.stack.len() - argc - 1;
                    let callee = self.stack[callee_idx].clone();

                    match callee {
                        Value::Function(callee_func) => {
                            if argc != callee_func.arity as usize {
                                return Err(self.script_fault(
                                    FaultKind::Arity,
                                    format!(
                                        "function '{}' expects {} argument{}, got {}",
                                        callee_func.name,
                                        callee_func.arity,
                                        if callee_func.arity == 1 { "" } else { "s" },
                                        argc
                                    ),
                                    &func,
                                    ip,
                                ));
                            }
                            if self.frames.len() >= MAX_CALL_DEPTH {
                                return Err(self.script_fault(
                                    FaultKind::StackOverflow,
                                    "call depth limit exceeded",
                                    &func,
                                    ip,
                                ));
                            }
                            // Resume after the call on return.
                            self.frames.last_mut().unwrap().ip = next_ip;
                            self.push_frame(callee_func, argc);
                            continue;
                        }
                        Value::Native(native) => {
                            let args: Vec<Value> =
                                self.stack[callee_idx + 1..].to_vec();
                            match native(&args) {
                                Ok(result) => {
                                    self.stack.truncate(callee_idx);
                                    self.stack.push(result);
                                }
                                Err(message) => {
                                    return Err(self.script_fault(
                                        FaultKind::Builtin,
                                        message,
                                        &func,
                                        ip,
                                    ));
                                }
                            }
                        }
                        other => {
                            return Err(self.script_fault(
                                FaultKind::NotCallable,
                                format!("cannot call a {} value", other.type_name()),
                                &func,
                                ip,
                            ));
                        }
                    }
                }
                Op::Return => {
                    let Some(result) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    let frame = self.frames.pop().expect("return without a frame");
                    self.stack.truncate(frame.base - 1);
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.stack.push(result);
                    continue;
                }
                Op::Throw => {
                    let Some(value) = self.stack.pop() else {
                        return Err(self.defect("stack underflow", &func, ip));
                    };
                    return Err(self.script_fault(
                        FaultKind::Thrown,
                        value.to_string(),
                        &func,
                        ip,
                    ));
                }
            }

            self.frames.last_mut().unwrap().ip = next_ip;
        }
    }
}
