use std::rc::Rc;

use smallvec::SmallVec;

use crate::session::Session;
use crate::value::{Function, Value};
use crate::vm::fault::{Fault, FaultKind, FaultOrigin, FrameInfo};

pub(super) type StackVec = SmallVec<[Value; 256]>;

pub(super) const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug)]
pub(super) struct Frame {
    pub function: Rc<Function>,
    pub ip: usize,
    /// Stack index of this frame's first local slot; the callee value sits
    /// directly below it.
    pub base: usize,
}

/// Stack-based bytecode VM.
///
/// One VM executes one unit invocation; globals live in the borrowed
/// session, not in the VM.
pub struct Vm {
    pub(super) stack: StackVec,
    pub(super) frames: Vec<Frame>,
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            stack: SmallVec::new(),
            frames: Vec::new(),
        }
    }

    /// Invoke a unit's entry function with the session as its context.
    ///
    /// The entry is nullary by construction; an entry with a different arity
    /// is an engine-side skew between compiler output and invoker, not a
    /// script error.
    pub fn invoke(
        &mut self,
        entry: &Rc<Function>,
        session: &mut Session,
    ) -> Result<Value, Fault> {
        if entry.arity != 0 {
            return Err(Fault {
                kind: FaultKind::Defect,
                origin: FaultOrigin::Engine,
                message: format!(
                    "entry function '{}' expects {} arguments, but the entry contract is nullary",
                    entry.name, entry.arity
                ),
                location: None,
                frames: Vec::new(),
            });
        }

        self.stack.clear();
        self.frames.clear();

        self.stack.push(Value::Function(entry.clone()));
        self.push_frame(entry.clone(), 0);
        self.run(session)
    }

    /// Push a call frame; the callee's arguments are already on the stack
    /// and become its first locals.
    pub(super) fn push_frame(&mut self, function: Rc<Function>, argc: usize) {
        let base = self.stack.len() - argc;
        for _ in argc..function.num_locals as usize {
            self.stack.push(Value::Nil);
        }
        self.frames.push(Frame {
            function,
            ip: 0,
            base,
        });
    }

    /// Snapshot the call stack, innermost first. The faulting instruction's
    /// offset is supplied for the innermost frame; outer frames point into
    /// their pending call instruction.
    pub(super) fn capture_frames(&self, fault_ip: usize) -> Vec<FrameInfo> {
        let mut frames = Vec::with_capacity(self.frames.len());
        for (idx, frame) in self.frames.iter().enumerate().rev() {
            let offset = if idx == self.frames.len() - 1 {
                fault_ip
            } else {
                frame.ip.saturating_sub(1)
            };
            frames.push(FrameInfo {
                function: frame.function.name.to_string(),
                location: frame.function.chunk.location_at(offset),
            });
        }
        frames
    }

    /// Build a fault raised by submission code at the given instruction.
    pub(super) fn script_fault(
        &self,
        kind: FaultKind,
        message: impl Into<String>,
        func: &Function,
        ip: usize,
    ) -> Fault {
        Fault {
            kind,
            origin: FaultOrigin::Submission,
            message: message.into(),
            location: func.chunk.location_at(ip),
            frames: self.capture_frames(ip),
        }
    }

    /// Build an engine-origin defect fault (malformed image, pool skew).
    pub(super) fn defect(&self, message: impl Into<String>, func: &Function, ip: usize) -> Fault {
        Fault {
            kind: FaultKind::Defect,
            origin: FaultOrigin::Engine,
            message: message.into(),
            location: func.chunk.location_at(ip),
            frames: self.capture_frames(ip),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
