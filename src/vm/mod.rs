//! Stack-based bytecode VM with first-class fault capture.

pub mod core;
pub mod execute;
pub mod fault;

pub use core::Vm;
pub use fault::{Fault, FaultKind, FaultOrigin, FrameInfo};
