//=============================================
// emberscript/vm/mod.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Bytecode definitions for the fiber VM
// Objective: Define the instruction set and compiled chunk representation
//            executed by the runtime's fiber scheduler
//=============================================

pub mod builtins;
pub mod compiler;
pub mod fiber;
pub mod fiber_control;
pub mod magic;
pub mod runtime;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::Serialize;

use crate::op::Op;
use crate::value::Value;

/// One VM instruction. Jump offsets are relative to the instruction pointer
/// after it has advanced past the jump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Instruction {
    Nop,
    /// Push the constant at the given pool index.
    Push(usize),
    Dup,
    Swap,
    Pop,
    UnaryOp(Op),
    BinaryOp(Op),
    LoadLocal(usize),
    StoreLocal(usize),
    /// Operand is a constant-pool index holding the global's name.
    LoadGlobal(usize),
    StoreGlobal(usize),
    Jump(i32),
    JumpIfTrue(i32),
    JumpIfFalse(i32),
    /// Operand is the argument count; the callee sits below the arguments.
    Call(usize),
    Return,
    GetItem,
    SetItem,
    Yield,
}

/// A compile-time constant. Kept separate from `Value` so chunks stay
/// serializable and shareable across fibers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Int(i64),
    Str(String),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Int(n) => Value::Int(*n),
            Constant::Str(s) => Value::string(s.clone()),
        }
    }
}

/// A compiled instruction stream with its constant pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    pub consts: Vec<Constant>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    /// Intern a constant, reusing an existing pool slot when possible.
    pub fn add_const(&mut self, constant: Constant) -> usize {
        if let Some(i) = self.consts.iter().position(|c| *c == constant) {
            return i;
        }
        self.consts.push(constant);
        self.consts.len() - 1
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.code.iter().enumerate() {
            writeln!(f, "{:04} {:?}", i, instruction)?;
        }
        Ok(())
    }
}

//=============================================
// End of file
//=============================================
