//=============================================
// emberscript/lib.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Crate root for the emberscript runtime
// Objective: Wire together the tokenizer, parser, value protocol, tree
//            evaluator, and the fiber VM, and re-export the public surface
//=============================================

pub mod ast;
pub mod interpreter;
pub mod op;
pub mod parser;
pub mod tokenizer;
pub mod value;
pub mod vm;

pub use ast::ExprNode;
pub use interpreter::errors::{ErrorCode, ScriptError};
pub use interpreter::{evaluate, Environment};
pub use op::Op;
pub use parser::{parse_expression, parse_program, Parser};
pub use tokenizer::{Token, TokenKind, Tokenizer};
pub use value::{ArrayObject, NativeFunction, Object, ScriptFunction, Table, Value};
pub use vm::fiber::{FiberId, FiberState};
pub use vm::runtime::Vm;

//=============================================
// End of file
//=============================================
