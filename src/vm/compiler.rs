use crate::ast::ExprNode;
use crate::interpreter::errors::ScriptError;
use crate::op::Op;
use crate::vm::{Chunk, Constant, Instruction};

/// Lowers expression trees to bytecode. Identifiers naming a function
/// parameter compile to local slots; everything else resolves through the
/// global namespace at run time.
pub struct Compiler {
    chunk: Chunk,
    params: Vec<String>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            params: Vec::new(),
        }
    }

    pub fn with_params(params: Vec<String>) -> Self {
        Self {
            chunk: Chunk::new(),
            params,
        }
    }

    /// Compile a single expression into a chunk that returns its value.
    pub fn compile_expression(expr: &ExprNode) -> Result<Chunk, ScriptError> {
        let mut compiler = Compiler::new();
        compiler.emit_expr(expr)?;
        compiler.chunk.emit(Instruction::Return);
        Ok(compiler.chunk)
    }

    /// Compile a sequence of expressions; the chunk returns the value of the
    /// last one. An empty program returns 0.
    pub fn compile_program(exprs: &[ExprNode]) -> Result<Chunk, ScriptError> {
        let mut compiler = Compiler::new();
        match exprs.split_last() {
            Some((last, init)) => {
                for expr in init {
                    compiler.emit_expr(expr)?;
                    compiler.chunk.emit(Instruction::Pop);
                }
                compiler.emit_expr(last)?;
            }
            None => {
                let zero = compiler.chunk.add_const(Constant::Int(0));
                compiler.chunk.emit(Instruction::Push(zero));
            }
        }
        compiler.chunk.emit(Instruction::Return);
        Ok(compiler.chunk)
    }

    /// Compile a function body whose parameters occupy the first local slots.
    pub fn compile_function(params: Vec<String>, body: &ExprNode) -> Result<Chunk, ScriptError> {
        let mut compiler = Compiler::with_params(params);
        compiler.emit_expr(body)?;
        compiler.chunk.emit(Instruction::Return);
        Ok(compiler.chunk)
    }

    fn param_slot(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    fn emit_expr(&mut self, expr: &ExprNode) -> Result<(), ScriptError> {
        match expr {
            ExprNode::IntLit(n) => {
                let idx = self.chunk.add_const(Constant::Int(*n));
                self.chunk.emit(Instruction::Push(idx));
            }
            ExprNode::StrLit(s) => {
                let idx = self.chunk.add_const(Constant::Str(s.clone()));
                self.chunk.emit(Instruction::Push(idx));
            }
            ExprNode::Ident(name) => match self.param_slot(name) {
                Some(slot) => {
                    self.chunk.emit(Instruction::LoadLocal(slot));
                }
                None => {
                    let idx = self.chunk.add_const(Constant::Str(name.clone()));
                    self.chunk.emit(Instruction::LoadGlobal(idx));
                }
            },
            ExprNode::Paren(inner) => self.emit_expr(inner)?,
            ExprNode::Reference { name, index } => {
                self.emit_expr(&ExprNode::Ident(name.clone()))?;
                self.emit_expr(index)?;
                self.chunk.emit(Instruction::GetItem);
            }
            ExprNode::Unary { op, operand } => {
                self.emit_expr(operand)?;
                self.chunk.emit(Instruction::UnaryOp(*op));
            }
            ExprNode::Binary { op, lhs, rhs } => {
                if *op == Op::Comma {
                    // The comma result is the rhs; the lhs still evaluates
                    // for its effects.
                    self.emit_expr(lhs)?;
                    self.chunk.emit(Instruction::Pop);
                    self.emit_expr(rhs)?;
                } else {
                    self.emit_expr(lhs)?;
                    self.emit_expr(rhs)?;
                    self.chunk.emit(Instruction::BinaryOp(*op));
                }
            }
            ExprNode::Assign { target, value } => match target.as_ref() {
                ExprNode::Ident(name) => {
                    self.emit_expr(value)?;
                    self.chunk.emit(Instruction::Dup);
                    match self.param_slot(name) {
                        Some(slot) => {
                            self.chunk.emit(Instruction::StoreLocal(slot));
                        }
                        None => {
                            let idx = self.chunk.add_const(Constant::Str(name.clone()));
                            self.chunk.emit(Instruction::StoreGlobal(idx));
                        }
                    }
                }
                ExprNode::Reference { name, index } => {
                    self.emit_expr(&ExprNode::Ident(name.clone()))?;
                    self.emit_expr(index)?;
                    self.emit_expr(value)?;
                    self.chunk.emit(Instruction::SetItem);
                }
                other => {
                    return Err(ScriptError::type_error(format!(
                        "cannot assign to {}",
                        other.debug_string()
                    )));
                }
            },
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Tokenize, parse, and compile a semicolon separated program.
pub fn compile_source(source: &str) -> Result<Chunk, ScriptError> {
    let exprs = crate::parser::parse_program(source)?;
    Compiler::compile_program(&exprs)
}
