//=============================================
// emberscript/interpreter/mod.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Tree-walking expression evaluator
// Objective: Evaluate parsed expression trees against an environment of
//            named bindings and memory banks
//=============================================

pub mod errors;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::ast::ExprNode;
use crate::value::{ArrayObject, Value};
use errors::ScriptError;

/// Named bindings plus the memory banks addressable as `name[expr]`.
#[derive(Default)]
pub struct Environment {
    vars: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Install a zero-filled memory bank of `len` cells under `name`.
    pub fn define_bank(&mut self, name: impl Into<String>, len: usize) {
        self.vars
            .insert(name.into(), Value::object(ArrayObject::with_len(len)));
    }
}

/// Evaluate an expression tree. Children evaluate first, left to right; both
/// operands of `&&` and `||` evaluate unconditionally, so an unbound name on
/// the right of either still raises `NameError`.
pub fn evaluate(node: &ExprNode, env: &mut Environment) -> Result<Value, ScriptError> {
    match node {
        ExprNode::IntLit(n) => Ok(Value::Int(*n)),
        ExprNode::StrLit(s) => Ok(Value::string(s.clone())),
        ExprNode::Ident(name) => env.get(name).ok_or_else(|| ScriptError::name(name)),
        ExprNode::Paren(inner) => evaluate(inner, env),
        ExprNode::Reference { name, index } => {
            let bank = env.get(name).ok_or_else(|| ScriptError::name(name))?;
            let index = evaluate(index, env)?;
            subscript_target(&bank)?.item(&index)
        }
        ExprNode::Unary { op, operand } => {
            let operand = evaluate(operand, env)?;
            operand.unary_op(*op)
        }
        ExprNode::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, env)?;
            let rhs = evaluate(rhs, env)?;
            trace!(op = %op, lhs = %lhs.desc(), rhs = %rhs.desc(), "binary dispatch");
            lhs.binary_op(*op, &rhs)
        }
        ExprNode::Assign { target, value } => match target.as_ref() {
            ExprNode::Ident(name) => {
                let value = evaluate(value, env)?;
                env.set(name.clone(), value.clone());
                Ok(value)
            }
            ExprNode::Reference { name, index } => {
                // Bank, index, then value, matching the compiled evaluation
                // order.
                let bank = env.get(name).ok_or_else(|| ScriptError::name(name))?;
                let index = evaluate(index, env)?;
                let value = evaluate(value, env)?;
                subscript_target(&bank)?.set_item(&index, value.clone())?;
                Ok(value)
            }
            // The parser only produces identifier or reference targets.
            other => Err(ScriptError::type_error(format!(
                "cannot assign to {}",
                other.debug_string()
            ))),
        },
    }
}

fn subscript_target(value: &Value) -> Result<&Rc<dyn crate::value::Object>, ScriptError> {
    value.as_object().ok_or_else(|| {
        ScriptError::type_error(format!("{} is not subscriptable", value.type_name()))
    })
}

/// Tokenize, parse, and evaluate a single expression in `env`.
pub fn eval_source(source: &str, env: &mut Environment) -> Result<Value, ScriptError> {
    let expr = crate::parser::parse_expression(source)?;
    evaluate(&expr, env)
}

//=============================================
// End of file
//=============================================
