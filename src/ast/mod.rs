//=============================================
// emberscript/ast/mod.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Expression tree node definitions
// Objective: Provide the immutable AST produced by the parser and consumed
//            by the tree evaluator and the bytecode compiler
//=============================================

use serde::Serialize;

use crate::op::Op;

/// A parsed expression. Each node exclusively owns its operand subtrees; the
/// tree is acyclic with a single root per parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprNode {
    IntLit(i64),
    StrLit(String),
    Ident(String),
    /// Memory reference `name[index]`.
    Reference {
        name: String,
        index: Box<ExprNode>,
    },
    Unary {
        op: Op,
        operand: Box<ExprNode>,
    },
    Binary {
        op: Op,
        lhs: Box<ExprNode>,
        rhs: Box<ExprNode>,
    },
    Assign {
        target: Box<ExprNode>,
        value: Box<ExprNode>,
    },
    Paren(Box<ExprNode>),
}

impl ExprNode {
    pub fn binary(op: Op, lhs: ExprNode, rhs: ExprNode) -> ExprNode {
        ExprNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: Op, operand: ExprNode) -> ExprNode {
        ExprNode::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Compact source-like rendering used in diagnostics and the CLI dump.
    pub fn debug_string(&self) -> String {
        match self {
            ExprNode::IntLit(n) => n.to_string(),
            ExprNode::StrLit(s) => format!("\"{}\"", s),
            ExprNode::Ident(name) => name.clone(),
            ExprNode::Reference { name, index } => {
                format!("{}[{}]", name, index.debug_string())
            }
            ExprNode::Unary { op, operand } => format!("{}{}", op, operand.debug_string()),
            ExprNode::Binary { op, lhs, rhs } => {
                format!("{}{}{}", lhs.debug_string(), op, rhs.debug_string())
            }
            ExprNode::Assign { target, value } => {
                format!("{}={}", target.debug_string(), value.debug_string())
            }
            ExprNode::Paren(inner) => format!("({})", inner.debug_string()),
        }
    }
}

//=============================================
// End of file
//=============================================
