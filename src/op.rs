use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Every operator the expression language understands, including the
/// compound-assignment forms and the comma sequence operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    Comma,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Tilde,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    Assign,
    Equal,
    NotEqual,
    LessEqual,
    Less,
    GreaterEqual,
    Greater,
    LogicalAnd,
    LogicalOr,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Comma => ",",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::BitAnd => "&",
            Op::BitOr => "|",
            Op::BitXor => "^",
            Op::ShiftLeft => "<<",
            Op::ShiftRight => ">>",
            Op::Tilde => "~",
            Op::AddAssign => "+=",
            Op::SubAssign => "-=",
            Op::MulAssign => "*=",
            Op::DivAssign => "/=",
            Op::ModAssign => "%=",
            Op::BitAndAssign => "&=",
            Op::BitOrAssign => "|=",
            Op::BitXorAssign => "^=",
            Op::ShiftLeftAssign => "<<=",
            Op::ShiftRightAssign => ">>=",
            Op::Assign => "=",
            Op::Equal => "==",
            Op::NotEqual => "!=",
            Op::LessEqual => "<=",
            Op::Less => "<",
            Op::GreaterEqual => ">=",
            Op::Greater => ">",
            Op::LogicalAnd => "&&",
            Op::LogicalOr => "||",
        }
    }

    /// The base operator a compound assignment desugars to, e.g. `+=` to `+`.
    pub fn base_op(self) -> Option<Op> {
        match self {
            Op::AddAssign => Some(Op::Add),
            Op::SubAssign => Some(Op::Sub),
            Op::MulAssign => Some(Op::Mul),
            Op::DivAssign => Some(Op::Div),
            Op::ModAssign => Some(Op::Mod),
            Op::BitAndAssign => Some(Op::BitAnd),
            Op::BitOrAssign => Some(Op::BitOr),
            Op::BitXorAssign => Some(Op::BitXor),
            Op::ShiftLeftAssign => Some(Op::ShiftLeft),
            Op::ShiftRightAssign => Some(Op::ShiftRight),
            _ => None,
        }
    }

    pub fn is_assignment(self) -> bool {
        self == Op::Assign || self.base_op().is_some()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator spellings sorted by descending length so the tokenizer can match
/// the longest possible operator first.
pub static OPERATORS: &[&str] = &[
    "<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "==", "!=", "<=", ">=", "||",
    "&&", "<<", ">>", "=", "+", "-", "*", "/", "%", "~", "&", "|", "^", "<", ">", ",",
];

static OP_TABLE: Lazy<HashMap<&'static str, Op>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(",", Op::Comma);
    table.insert("+", Op::Add);
    table.insert("-", Op::Sub);
    table.insert("*", Op::Mul);
    table.insert("/", Op::Div);
    table.insert("%", Op::Mod);
    table.insert("&", Op::BitAnd);
    table.insert("|", Op::BitOr);
    table.insert("^", Op::BitXor);
    table.insert("<<", Op::ShiftLeft);
    table.insert(">>", Op::ShiftRight);
    table.insert("~", Op::Tilde);
    table.insert("+=", Op::AddAssign);
    table.insert("-=", Op::SubAssign);
    table.insert("*=", Op::MulAssign);
    table.insert("/=", Op::DivAssign);
    table.insert("%=", Op::ModAssign);
    table.insert("&=", Op::BitAndAssign);
    table.insert("|=", Op::BitOrAssign);
    table.insert("^=", Op::BitXorAssign);
    table.insert("<<=", Op::ShiftLeftAssign);
    table.insert(">>=", Op::ShiftRightAssign);
    table.insert("=", Op::Assign);
    table.insert("==", Op::Equal);
    table.insert("!=", Op::NotEqual);
    table.insert("<=", Op::LessEqual);
    table.insert("<", Op::Less);
    table.insert(">=", Op::GreaterEqual);
    table.insert(">", Op::Greater);
    table.insert("&&", Op::LogicalAnd);
    table.insert("||", Op::LogicalOr);
    table
});

/// Look up the operator for a spelling produced by the longest-match scan.
pub fn create_op(text: &str) -> Option<Op> {
    OP_TABLE.get(text).copied()
}
