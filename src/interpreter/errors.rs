use thiserror::Error;

use crate::op::Op;

/// Stable diagnostic codes, one per error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Syntax,
    Name,
    Type,
    Value,
    UndefinedOperator,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "E101",
            ErrorCode::Name => "E102",
            ErrorCode::Type => "E103",
            ErrorCode::Value => "E104",
            ErrorCode::UndefinedOperator => "E105",
        }
    }
}

/// Every failure the runtime can surface. All variants are recoverable; they
/// propagate out of evaluation to the nearest caller and never abort the
/// process.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    #[error("syntax error: {message} (at offset {pos})")]
    Syntax { message: String, pos: usize },

    #[error("'{name}' is not defined")]
    Name { name: String },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("value error: {message}")]
    Value { message: String },

    #[error("undefined operator: '{op}' on {operands}")]
    UndefinedOperator { op: Op, operands: String },
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, pos: usize) -> Self {
        ScriptError::Syntax {
            message: message.into(),
            pos,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        ScriptError::Name { name: name.into() }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        ScriptError::Type {
            message: message.into(),
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        ScriptError::Value {
            message: message.into(),
        }
    }

    /// Build an undefined-operator error from the operand descriptions, e.g.
    /// `'*' on <str: ab>, <str: cd>`.
    pub fn undefined_operator(op: Op, operands: &[String]) -> Self {
        ScriptError::UndefinedOperator {
            op,
            operands: operands.join(", "),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ScriptError::Syntax { .. } => ErrorCode::Syntax,
            ScriptError::Name { .. } => ErrorCode::Name,
            ScriptError::Type { .. } => ErrorCode::Type,
            ScriptError::Value { .. } => ErrorCode::Value,
            ScriptError::UndefinedOperator { .. } => ErrorCode::UndefinedOperator,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
