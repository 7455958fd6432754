//=============================================
// emberscript/parser/mod.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Recursive descent expression parser
// Objective: Transform token streams into expression trees honoring the
//            fixed operator precedence and associativity table
//=============================================

//=============================================
//            Section 1: Imports
//=============================================

use crate::ast::ExprNode;
use crate::interpreter::errors::ScriptError;
use crate::op::Op;
use crate::tokenizer::{Token, TokenKind};

//=============================================
//            Section 2: Parser State
//=============================================

/// Recursive descent parser over a token sequence. Precedence, loosest
/// binding first: comma, assignment (right associative), logical or, logical
/// and, bitwise or, xor, and, equality, relational, shift, additive,
/// multiplicative, unary prefix, postfix subscript, primary.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    expr_depth: usize,
}

const MAX_EXPRESSION_DEPTH: usize = 2048;

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, 0));
        }
        Self {
            tokens,
            current: 0,
            expr_depth: 0,
        }
    }

    /// Parse a single expression consuming the entire token stream.
    pub fn parse_expression(mut self) -> Result<ExprNode, ScriptError> {
        let expr = self.expression()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse a semicolon separated sequence of expressions. A trailing
    /// semicolon is permitted.
    pub fn parse_program(mut self) -> Result<Vec<ExprNode>, ScriptError> {
        let mut exprs = Vec::new();
        loop {
            if self.peek_kind() == &TokenKind::Eof {
                break;
            }
            exprs.push(self.expression()?);
            if self.peek_kind() == &TokenKind::Semicolon {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_end()?;
        Ok(exprs)
    }

    //=============================================
    //            Section 3: Token Navigation
    //=============================================

    fn peek(&self) -> &Token {
        // The token stream always ends with Eof; never advance past it.
        let last = self.tokens.len() - 1;
        &self.tokens[self.current.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn pos(&self) -> usize {
        self.peek().pos
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.current < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    fn match_op(&mut self, accepted: &[Op]) -> Option<Op> {
        if let TokenKind::Op(op) = self.peek_kind() {
            if accepted.contains(op) {
                let op = *op;
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn expect_kind(&mut self, expected: TokenKind, what: &str) -> Result<(), ScriptError> {
        if self.peek_kind() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(ScriptError::syntax(
                format!("expected {} but found '{}'", what, self.peek_kind()),
                self.pos(),
            ))
        }
    }

    fn expect_end(&mut self) -> Result<(), ScriptError> {
        match self.peek_kind() {
            TokenKind::Eof => Ok(()),
            other => Err(ScriptError::syntax(
                format!("unexpected trailing token '{}'", other),
                self.pos(),
            )),
        }
    }

    fn enter_expr(&mut self) -> Result<(), ScriptError> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPRESSION_DEPTH {
            return Err(ScriptError::syntax(
                "expression nesting too deep",
                self.pos(),
            ));
        }
        Ok(())
    }

    fn leave_expr(&mut self) {
        self.expr_depth -= 1;
    }

    //=============================================
    //            Section 4: Precedence Ladder
    //=============================================

    fn expression(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::Comma], Parser::assignment)
    }

    fn assignment(&mut self) -> Result<ExprNode, ScriptError> {
        const ASSIGN_OPS: &[Op] = &[
            Op::Assign,
            Op::AddAssign,
            Op::SubAssign,
            Op::MulAssign,
            Op::DivAssign,
            Op::ModAssign,
            Op::BitAndAssign,
            Op::BitOrAssign,
            Op::BitXorAssign,
            Op::ShiftLeftAssign,
            Op::ShiftRightAssign,
        ];

        let mut terms = vec![self.logical_or()?];
        let mut operators = Vec::new();
        let mut positions = Vec::new();
        while let Some(op) = self.match_op(ASSIGN_OPS) {
            operators.push(op);
            positions.push(self.pos());
            terms.push(self.logical_or()?);
        }

        // Right associative fold; compound forms desugar to `target = target
        // OP value` before the tree is built.
        let mut result = terms.pop().expect("at least one term");
        while let Some(lhs) = terms.pop() {
            let op = operators.pop().expect("operator per extra term");
            let pos = positions.pop().expect("position per operator");
            result = Parser::make_assignment(lhs, op, result, pos)?;
        }
        Ok(result)
    }

    fn make_assignment(
        target: ExprNode,
        op: Op,
        value: ExprNode,
        pos: usize,
    ) -> Result<ExprNode, ScriptError> {
        if !matches!(target, ExprNode::Ident(_) | ExprNode::Reference { .. }) {
            return Err(ScriptError::syntax("invalid assignment target", pos));
        }
        let value = match op.base_op() {
            Some(base) => ExprNode::binary(base, target.clone(), value),
            None => value,
        };
        Ok(ExprNode::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn logical_or(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::LogicalOr], Parser::logical_and)
    }

    fn logical_and(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::LogicalAnd], Parser::bitwise_or)
    }

    fn bitwise_or(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::BitOr], Parser::bitwise_xor)
    }

    fn bitwise_xor(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::BitXor], Parser::bitwise_and)
    }

    fn bitwise_and(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::BitAnd], Parser::equality)
    }

    fn equality(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::Equal, Op::NotEqual], Parser::relational)
    }

    fn relational(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(
            &[Op::LessEqual, Op::Less, Op::GreaterEqual, Op::Greater],
            Parser::shift,
        )
    }

    fn shift(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::ShiftLeft, Op::ShiftRight], Parser::additive)
    }

    fn additive(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::Add, Op::Sub], Parser::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<ExprNode, ScriptError> {
        self.left_assoc(&[Op::Mul, Op::Div, Op::Mod], Parser::unary)
    }

    fn left_assoc(
        &mut self,
        accepted: &[Op],
        next: fn(&mut Parser) -> Result<ExprNode, ScriptError>,
    ) -> Result<ExprNode, ScriptError> {
        self.enter_expr()?;
        let mut node = next(self)?;
        while let Some(op) = self.match_op(accepted) {
            let rhs = next(self)?;
            node = ExprNode::binary(op, node, rhs);
        }
        self.leave_expr();
        Ok(node)
    }

    fn unary(&mut self) -> Result<ExprNode, ScriptError> {
        self.enter_expr()?;
        let mut prefix = Vec::new();
        while let Some(op) = self.match_op(&[Op::Tilde, Op::Sub, Op::Add]) {
            prefix.push(op);
        }
        let mut node = self.postfix()?;
        for op in prefix.into_iter().rev() {
            node = ExprNode::unary(op, node);
        }
        self.leave_expr();
        Ok(node)
    }

    fn postfix(&mut self) -> Result<ExprNode, ScriptError> {
        let mut node = self.primary()?;
        while self.peek_kind() == &TokenKind::SquareL {
            let pos = self.pos();
            self.advance();
            let index = self.expression()?;
            self.expect_kind(TokenKind::SquareR, "']'")?;
            match node {
                ExprNode::Ident(name) => {
                    node = ExprNode::Reference {
                        name,
                        index: Box::new(index),
                    };
                }
                _ => {
                    return Err(ScriptError::syntax(
                        "subscript target must be an identifier",
                        pos,
                    ));
                }
            }
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<ExprNode, ScriptError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(value) => Ok(ExprNode::IntLit(value)),
            TokenKind::Str(value) => Ok(ExprNode::StrLit(value)),
            TokenKind::Ident(name) => Ok(ExprNode::Ident(name)),
            TokenKind::ParenL => {
                let inner = self.expression()?;
                self.expect_kind(TokenKind::ParenR, "')'")?;
                Ok(ExprNode::Paren(Box::new(inner)))
            }
            TokenKind::Eof => Err(ScriptError::syntax(
                "unexpected end of input, expected expression",
                token.pos,
            )),
            other => Err(ScriptError::syntax(
                format!("expected expression but found '{}'", other),
                token.pos,
            )),
        }
    }
}

/// Tokenize and parse a single expression.
pub fn parse_expression(source: &str) -> Result<ExprNode, ScriptError> {
    let tokens = crate::tokenizer::Tokenizer::scan(source)?;
    Parser::new(tokens).parse_expression()
}

/// Tokenize and parse a semicolon separated program.
pub fn parse_program(source: &str) -> Result<Vec<ExprNode>, ScriptError> {
    let tokens = crate::tokenizer::Tokenizer::scan(source)?;
    Parser::new(tokens).parse_program()
}


//=============================================
// End of file
//=============================================
