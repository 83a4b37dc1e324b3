//! Recursive-descent parser.
//!
//! ```text
//! expr    := term (('+'|'-') term)*
//! term    := unary (('*'|'/') unary)*
//! unary   := ('+'|'-')? primary
//! primary := number | string | identifier ('(' args ')')? ('.' prop)* | '(' expr ')'
//! ```

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::SyntaxError;
use crate::token::{tokenize, Token, TokenKind};

/// Parse expression text into an immutable tree.
pub fn parse(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.expr()?;
    let tail = p.peek();
    if tail.kind != TokenKind::Eof {
        return Err(SyntaxError::new(
            tail.offset,
            tail.kind.describe(),
            "unexpected trailing input",
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // `tokenize` always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, SyntaxError> {
        let t = self.peek().clone();
        if t.kind == kind {
            Ok(self.bump())
        } else {
            Err(SyntaxError::new(t.offset, t.kind.describe(), format!("expected {what}")))
        }
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek().kind {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let expr = self.primary()?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let t = self.bump();
        match t.kind {
            TokenKind::Number { value, unit } => Ok(Expr::Number { value, unit }),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                let mut node = if self.eat(&TokenKind::LParen) {
                    let args = self.args()?;
                    Expr::Call { name, args }
                } else {
                    Expr::Ident(name)
                };
                while self.eat(&TokenKind::Dot) {
                    let prop = self.bump();
                    match prop.kind {
                        TokenKind::Ident(prop) => {
                            node = Expr::Property {
                                target: Box::new(node),
                                prop,
                            };
                        }
                        other => {
                            return Err(SyntaxError::new(
                                prop.offset,
                                other.describe(),
                                "expected property name after '.'",
                            ))
                        }
                    }
                }
                Ok(node)
            }
            other => Err(SyntaxError::new(
                t.offset,
                other.describe(),
                "expected expression",
            )),
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen, "',' or ')'")?;
            return Ok(args);
        }
    }
}
