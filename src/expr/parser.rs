//! Recursive-descent parser for the expression grammar (spec §4.A).
//!
//! Precedence, low to high: conditional function forms (plain calls), logical
//! `or`, logical `and`, logical `not`, comparison, additive, multiplicative,
//! unary `-`, power `**`, call, atom.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{Lexer, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("parse error at offset {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|(position, message)| ParseError { position, message })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            position: self.peek().position,
            message: message.into(),
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.peek().kind == TokenKind::And {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.peek().kind == TokenKind::Not {
            self.advance();
            let operand = self.parse_not()?;
            Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) })
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let op = match self.peek().kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek().kind == TokenKind::Minus {
            self.advance();
            let operand = self.parse_unary()?;
            Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) })
        } else {
            self.parse_power()
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_call()?;
        if self.peek().kind == TokenKind::StarStar {
            self.advance();
            let exponent = self.parse_unary()?;
            Ok(Expr::Binary { op: BinaryOp::Pow, left: Box::new(base), right: Box::new(exponent) })
        } else {
            Ok(base)
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::LParen) {
                self.advance(); // name
                self.advance(); // '('
                let mut args = Vec::new();
                if self.peek().kind != TokenKind::RParen {
                    args.push(self.parse_or()?);
                    while self.peek().kind == TokenKind::Comma {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                }
                if self.peek().kind != TokenKind::RParen {
                    return Err(self.error("expected ')' to close function call"));
                }
                self.advance();
                return Ok(Expr::Call { name, args });
            }
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::String(s) => Ok(Expr::String(s)),
            TokenKind::True => Ok(Expr::Boolean(true)),
            TokenKind::False => Ok(Expr::Boolean(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Column(name)),
            TokenKind::BacktickIdent(name) => Ok(Expr::Column(name)),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                if self.peek().kind != TokenKind::RParen {
                    return Err(ParseError {
                        position: self.peek().position,
                        message: "expected ')'".to_string(),
                    });
                }
                self.advance();
                Ok(inner)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if self.peek().kind != TokenKind::RBracket {
                    items.push(self.parse_or()?);
                    while self.peek().kind == TokenKind::Comma {
                        self.advance();
                        items.push(self.parse_or()?);
                    }
                }
                if self.peek().kind != TokenKind::RBracket {
                    return Err(ParseError {
                        position: self.peek().position,
                        message: "expected ']' to close array literal".to_string(),
                    });
                }
                self.advance();
                Ok(Expr::Array(items))
            }
            other => Err(ParseError {
                position: token.position,
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Number(1.0)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Number(2.0)),
                    right: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn unary_minus_binds_looser_than_power() {
        let expr = parse("-2 ** 2").unwrap();
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(Expr::Number(2.0)),
                    right: Box::new(Expr::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        let expr = parse("not a = 1").unwrap();
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::Binary {
                    op: BinaryOp::Eq,
                    left: Box::new(Expr::Column("a".into())),
                    right: Box::new(Expr::Number(1.0)),
                }),
            }
        );
    }

    #[test]
    fn parses_function_call_with_args() {
        let expr = parse("round(score / 2, 1)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "round".into(),
                args: vec![
                    Expr::Binary {
                        op: BinaryOp::Div,
                        left: Box::new(Expr::Column("score".into())),
                        right: Box::new(Expr::Number(2.0)),
                    },
                    Expr::Number(1.0),
                ],
            }
        );
    }

    #[test]
    fn parses_backtick_column_with_spaces() {
        let expr = parse("`net sales` + 1").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Column("net sales".into())),
                right: Box::new(Expr::Number(1.0)),
            }
        );
    }

    #[test]
    fn parses_array_literal() {
        let expr = parse("[1, 2, 3]").unwrap();
        assert_eq!(
            expr,
            Expr::Array(vec![Expr::Number(1.0), Expr::Number(2.0), Expr::Number(3.0)])
        );
    }

    #[test]
    fn reports_offset_on_syntax_error() {
        let err = parse("1 +").unwrap_err();
        assert_eq!(err.position, 3);
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("1 + 1 2").is_err());
    }
}
