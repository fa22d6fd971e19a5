//! Recursive-descent parser for cost expressions.
//!
//! Precedence, loosest to tightest: `or`, `and`, comparisons, `+ -`, `* /`,
//! `^` (right-associative), unary `- not`. Function names and arities are
//! checked against the registry at parse time.

use crate::error::{Error, Result};

use super::functions;
use super::lexer::{tokenize, Spanned, Token};
use super::{BinaryOp, Expr, MetricKind, UnaryOp};

/// Parse `text` into an expression tree.
pub fn parse(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: text.len(),
    };
    let expr = parser.expression()?;
    if let Some((token, offset)) = parser.peek_spanned() {
        return Err(syntax(format!("unexpected trailing {token:?}"), offset));
    }
    Ok(expr)
}

fn syntax(message: impl Into<String>, offset: usize) -> Error {
    Error::Syntax {
        message: message.into(),
        offset,
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Byte length of the source, reported as the offset of errors at EOF.
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_spanned(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, o)| (t, *o))
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        match self.advance() {
            Some((token, _)) if token == *expected => Ok(()),
            Some((token, offset)) => Err(syntax(format!("expected {what}, found {token:?}"), offset)),
            None => Err(syntax(format!("expected {what}, found end of input"), self.end)),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.comparison()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.power()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.unary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.pos += 1;
            let exponent = self.power()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.peek_keyword("not") {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let (token, offset) = match self.advance() {
            Some(spanned) => spanned,
            None => return Err(syntax("unexpected end of expression", self.end)),
        };

        match token {
            Token::Number(value) => Ok(Expr::Literal(value)),
            Token::Field(name) => Ok(Expr::Field(name)),
            Token::Raster { raster, stat } => Ok(Expr::Raster { raster, stat }),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => self.ident(name, offset),
            other => Err(syntax(format!("unexpected {other:?}"), offset)),
        }
    }

    fn ident(&mut self, name: String, offset: usize) -> Result<Expr> {
        if name == "if" {
            self.expect(&Token::LParen, "'(' after 'if'")?;
            let cond = self.expression()?;
            self.expect(&Token::Comma, "',' after condition")?;
            let then = self.expression()?;
            self.expect(&Token::Comma, "',' after then-branch")?;
            let otherwise = self.expression()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }

        if let Some(metric) = MetricKind::from_keyword(&name) {
            return Ok(Expr::Metric(metric));
        }

        if matches!(self.peek(), Some(Token::LParen)) {
            let def = functions::lookup(&name)
                .ok_or_else(|| syntax(format!("unknown function '{name}'"), offset))?;
            self.pos += 1;
            let args = self.arguments()?;
            if args.len() != def.arity {
                return Err(syntax(
                    format!(
                        "function '{name}' takes {} argument(s), got {}",
                        def.arity,
                        args.len()
                    ),
                    offset,
                ));
            }
            return Ok(Expr::Call { name, args });
        }

        Err(syntax(format!("unknown identifier '{name}'"), offset))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => return Ok(args),
                Some((token, offset)) => {
                    return Err(syntax(
                        format!("expected ',' or ')', found {token:?}"),
                        offset,
                    ))
                }
                None => return Err(syntax("unterminated argument list", self.end)),
            }
        }
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == word)
    }
}
