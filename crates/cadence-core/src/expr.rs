//! Boolean expressions over checker outcomes.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" or ")" | "true" | "false" | IDENT ( "." IDENT ( "(" ")" )? )?
//! ```
//!
//! A reference `A.eval()` calls method `eval` on checker `A`; a bare `A` means
//! `A.eval()`. Checker values are read by truthiness. There are no variables, numbers or
//! side effects beyond what the checkers themselves do. `&&` and `||` short-circuit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::checker::ConditionChecker;
use crate::error::{TriggerError, TriggerResult};

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;

/// Checkers bound into a condition, keyed by id.
pub type CheckerMap = BTreeMap<String, Box<dyn ConditionChecker>>;

/// Parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(bool),
    Ref { checker: String, method: String },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn parse(input: &str) -> TriggerResult<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            (Token::End, _) => Ok(expr),
            (token, position) => Err(parse_error(position, format!("unexpected {token:?}"))),
        }
    }

    /// Checker ids referenced by the expression, in order of appearance.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Ref { checker, .. } => {
                if !out.contains(&checker.as_str()) {
                    out.push(checker);
                }
            }
            Self::Not(inner) => inner.collect_references(out),
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
        }
    }
}

/// Evaluate an expression against bound checkers.
pub fn evaluate<'a>(
    expr: &'a Expr,
    checkers: &'a mut CheckerMap,
    now: DateTime<Utc>,
) -> BoxFuture<'a, TriggerResult<bool>> {
    Box::pin(async move {
        match expr {
            Expr::Literal(value) => Ok(*value),
            Expr::Ref { checker, method } => {
                let bound = checkers
                    .get_mut(checker)
                    .ok_or_else(|| TriggerError::UnboundIdentifier(checker.clone()))?;
                Ok(bound.call(method, now).await?.is_truthy())
            }
            Expr::Not(inner) => Ok(!evaluate(inner, checkers, now).await?),
            Expr::And(l, r) => {
                if !evaluate(l, &mut *checkers, now).await? {
                    return Ok(false);
                }
                evaluate(r, checkers, now).await
            }
            Expr::Or(l, r) => {
                if evaluate(l, &mut *checkers, now).await? {
                    return Ok(true);
                }
                evaluate(r, checkers, now).await
            }
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Dot,
    LParen,
    RParen,
    And,
    Or,
    Not,
    End,
}

fn parse_error(position: usize, message: impl Into<String>) -> TriggerError {
    TriggerError::ExpressionParse {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> TriggerResult<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '.' | '!' => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '.' => Token::Dot,
                    _ => Token::Not,
                };
                tokens.push((token, pos));
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        tokens.push((if c == '&' { Token::And } else { Token::Or }, pos));
                    }
                    _ => return Err(parse_error(pos, format!("expected '{c}{c}'"))),
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(ident), pos));
            }
            other => return Err(parse_error(pos, format!("unexpected character '{other}'"))),
        }
    }
    tokens.push((Token::End, input.len()));
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> (Token, usize) {
        self.tokens
            .get(self.pos)
            .cloned()
            .unwrap_or((Token::End, usize::MAX))
    }

    fn advance(&mut self) -> (Token, usize) {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> TriggerResult<()> {
        match self.advance() {
            (token, _) if token == expected => Ok(()),
            (token, position) => Err(parse_error(
                position,
                format!("expected {expected:?}, found {token:?}"),
            )),
        }
    }

    fn parse_or(&mut self) -> TriggerResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek().0 == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> TriggerResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek().0 == Token::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> TriggerResult<Expr> {
        if self.peek().0 == Token::Not {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> TriggerResult<Expr> {
        match self.advance() {
            (Token::LParen, _) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            (Token::Ident(name), _) => {
                if self.peek().0 != Token::Dot {
                    return Ok(match name.as_str() {
                        "true" => Expr::Literal(true),
                        "false" => Expr::Literal(false),
                        _ => Expr::Ref {
                            checker: name,
                            method: "eval".to_string(),
                        },
                    });
                }
                self.advance();
                let method = match self.advance() {
                    (Token::Ident(method), _) => method,
                    (token, position) => {
                        return Err(parse_error(
                            position,
                            format!("expected method name, found {token:?}"),
                        ));
                    }
                };
                if self.peek().0 == Token::LParen {
                    self.advance();
                    self.expect(Token::RParen)?;
                }
                Ok(Expr::Ref {
                    checker: name,
                    method,
                })
            }
            (Token::End, position) => Err(parse_error(position, "unexpected end of expression")),
            (token, position) => Err(parse_error(position, format!("unexpected {token:?}"))),
        }
    }
}
