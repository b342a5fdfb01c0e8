//! # WHERE Expression Parsing and Evaluation
//!
//! Recursive-descent parser and evaluator for the WHERE grammar:
//!
//! ```text
//! expr       := and_expr ( OR and_expr )*
//! and_expr   := term ( AND term )*
//! term       := '(' expr ')' | comparison
//! comparison := ident op literal
//! op         := = | != | <> | < | > | <= | >= | LIKE
//! ```
//!
//! AND binds tighter than OR and parentheses override both, so
//! `a = 1 OR b = 2 AND c = 3` reads as `a = 1 OR (b = 2 AND c = 3)`.
//!
//! ## Comparison Semantics
//!
//! `=` and `!=` compare bytes. The ordering operators compare numerically
//! when both operands parse as finite decimals and fall back to byte order
//! otherwise, so `10 < 9` is false while `apple < banana` is true. LIKE is
//! anchored at both ends: `%` matches any substring, `_` exactly one byte,
//! and every other character only itself.

use crate::sql::ast::{CompareOp, Comparison, WhereExpr};
use crate::sql::lexer::{tokenize, Token};
use eyre::{bail, ensure, Result};

impl WhereExpr {
    /// Parses a WHERE clause string into an expression tree.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input);
        ensure!(!tokens.is_empty(), "empty WHERE clause");

        let mut parser = Parser { tokens: &tokens, pos: 0 };
        let expr = parser.parse_or()?;
        ensure!(
            parser.pos == tokens.len(),
            "unexpected token after WHERE expression"
        );
        Ok(expr)
    }

    /// Every column name referenced by the expression.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            WhereExpr::Comparison(c) => out.push(&c.column),
            WhereExpr::And(l, r) | WhereExpr::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
        }
    }

    /// Evaluates the expression against one row. Callers validate referenced
    /// columns up front, so logical operators may short-circuit.
    pub fn evaluate(&self, row: &[String], columns: &[String]) -> Result<bool> {
        match self {
            WhereExpr::And(l, r) => Ok(l.evaluate(row, columns)? && r.evaluate(row, columns)?),
            WhereExpr::Or(l, r) => Ok(l.evaluate(row, columns)? || r.evaluate(row, columns)?),
            WhereExpr::Comparison(c) => {
                let Some(idx) = columns.iter().position(|col| col == &c.column) else {
                    bail!("Column {} not found", c.column);
                };
                let cell = row.get(idx).map(String::as_str).unwrap_or("");
                Ok(compare(cell, c.op, &c.value))
            }
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<WhereExpr> {
        let mut left = self.parse_and()?;
        while self.peek().map(|t| t.is_keyword("OR")) == Some(true) {
            self.next();
            let right = self.parse_and()?;
            left = WhereExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<WhereExpr> {
        let mut left = self.parse_term()?;
        while self.peek().map(|t| t.is_keyword("AND")) == Some(true) {
            self.next();
            let right = self.parse_term()?;
            left = WhereExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<WhereExpr> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let expr = self.parse_or()?;
            ensure!(
                self.next() == Some(&Token::RParen),
                "unmatched opening parenthesis"
            );
            return Ok(expr);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<WhereExpr> {
        let column = match self.next() {
            Some(Token::Word(w)) => {
                ensure!(
                    !w.eq_ignore_ascii_case("AND") && !w.eq_ignore_ascii_case("OR"),
                    "logic operator {} where a condition was expected",
                    w
                );
                w.clone()
            }
            Some(Token::Str(s)) => s.clone(),
            Some(Token::RParen) => bail!("unmatched closing parenthesis"),
            _ => bail!("incomplete condition"),
        };

        let op = match self.next() {
            Some(Token::Word(w)) => match CompareOp::parse(w) {
                Some(op) => op,
                None => bail!("unsupported operator: {}", w),
            },
            _ => bail!("incomplete condition"),
        };

        let value = match self.next() {
            Some(token) => match token.literal() {
                Some(v) => v.to_string(),
                None => bail!("incomplete condition"),
            },
            None => bail!("incomplete condition"),
        };

        Ok(WhereExpr::Comparison(Comparison { column, op, value }))
    }
}

/// Applies one comparison operator to a cell and a literal.
pub fn compare(cell: &str, op: CompareOp, value: &str) -> bool {
    match op {
        CompareOp::Eq => cell == value,
        CompareOp::NotEq => cell != value,
        CompareOp::Like => like_match(cell.as_bytes(), value.as_bytes()),
        CompareOp::Lt | CompareOp::Gt | CompareOp::LtEq | CompareOp::GtEq => {
            let ordering = match (parse_number(cell), parse_number(value)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => Some(cell.as_bytes().cmp(value.as_bytes())),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::LtEq => ordering.is_le(),
                CompareOp::GtEq => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Anchored LIKE match over bytes. `%` matches any substring, `_` exactly
/// one byte, everything else only itself.
fn like_match(text: &[u8], pattern: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'%') => {
            let rest = &pattern[1..];
            (0..=text.len()).any(|skip| like_match(&text[skip..], rest))
        }
        Some(b'_') => !text.is_empty() && like_match(&text[1..], &pattern[1..]),
        Some(&literal) => {
            text.first() == Some(&literal) && like_match(&text[1..], &pattern[1..])
        }
    }
}
