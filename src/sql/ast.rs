//! # Statement and Expression AST
//!
//! Closed sum types for everything the boundary hands to the engine: parsed
//! statements, WHERE expression trees, comparison operators, and the
//! client-declared transaction isolation intent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client-declared isolation intent. Recorded in the transaction's BEGIN_TX
/// log entry; runtime semantics are identical for all four levels, which is
/// documented as a limitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::ReadCommitted
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(s)
    }
}

impl FromStr for IsolationLevel {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('_', " ");
        match normalized.as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(eyre::eyre!("Invalid isolation level: {}", s)),
        }
    }
}

/// Comparison operators accepted in WHERE conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Like,
}

impl CompareOp {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "=" => Some(CompareOp::Eq),
            "!=" | "<>" => Some(CompareOp::NotEq),
            "<" => Some(CompareOp::Lt),
            ">" => Some(CompareOp::Gt),
            "<=" => Some(CompareOp::LtEq),
            ">=" => Some(CompareOp::GtEq),
            "LIKE" => Some(CompareOp::Like),
            _ => None,
        }
    }
}

/// One `column op literal` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: String,
    pub op: CompareOp,
    pub value: String,
}

/// A parsed WHERE clause. AND binds tighter than OR; parentheses group.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpr {
    Comparison(Comparison),
    And(Box<WhereExpr>, Box<WhereExpr>),
    Or(Box<WhereExpr>, Box<WhereExpr>),
}

impl WhereExpr {
    /// When the whole expression is a single top-level equality, returns
    /// `(column, value)` so the engine can serve it from a hash index.
    pub fn as_equality(&self) -> Option<(&str, &str)> {
        match self {
            WhereExpr::Comparison(Comparison {
                column,
                op: CompareOp::Eq,
                value,
            }) => Some((column, value)),
            _ => None,
        }
    }
}

/// One parsed statement, ready for the engine façade.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Vec<String>,
    },
    DropTable {
        table: String,
    },
    CreateIndex {
        table: String,
        column: String,
    },
    Insert {
        table: String,
        values: Vec<String>,
    },
    Update {
        table: String,
        row_index: usize,
        assignments: Vec<(String, String)>,
    },
    Delete {
        table: String,
        row_index: usize,
    },
    SelectAll {
        table: String,
    },
    SelectWhere {
        table: String,
        expr: WhereExpr,
    },
    Begin {
        isolation: IsolationLevel,
    },
    Commit,
    Rollback,
    Savepoint {
        name: String,
    },
    RollbackToSavepoint {
        name: String,
    },
}
