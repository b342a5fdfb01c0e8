//! # Engine Façade
//!
//! The public surface of the engine: [`Database`] exposes the named verbs
//! (create/drop table, insert/update/delete, index creation, point and
//! predicate selects, and the transaction verbs), serialized behind one
//! coarse lock. Results come back as [`ExecuteResult`] values that render
//! to the one-line status strings of the wire dialect.

mod database;
mod recovery;
mod transaction;

pub use database::Database;
pub use transaction::{Savepoint, Transaction, TransactionManager, TxnState};

use crate::sql::IsolationLevel;

/// Header and rows of a select, in stable table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryOutput {
    /// Text form: `col | col` header, one `v | v` line per row, and the
    /// literal token `(no rows)` when the result set is empty.
    pub fn render(&self) -> String {
        let mut out = self.columns.join(" | ");
        out.push('\n');
        if self.rows.is_empty() {
            out.push_str("(no rows)\n");
        } else {
            for row in &self.rows {
                out.push_str(&row.join(" | "));
                out.push('\n');
            }
        }
        out
    }
}

/// Typed outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    CreateTable { table: String, queued: bool },
    DropTable { table: String, queued: bool },
    Insert { queued: bool },
    Update { queued: bool },
    Delete { queued: bool },
    CreateIndex { table: String, column: String },
    Select(QueryOutput),
    Begin { txn_id: String, isolation: IsolationLevel },
    Commit { operations: usize },
    Rollback,
    Savepoint { name: String },
    RollbackToSavepoint { name: String },
}

impl ExecuteResult {
    /// One-line status string (multi-line for selects), as served to
    /// clients by the boundary.
    pub fn render(&self) -> String {
        match self {
            ExecuteResult::CreateTable { table, queued: false } => {
                format!("Table {} created", table)
            }
            ExecuteResult::CreateTable { table, queued: true } => {
                format!("Table {} creation queued in transaction", table)
            }
            ExecuteResult::DropTable { table, queued: false } => {
                format!("Table {} dropped", table)
            }
            ExecuteResult::DropTable { table, queued: true } => {
                format!("Table {} drop queued in transaction", table)
            }
            ExecuteResult::Insert { queued: false } => "1 row inserted".to_string(),
            ExecuteResult::Insert { queued: true } => {
                "1 row insert queued in transaction".to_string()
            }
            ExecuteResult::Update { queued: false } => "1 row updated".to_string(),
            ExecuteResult::Update { queued: true } => {
                "1 row update queued in transaction".to_string()
            }
            ExecuteResult::Delete { queued: false } => "1 row deleted".to_string(),
            ExecuteResult::Delete { queued: true } => {
                "1 row delete queued in transaction".to_string()
            }
            ExecuteResult::CreateIndex { table, column } => {
                format!("Index created on {}({})", table, column)
            }
            ExecuteResult::Select(output) => output.render(),
            ExecuteResult::Begin { txn_id, isolation } => {
                format!("Transaction {} started with isolation level {}", txn_id, isolation)
            }
            ExecuteResult::Commit { .. } => "Transaction committed successfully".to_string(),
            ExecuteResult::Rollback => "Transaction rolled back successfully".to_string(),
            ExecuteResult::Savepoint { name } => format!("Savepoint {} created", name),
            ExecuteResult::RollbackToSavepoint { name } => {
                format!("Rolled back to savepoint {}", name)
            }
        }
    }
}
