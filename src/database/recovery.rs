//! # Startup Recovery
//!
//! Brings the in-memory state forward from the table files to the latest
//! WAL record. Runs after the table files are loaded, so replay must be
//! idempotent with respect to the loaded state:
//!
//! - Only records **after the last CHECKPOINT** are applied; everything
//!   before it is already durable in the table files.
//! - CREATE_TABLE replaces any loaded table of the same name with the
//!   logged schema (last-writer-wins by log order).
//! - UPDATE and DELETE whose row index is out of bounds after a partial
//!   load are skipped silently; replay never aborts on them.
//! - DROP_TABLE removes the table and unlinks its file, ignoring absence.
//! - BEGIN_TX, ROLLBACK_TX, and savepoint records carry information only.
//!   COMMIT_TX re-applies its contained operations in order.
//!
//! After a replay that applied anything, the touched tables are persisted
//! and a fresh CHECKPOINT is appended so the next startup skips them.

use crate::schema::Table;
use crate::storage::{self, Mutation, WalManager, WalOp};
use eyre::Result;
use hashbrown::{HashMap, HashSet};
use std::path::Path;

/// Replays the WAL window past the last checkpoint into `tables`. Returns
/// how many mutations were applied.
pub(crate) fn recover(
    data_dir: &Path,
    wal: &WalManager,
    tables: &mut HashMap<String, Table>,
) -> Result<u32> {
    let scan = wal.scan()?;
    let window = scan.replay_window();
    if window.is_empty() {
        return Ok(0);
    }

    let mut touched: HashSet<String> = HashSet::new();
    let mut applied = 0u32;

    for record in window {
        if let Some(mutation) = record.op.as_mutation() {
            applied += apply_mutation(data_dir, tables, &record.table, &mutation, &mut touched);
        } else if let WalOp::CommitTx { operations } = &record.op {
            for op in operations {
                applied += apply_mutation(data_dir, tables, &op.table, &op.mutation, &mut touched);
            }
        }
    }

    if applied > 0 {
        for name in &touched {
            if let Some(table) = tables.get(name) {
                if let Err(e) = storage::save_table(data_dir, table) {
                    eprintln!(
                        "[recovery] warning: failed to persist table {}: {:#}",
                        name, e
                    );
                }
            }
        }
        wal.checkpoint()?;
        eprintln!(
            "[recovery] applied {} WAL records past the last checkpoint",
            applied
        );
    }

    Ok(applied)
}

/// Applies one logged mutation with replay tolerance. Returns 1 when the
/// mutation took effect, 0 when it was skipped.
fn apply_mutation(
    data_dir: &Path,
    tables: &mut HashMap<String, Table>,
    table_name: &str,
    mutation: &Mutation,
    touched: &mut HashSet<String>,
) -> u32 {
    let name = table_name.to_lowercase();

    match mutation {
        Mutation::CreateTable { columns } => {
            tables.insert(name.clone(), Table::new(name.clone(), columns.clone()));
            touched.insert(name);
            1
        }
        Mutation::Insert { values } => {
            let Some(table) = tables.get_mut(&name) else {
                return 0;
            };
            if values.len() != table.column_count() {
                return 0;
            }
            table.push_row(values.clone());
            touched.insert(name);
            1
        }
        Mutation::Update { row_index, values } => {
            let Some(table) = tables.get_mut(&name) else {
                return 0;
            };
            if *row_index >= table.row_count() || values.len() != table.column_count() {
                return 0;
            }
            table.set_row(*row_index, values.clone());
            touched.insert(name);
            1
        }
        Mutation::Delete { row_index } => {
            let Some(table) = tables.get_mut(&name) else {
                return 0;
            };
            if *row_index >= table.row_count() {
                return 0;
            }
            table.remove_row(*row_index);
            touched.insert(name);
            1
        }
        Mutation::DropTable => {
            let existed = tables.remove(&name).is_some();
            touched.remove(&name);
            if let Err(e) = storage::remove_table_file(data_dir, &name) {
                eprintln!(
                    "[recovery] warning: failed to unlink table file {}: {:#}",
                    name, e
                );
            }
            existed as u32
        }
    }
}
