//! # Database Core
//!
//! The engine façade. One `Database` owns one data directory: the tables
//! map, the WAL, and the transaction manager, all behind a single coarse
//! `parking_lot::Mutex` that serializes every state-touching operation.
//!
//! ## Mutation Protocol
//!
//! Outside a transaction every mutating verb follows log-before-data:
//!
//! ```text
//! validate ──► WAL append (fsync) ──► apply to a clone ──► atomic file
//!     replace (fsync + rename + dir fsync) ──► install clone ──► WAL
//!     checkpoint
//! ```
//!
//! The clone-then-install step makes persistence failures fail-closed: if
//! the table file cannot be written, live memory never changes and the verb
//! returns an error. The WAL record may survive such a failure, in which
//! case startup replay converges the state instead.
//!
//! ## Transactions
//!
//! Inside a transaction, mutating verbs validate against the transaction's
//! overlay (live tables plus the buffered operations) and append to the
//! buffer. Reads see the same overlay, so a transaction observes its own
//! uncommitted writes. Commit stages the whole buffer against clones,
//! writes one COMMIT_TX envelope, installs the clones, and persists the
//! touched tables — a mid-commit validation failure rolls the transaction
//! back without touching live state.
//!
//! Cross-transaction isolation is not enforced: the declared isolation
//! level is recorded in the log and has no runtime effect.

use crate::database::transaction::{TransactionManager, TxnState};
use crate::database::{recovery, ExecuteResult, QueryOutput};
use crate::schema::Table;
use crate::sql::{self, IsolationLevel, Statement, WhereExpr};
use crate::storage::{self, Mutation, TableMutation, WalManager, WalOp};
use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Handle to one data directory. `Send + Sync`; clone-free — share behind
/// an `Arc` when multiple connections need it.
pub struct Database {
    data_dir: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    data_dir: PathBuf,
    tables: HashMap<String, Table>,
    wal: WalManager,
    txns: TransactionManager,
    current_txn: Option<String>,
}

impl Database {
    /// Opens (or creates) the data directory, loads every table file, and
    /// replays the WAL window past the last checkpoint.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .wrap_err_with(|| format!("failed to create data directory {:?}", data_dir))?;

        let wal = WalManager::open(&data_dir)?;

        let mut tables = HashMap::new();
        for table in storage::load_tables(&data_dir)? {
            tables.insert(table.name().to_string(), table);
        }

        recovery::recover(&data_dir, &wal, &mut tables)?;

        Ok(Self {
            data_dir: data_dir.clone(),
            inner: Mutex::new(Inner {
                data_dir,
                tables,
                wal,
                txns: TransactionManager::new(),
                current_txn: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.data_dir
    }

    /// Parses and executes one statement of the SQL-ish dialect.
    pub fn execute(&self, input: &str) -> Result<ExecuteResult> {
        self.execute_statement(sql::parse(input)?)
    }

    pub fn execute_statement(&self, stmt: Statement) -> Result<ExecuteResult> {
        let mut inner = self.inner.lock();
        match stmt {
            Statement::CreateTable { table, columns } => inner.create_table(&table, columns),
            Statement::DropTable { table } => inner.drop_table(&table),
            Statement::CreateIndex { table, column } => inner.create_index(&table, &column),
            Statement::Insert { table, values } => inner.insert(&table, values),
            Statement::Update {
                table,
                row_index,
                assignments,
            } => {
                let values = inner.merge_assignments(&table, row_index, &assignments)?;
                inner.update(&table, row_index, values)
            }
            Statement::Delete { table, row_index } => inner.delete(&table, row_index),
            Statement::SelectAll { table } => Ok(ExecuteResult::Select(inner.select_all(&table)?)),
            Statement::SelectWhere { table, expr } => {
                Ok(ExecuteResult::Select(inner.select_where(&table, &expr)?))
            }
            Statement::Begin { isolation } => inner.begin(isolation),
            Statement::Commit => inner.commit(),
            Statement::Rollback => inner.rollback(),
            Statement::Savepoint { name } => inner.savepoint(&name),
            Statement::RollbackToSavepoint { name } => inner.rollback_to_savepoint(&name),
        }
    }

    pub fn create_table(&self, name: &str, columns: Vec<String>) -> Result<ExecuteResult> {
        self.inner.lock().create_table(name, columns)
    }

    pub fn drop_table(&self, name: &str) -> Result<ExecuteResult> {
        self.inner.lock().drop_table(name)
    }

    pub fn create_index(&self, name: &str, column: &str) -> Result<ExecuteResult> {
        self.inner.lock().create_index(name, column)
    }

    pub fn insert(&self, name: &str, values: Vec<String>) -> Result<ExecuteResult> {
        self.inner.lock().insert(name, values)
    }

    pub fn update(&self, name: &str, row_index: usize, values: Vec<String>) -> Result<ExecuteResult> {
        self.inner.lock().update(name, row_index, values)
    }

    pub fn delete(&self, name: &str, row_index: usize) -> Result<ExecuteResult> {
        self.inner.lock().delete(name, row_index)
    }

    pub fn select_all(&self, name: &str) -> Result<QueryOutput> {
        self.inner.lock().select_all(name)
    }

    /// Point equality select; served from the hash index when one exists.
    pub fn select_where_eq(&self, name: &str, column: &str, value: &str) -> Result<QueryOutput> {
        self.inner.lock().select_where_eq(name, column, value)
    }

    pub fn select_where(&self, name: &str, expr: &WhereExpr) -> Result<QueryOutput> {
        self.inner.lock().select_where(name, expr)
    }

    pub fn begin(&self, isolation: IsolationLevel) -> Result<ExecuteResult> {
        self.inner.lock().begin(isolation)
    }

    pub fn commit(&self) -> Result<ExecuteResult> {
        self.inner.lock().commit()
    }

    pub fn rollback(&self) -> Result<ExecuteResult> {
        self.inner.lock().rollback()
    }

    pub fn savepoint(&self, name: &str) -> Result<ExecuteResult> {
        self.inner.lock().savepoint(name)
    }

    pub fn rollback_to_savepoint(&self, name: &str) -> Result<ExecuteResult> {
        self.inner.lock().rollback_to_savepoint(name)
    }

    /// Aborts transactions older than `ttl` and returns how many were
    /// swept. Intended for a periodic boundary-side sweep.
    pub fn sweep_stale_transactions(&self, ttl: Duration) -> usize {
        let mut inner = self.inner.lock();
        let swept = inner.txns.sweep_stale(ttl);
        if let Some(current) = &inner.current_txn {
            if swept.contains(current) {
                inner.current_txn = None;
            }
        }
        swept.len()
    }

    /// Sorted table names, for introspection.
    pub fn tables(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Columns and indexed columns of one table, for introspection.
    pub fn table_info(&self, name: &str) -> Result<(Vec<String>, Vec<String>)> {
        let inner = self.inner.lock();
        let name = name.to_lowercase();
        match inner.tables.get(&name) {
            Some(t) => Ok((t.columns().to_vec(), t.indexed_columns().to_vec())),
            None => bail!("Table {} not found", name),
        }
    }
}

impl Inner {
    // ---- transaction plumbing -------------------------------------------

    /// Id of the current transaction, if it is still active. Clears the
    /// slot when the transaction was swept or otherwise finished.
    fn active_txn(&mut self) -> Option<String> {
        let id = self.current_txn.clone()?;
        match self.txns.get(&id) {
            Ok(tx) if tx.state() == TxnState::Active => Some(id),
            _ => {
                self.current_txn = None;
                None
            }
        }
    }

    /// Overlay state of one transaction: live tables with the buffer
    /// applied, keyed by table name. `None` marks a table dropped inside
    /// the transaction.
    fn staged_tables(&self, txn_id: &str) -> Result<HashMap<String, Option<Table>>> {
        let mut staged = HashMap::new();
        for op in self.txns.get(txn_id)?.buffer() {
            Self::apply_staged(&mut staged, &self.tables, op)?;
        }
        Ok(staged)
    }

    /// Applies one mutation to the staged overlay, pulling the live table
    /// in on first touch. Validation matches the live verbs exactly.
    fn apply_staged(
        staged: &mut HashMap<String, Option<Table>>,
        live: &HashMap<String, Table>,
        op: &TableMutation,
    ) -> Result<()> {
        let entry = staged
            .entry(op.table.clone())
            .or_insert_with(|| live.get(&op.table).cloned());

        match &op.mutation {
            Mutation::CreateTable { columns } => {
                ensure!(entry.is_none(), "Table {} already exists", op.table);
                *entry = Some(Table::new(op.table.clone(), columns.clone()));
            }
            Mutation::Insert { values } => {
                let Some(table) = entry.as_mut() else {
                    bail!("Table {} not found", op.table);
                };
                ensure!(
                    values.len() == table.column_count(),
                    "Column count does not match"
                );
                table.push_row(values.clone());
            }
            Mutation::Update { row_index, values } => {
                let Some(table) = entry.as_mut() else {
                    bail!("Table {} not found", op.table);
                };
                ensure!(*row_index < table.row_count(), "Row index out of bounds");
                ensure!(
                    values.len() == table.column_count(),
                    "Column count does not match"
                );
                table.set_row(*row_index, values.clone());
            }
            Mutation::Delete { row_index } => {
                let Some(table) = entry.as_mut() else {
                    bail!("Table {} not found", op.table);
                };
                ensure!(*row_index < table.row_count(), "Row index out of bounds");
                table.remove_row(*row_index);
            }
            Mutation::DropTable => {
                ensure!(entry.is_some(), "Table {} not found", op.table);
                *entry = None;
            }
        }
        Ok(())
    }

    /// Validates `op` against the transaction's overlay and buffers it.
    fn buffer_op(&mut self, txn_id: &str, op: TableMutation) -> Result<()> {
        let mut staged = self.staged_tables(txn_id)?;
        Self::apply_staged(&mut staged, &self.tables, &op)?;
        self.txns.get_active_mut(txn_id)?.push(op);
        Ok(())
    }

    /// The table as seen by the caller: the transaction overlay when one is
    /// active, the live table otherwise.
    fn resolve_read(&self, name: &str, txn: Option<&str>) -> Result<Cow<'_, Table>> {
        if let Some(txn_id) = txn {
            let mut staged = self.staged_tables(txn_id)?;
            match staged.remove(name) {
                Some(Some(table)) => return Ok(Cow::Owned(table)),
                Some(None) => bail!("Table {} not found", name),
                None => {}
            }
        }
        match self.tables.get(name) {
            Some(table) => Ok(Cow::Borrowed(table)),
            None => bail!("Table {} not found", name),
        }
    }

    /// Appends a record that carries information only; failure to log it
    /// does not fail the operation.
    fn log_informational(&self, op: WalOp) {
        if let Err(e) = self.wal.append("", op) {
            eprintln!("[wal] warning: failed to append record: {:#}", e);
        }
    }

    fn checkpoint_after_mutation(&self) {
        if let Err(e) = self.wal.checkpoint() {
            eprintln!("[wal] warning: failed to write checkpoint: {:#}", e);
        }
    }

    // ---- DDL ------------------------------------------------------------

    fn create_table(&mut self, name: &str, columns: Vec<String>) -> Result<ExecuteResult> {
        let name = name.to_lowercase();
        ensure!(!columns.is_empty(), "no columns specified");

        if let Some(txn_id) = self.active_txn() {
            self.buffer_op(
                &txn_id,
                TableMutation {
                    table: name.clone(),
                    mutation: Mutation::CreateTable { columns },
                },
            )?;
            return Ok(ExecuteResult::CreateTable {
                table: name,
                queued: true,
            });
        }

        ensure!(
            !self.tables.contains_key(&name),
            "Table {} already exists",
            name
        );

        self.wal
            .append(&name, WalOp::CreateTable {
                columns: columns.clone(),
            })
            .wrap_err_with(|| format!("Table {} not created: WAL append failed", name))?;

        let table = Table::new(name.clone(), columns);
        storage::save_table(&self.data_dir, &table)
            .wrap_err_with(|| format!("Table {} not created: persistence failed", name))?;
        self.tables.insert(name.clone(), table);

        self.checkpoint_after_mutation();
        Ok(ExecuteResult::CreateTable {
            table: name,
            queued: false,
        })
    }

    fn drop_table(&mut self, name: &str) -> Result<ExecuteResult> {
        let name = name.to_lowercase();

        if let Some(txn_id) = self.active_txn() {
            self.buffer_op(
                &txn_id,
                TableMutation {
                    table: name.clone(),
                    mutation: Mutation::DropTable,
                },
            )?;
            return Ok(ExecuteResult::DropTable {
                table: name,
                queued: true,
            });
        }

        ensure!(self.tables.contains_key(&name), "Table {} not found", name);

        self.wal
            .append(&name, WalOp::DropTable)
            .wrap_err_with(|| format!("Table {} not dropped: WAL append failed", name))?;

        storage::remove_table_file(&self.data_dir, &name)
            .wrap_err_with(|| format!("Table {} not dropped: unlink failed", name))?;
        self.tables.remove(&name);

        self.checkpoint_after_mutation();
        Ok(ExecuteResult::DropTable {
            table: name,
            queued: false,
        })
    }

    /// Installs an equality index on one column. Index membership is table
    /// metadata, not a logged mutation, so this bypasses the WAL and any
    /// open transaction and persists the table directly.
    fn create_index(&mut self, name: &str, column: &str) -> Result<ExecuteResult> {
        let name = name.to_lowercase();
        let column = column.trim();

        let Some(table) = self.tables.get(&name) else {
            bail!("Table {} not found", name);
        };
        ensure!(
            table.column_index(column).is_some(),
            "Column {} not found",
            column
        );

        let mut updated = table.clone();
        updated.add_indexed_column(column);
        storage::save_table(&self.data_dir, &updated)
            .wrap_err_with(|| format!("Index on {}({}) not created: persistence failed", name, column))?;
        self.tables.insert(name.clone(), updated);

        Ok(ExecuteResult::CreateIndex {
            table: name,
            column: column.to_string(),
        })
    }

    // ---- DML ------------------------------------------------------------

    fn insert(&mut self, name: &str, values: Vec<String>) -> Result<ExecuteResult> {
        let name = name.to_lowercase();

        if let Some(txn_id) = self.active_txn() {
            self.buffer_op(
                &txn_id,
                TableMutation {
                    table: name,
                    mutation: Mutation::Insert { values },
                },
            )?;
            return Ok(ExecuteResult::Insert { queued: true });
        }

        let Some(table) = self.tables.get(&name) else {
            bail!("Table {} not found", name);
        };
        ensure!(
            values.len() == table.column_count(),
            "Column count does not match"
        );

        self.wal
            .append(&name, WalOp::Insert {
                values: values.clone(),
            })
            .wrap_err("row not inserted: WAL append failed")?;

        let mut updated = table.clone();
        updated.push_row(values);
        storage::save_table(&self.data_dir, &updated)
            .wrap_err("row not inserted: persistence failed")?;
        self.tables.insert(name, updated);

        self.checkpoint_after_mutation();
        Ok(ExecuteResult::Insert { queued: false })
    }

    fn update(&mut self, name: &str, row_index: usize, values: Vec<String>) -> Result<ExecuteResult> {
        let name = name.to_lowercase();

        if let Some(txn_id) = self.active_txn() {
            self.buffer_op(
                &txn_id,
                TableMutation {
                    table: name,
                    mutation: Mutation::Update { row_index, values },
                },
            )?;
            return Ok(ExecuteResult::Update { queued: true });
        }

        let Some(table) = self.tables.get(&name) else {
            bail!("Table {} not found", name);
        };
        ensure!(row_index < table.row_count(), "Row index out of bounds");
        ensure!(
            values.len() == table.column_count(),
            "Column count does not match"
        );

        self.wal
            .append(&name, WalOp::Update {
                row_index,
                values: values.clone(),
            })
            .wrap_err("row not updated: WAL append failed")?;

        let mut updated = table.clone();
        updated.set_row(row_index, values);
        storage::save_table(&self.data_dir, &updated)
            .wrap_err("row not updated: persistence failed")?;
        self.tables.insert(name, updated);

        self.checkpoint_after_mutation();
        Ok(ExecuteResult::Update { queued: false })
    }

    fn delete(&mut self, name: &str, row_index: usize) -> Result<ExecuteResult> {
        let name = name.to_lowercase();

        if let Some(txn_id) = self.active_txn() {
            self.buffer_op(
                &txn_id,
                TableMutation {
                    table: name,
                    mutation: Mutation::Delete { row_index },
                },
            )?;
            return Ok(ExecuteResult::Delete { queued: true });
        }

        let Some(table) = self.tables.get(&name) else {
            bail!("Table {} not found", name);
        };
        ensure!(row_index < table.row_count(), "Row index out of bounds");

        self.wal
            .append(&name, WalOp::Delete { row_index })
            .wrap_err("row not deleted: WAL append failed")?;

        let mut updated = table.clone();
        updated.remove_row(row_index);
        storage::save_table(&self.data_dir, &updated)
            .wrap_err("row not deleted: persistence failed")?;
        self.tables.insert(name, updated);

        self.checkpoint_after_mutation();
        Ok(ExecuteResult::Delete { queued: false })
    }

    /// Builds the full replacement row for an assignment-style UPDATE by
    /// merging `column = value` pairs over the current row.
    fn merge_assignments(
        &mut self,
        name: &str,
        row_index: usize,
        assignments: &[(String, String)],
    ) -> Result<Vec<String>> {
        let name = name.to_lowercase();
        let txn = self.active_txn();
        let table = self.resolve_read(&name, txn.as_deref())?;

        ensure!(row_index < table.row_count(), "Row index out of bounds");
        let mut values = table
            .row(row_index)
            .map(|r| r.to_vec())
            .unwrap_or_default();

        for (column, value) in assignments {
            let Some(idx) = table.column_index(column) else {
                bail!("Column {} not found", column);
            };
            values[idx] = value.clone();
        }
        Ok(values)
    }

    // ---- reads ----------------------------------------------------------

    fn select_all(&mut self, name: &str) -> Result<QueryOutput> {
        let name = name.to_lowercase();
        let txn = self.active_txn();
        let table = self.resolve_read(&name, txn.as_deref())?;

        Ok(QueryOutput {
            columns: table.columns().to_vec(),
            rows: table.rows().to_vec(),
        })
    }

    fn select_where_eq(&mut self, name: &str, column: &str, value: &str) -> Result<QueryOutput> {
        let name = name.to_lowercase();
        let txn = self.active_txn();
        let table = self.resolve_read(&name, txn.as_deref())?;

        ensure!(
            table.column_index(column).is_some(),
            "Column {} not found",
            column
        );

        let rows = match table.index_lookup(column, value) {
            Some(positions) => positions
                .iter()
                .filter_map(|&p| table.row(p).map(|r| r.to_vec()))
                .collect(),
            None => {
                let col_idx = table.column_index(column).unwrap_or_default();
                table
                    .rows()
                    .iter()
                    .filter(|row| row.get(col_idx).map(String::as_str) == Some(value))
                    .cloned()
                    .collect()
            }
        };

        Ok(QueryOutput {
            columns: table.columns().to_vec(),
            rows,
        })
    }

    fn select_where(&mut self, name: &str, expr: &WhereExpr) -> Result<QueryOutput> {
        let name = name.to_lowercase();
        let txn = self.active_txn();
        let table = self.resolve_read(&name, txn.as_deref())?;

        for column in expr.columns() {
            ensure!(
                table.column_index(column).is_some(),
                "Column {} not found",
                column
            );
        }

        // A lone equality on an indexed column bypasses the evaluator.
        if let Some((column, value)) = expr.as_equality() {
            if table.is_indexed(column) {
                let rows = table
                    .index_lookup(column, value)
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(|&p| table.row(p).map(|r| r.to_vec()))
                    .collect();
                return Ok(QueryOutput {
                    columns: table.columns().to_vec(),
                    rows,
                });
            }
        }

        let mut rows = Vec::new();
        for row in table.rows() {
            if expr.evaluate(row, table.columns())? {
                rows.push(row.clone());
            }
        }

        Ok(QueryOutput {
            columns: table.columns().to_vec(),
            rows,
        })
    }

    // ---- transaction verbs ----------------------------------------------

    fn begin(&mut self, isolation: IsolationLevel) -> Result<ExecuteResult> {
        ensure!(
            self.active_txn().is_none(),
            "a transaction is already active"
        );

        let txn_id = self.txns.begin(isolation);
        if let Err(e) = self.wal.append("", WalOp::BeginTx {
            isolation_level: isolation,
        }) {
            let _ = self.txns.finish(&txn_id, TxnState::RolledBack);
            return Err(e.wrap_err("transaction not started: WAL append failed"));
        }

        self.current_txn = Some(txn_id.clone());
        Ok(ExecuteResult::Begin { txn_id, isolation })
    }

    fn commit(&mut self) -> Result<ExecuteResult> {
        let Some(txn_id) = self.active_txn() else {
            bail!("no active transaction");
        };

        // Stage the whole buffer against clones first; any failure rolls
        // the transaction back with live state untouched.
        let buffer = self.txns.get(&txn_id)?.buffer().to_vec();
        let mut staged: HashMap<String, Option<Table>> = HashMap::new();
        for (i, op) in buffer.iter().enumerate() {
            if let Err(e) = Self::apply_staged(&mut staged, &self.tables, op) {
                let _ = self.txns.finish(&txn_id, TxnState::RolledBack);
                self.current_txn = None;
                self.log_informational(WalOp::RollbackTx);
                return Err(e.wrap_err(format!(
                    "transaction rolled back: failed to apply operation {}",
                    i
                )));
            }
        }

        // One envelope, one fsync: the commit point. The transaction stays
        // active and retryable if this append fails.
        self.wal
            .append("", WalOp::CommitTx {
                operations: buffer.clone(),
            })
            .wrap_err("commit failed: WAL append failed")?;

        let operations = buffer.len();
        let _ = self.txns.finish(&txn_id, TxnState::Committed);
        self.current_txn = None;

        // Install the staged tables. The envelope already made the commit
        // durable, so a file write failure here only means the data files
        // lag until the next successful mutation or startup replay.
        let mut persist_errors = Vec::new();
        for (name, staged_table) in staged {
            match staged_table {
                Some(table) => {
                    if let Err(e) = storage::save_table(&self.data_dir, &table) {
                        persist_errors.push(format!("{}: {:#}", name, e));
                    }
                    self.tables.insert(name, table);
                }
                None => {
                    self.tables.remove(&name);
                    if let Err(e) = storage::remove_table_file(&self.data_dir, &name) {
                        persist_errors.push(format!("{}: {:#}", name, e));
                    }
                }
            }
        }

        if !persist_errors.is_empty() {
            bail!(
                "transaction committed but persistence failed for [{}]; state converges on next startup",
                persist_errors.join(", ")
            );
        }

        self.checkpoint_after_mutation();
        Ok(ExecuteResult::Commit { operations })
    }

    fn rollback(&mut self) -> Result<ExecuteResult> {
        let Some(txn_id) = self.active_txn() else {
            bail!("no active transaction");
        };

        let _ = self.txns.finish(&txn_id, TxnState::RolledBack);
        self.current_txn = None;
        self.log_informational(WalOp::RollbackTx);
        Ok(ExecuteResult::Rollback)
    }

    fn savepoint(&mut self, name: &str) -> Result<ExecuteResult> {
        let Some(txn_id) = self.active_txn() else {
            bail!("no active transaction");
        };

        let depth = self.txns.get_active_mut(&txn_id)?.create_savepoint(name);
        self.log_informational(WalOp::Savepoint {
            name: name.to_string(),
            depth,
        });
        Ok(ExecuteResult::Savepoint {
            name: name.to_string(),
        })
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<ExecuteResult> {
        let Some(txn_id) = self.active_txn() else {
            bail!("no active transaction");
        };

        self.txns
            .get_active_mut(&txn_id)?
            .rollback_to_savepoint(name)?;
        self.log_informational(WalOp::RollbackToSavepoint {
            name: name.to_string(),
        });
        Ok(ExecuteResult::RollbackToSavepoint {
            name: name.to_string(),
        })
    }
}
