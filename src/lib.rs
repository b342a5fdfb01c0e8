//! # RowanDB - Durable Relational Store
//!
//! RowanDB is a single-node relational store built around three guarantees:
//!
//! - **Durability**: every mutation is recorded in a write-ahead log and
//!   fsynced before the data files change
//! - **Atomicity**: table files are replaced by temp-file + rename, and
//!   transactions commit as a single logged envelope
//! - **Coherence**: in-memory hash indexes are maintained alongside every
//!   row mutation and rebuilt from the data on load
//!
//! ## Quick Start
//!
//! ```ignore
//! use rowandb::Database;
//!
//! let db = Database::open("./mydb")?;
//!
//! db.execute("CREATE TABLE users (id, name)")?;
//! db.execute("INSERT INTO users VALUES (1, 'Alice')")?;
//!
//! let result = db.execute("SELECT * FROM users WHERE name LIKE 'A%'")?;
//! println!("{}", result.render());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      Engine Façade (Database)       │
//! ├─────────────────────────────────────┤
//! │  Transaction Manager │ Predicates   │
//! ├─────────────────────────────────────┤
//! │    Table Store (rows + indexes)     │
//! ├─────────────────────────────────────┤
//! │  Atomic Table Files │ WAL Segment   │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! data_dir/
//! ├── users.table        # one self-describing JSON file per table
//! ├── orders.table
//! └── wal.log            # length-prefixed append-only log
//! ```
//!
//! ## Module Overview
//!
//! - [`database`]: engine façade, transaction manager, startup recovery
//! - [`schema`]: table representation and hash-index maintenance
//! - [`storage`]: atomic table persistence and the WAL manager
//! - [`sql`]: statement parser and WHERE predicate evaluator
//! - [`cli`]: interactive REPL with dot commands
//!
//! ## Limitations
//!
//! One active transaction per engine handle; isolation levels are recorded
//! but not enforced across connections. Row addressing is positional —
//! deletes shift subsequent rows down by one.

pub mod cli;
pub mod config;
pub mod database;
pub mod schema;
pub mod sql;
pub mod storage;

pub use database::{Database, ExecuteResult, QueryOutput, TxnState};
pub use sql::{IsolationLevel, Statement, WhereExpr};
