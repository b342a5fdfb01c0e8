//! On-disk persistence: atomic table files and the write-ahead log.

pub mod persist;
pub mod wal;

pub use persist::{load_tables, remove_table_file, save_table, table_path};
pub use wal::{Mutation, TableMutation, WalManager, WalOp, WalRecord, WalScan};
