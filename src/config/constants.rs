//! # Engine Constants
//!
//! Central location for file-layout and tuning constants shared across the
//! storage, WAL, and transaction modules.
//!
//! ## File Layout
//!
//! ```text
//! data_dir/
//! ├── users.table        # One JSON table file per table
//! ├── orders.table
//! └── wal.log            # Append-only write-ahead log segment
//! ```

use std::time::Duration;

/// Extension for per-table data files inside the data directory.
pub const TABLE_FILE_EXT: &str = "table";

/// Name of the write-ahead log segment inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.log";

/// Size of the little-endian length prefix preceding each WAL record.
pub const WAL_LEN_PREFIX_SIZE: usize = 4;

/// Upper bound on a single WAL record payload. A length prefix above this is
/// treated as corruption rather than an allocation request.
pub const WAL_MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Default age after which an abandoned transaction is swept and aborted.
pub const DEFAULT_TXN_TTL: Duration = Duration::from_secs(300);

/// Inline capacity of the per-transaction savepoint stack.
pub const SAVEPOINT_STACK_INLINE: usize = 4;
