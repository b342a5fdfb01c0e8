//! # Write-Ahead Log
//!
//! Append-only log of every mutating operation, written and fsynced before
//! the table files change. The rule is log-before-data: a record that never
//! reached disk must never have been observable on the data side. The
//! reverse (data ahead of the log) is tolerated because replay converges on
//! the final on-disk state.
//!
//! ## Record Format
//!
//! ```text
//! +----------------+----------------------------------------+
//! | length (4B LE) | JSON payload                           |
//! +----------------+----------------------------------------+
//! ```
//!
//! The payload is self-describing:
//!
//! ```json
//! {"timestamp":1722600000123,"table_name":"users","type":"INSERT",
//!  "data":{"values":["1","alice"]}}
//! ```
//!
//! The length prefix makes the log self-framing: a torn record at the tail
//! (short prefix, short payload, or payload that no longer parses) ends the
//! scan cleanly. A head that cannot be parsed at all is real corruption and
//! aborts startup.
//!
//! ## Checkpoints
//!
//! A CHECKPOINT record declares that every mutation before it is durably
//! reflected in the table files. Replay skips everything at or before the
//! last checkpoint and re-applies only the records after it.
//!
//! ## Concurrency
//!
//! The file handle sits behind a `parking_lot::Mutex`; appends are
//! serialized and each one fsyncs before returning.

use crate::config::{WAL_FILE_NAME, WAL_LEN_PREFIX_SIZE, WAL_MAX_RECORD_SIZE};
use crate::sql::IsolationLevel;
use eyre::{bail, Result, WrapErr};
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One buffered or logged mutation against a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutation {
    CreateTable { columns: Vec<String> },
    Insert { values: Vec<String> },
    Update { row_index: usize, values: Vec<String> },
    Delete { row_index: usize },
    DropTable,
}

/// A mutation bound to its target table, as buffered by a transaction and
/// as carried inside a COMMIT_TX envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMutation {
    pub table: String,
    #[serde(flatten)]
    pub mutation: Mutation,
}

/// Typed payload of one WAL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalOp {
    CreateTable { columns: Vec<String> },
    Insert { values: Vec<String> },
    Update { row_index: usize, values: Vec<String> },
    Delete { row_index: usize },
    DropTable,
    Checkpoint,
    BeginTx { isolation_level: IsolationLevel },
    CommitTx { operations: Vec<TableMutation> },
    RollbackTx,
    Savepoint { name: String, depth: usize },
    RollbackToSavepoint { name: String },
}

impl WalOp {
    /// The single-table mutation this record describes, if any. Transaction
    /// envelopes and checkpoints return `None`.
    pub fn as_mutation(&self) -> Option<Mutation> {
        match self {
            WalOp::CreateTable { columns } => Some(Mutation::CreateTable {
                columns: columns.clone(),
            }),
            WalOp::Insert { values } => Some(Mutation::Insert {
                values: values.clone(),
            }),
            WalOp::Update { row_index, values } => Some(Mutation::Update {
                row_index: *row_index,
                values: values.clone(),
            }),
            WalOp::Delete { row_index } => Some(Mutation::Delete {
                row_index: *row_index,
            }),
            WalOp::DropTable => Some(Mutation::DropTable),
            _ => None,
        }
    }
}

impl From<Mutation> for WalOp {
    fn from(mutation: Mutation) -> Self {
        match mutation {
            Mutation::CreateTable { columns } => WalOp::CreateTable { columns },
            Mutation::Insert { values } => WalOp::Insert { values },
            Mutation::Update { row_index, values } => WalOp::Update { row_index, values },
            Mutation::Delete { row_index } => WalOp::Delete { row_index },
            Mutation::DropTable => WalOp::DropTable,
        }
    }
}

/// One framed record as it appears in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub timestamp: i64,
    #[serde(rename = "table_name")]
    pub table: String,
    #[serde(flatten)]
    pub op: WalOp,
}

/// Result of scanning the whole segment.
#[derive(Debug, Default)]
pub struct WalScan {
    pub records: Vec<WalRecord>,
    /// Index into `records` of the last CHECKPOINT, if any.
    pub last_checkpoint: Option<usize>,
    /// Whether the scan stopped at a torn tail.
    pub torn_tail: bool,
}

impl WalScan {
    /// Records after the last checkpoint — the replay window.
    pub fn replay_window(&self) -> &[WalRecord] {
        let start = self.last_checkpoint.map(|i| i + 1).unwrap_or(0);
        &self.records[start..]
    }
}

/// Append-only manager for the `wal.log` segment of one data directory.
pub struct WalManager {
    path: PathBuf,
    file: Mutex<File>,
}

impl WalManager {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(WAL_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open WAL file at {:?}", path))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and fsyncs before returning.
    pub fn append(&self, table: &str, op: WalOp) -> Result<()> {
        let record = WalRecord {
            timestamp: unix_millis(),
            table: table.to_string(),
            op,
        };
        let payload =
            serde_json::to_vec(&record).wrap_err("failed to serialize WAL record")?;

        let mut file = self.file.lock();
        file.write_all(&(payload.len() as u32).to_le_bytes())
            .wrap_err("failed to write WAL record length")?;
        file.write_all(&payload)
            .wrap_err("failed to write WAL record payload")?;
        file.sync_data().wrap_err("failed to sync WAL file")?;

        Ok(())
    }

    /// Appends a CHECKPOINT record, declaring every prior mutation durably
    /// reflected in the table files.
    pub fn checkpoint(&self) -> Result<()> {
        self.append("", WalOp::Checkpoint)
    }

    /// Scans the whole segment from the start. A short or unparseable frame
    /// after at least one good record is treated as a torn tail and ends
    /// the scan cleanly; a head that never parses is corruption.
    pub fn scan(&self) -> Result<WalScan> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WalScan::default())
            }
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to open WAL file at {:?}", self.path))
            }
        };

        let len = file
            .metadata()
            .wrap_err("failed to stat WAL file")?
            .len() as usize;
        if len == 0 {
            return Ok(WalScan::default());
        }

        let mmap = unsafe {
            Mmap::map(&file)
                .wrap_err_with(|| format!("failed to mmap WAL file at {:?}", self.path))?
        };
        let len = mmap.len();

        let mut scan = WalScan::default();
        let mut offset = 0usize;

        while offset < len {
            if len - offset < WAL_LEN_PREFIX_SIZE {
                scan.torn_tail = true;
                break;
            }

            let mut prefix = [0u8; WAL_LEN_PREFIX_SIZE];
            prefix.copy_from_slice(&mmap[offset..offset + WAL_LEN_PREFIX_SIZE]);
            let record_len = u32::from_le_bytes(prefix);

            if record_len == 0 || record_len > WAL_MAX_RECORD_SIZE {
                if scan.records.is_empty() {
                    bail!(
                        "WAL head is corrupt: implausible record length {} at offset {}",
                        record_len,
                        offset
                    );
                }
                scan.torn_tail = true;
                break;
            }

            let body_start = offset + WAL_LEN_PREFIX_SIZE;
            let body_end = body_start + record_len as usize;
            if body_end > len {
                scan.torn_tail = true;
                break;
            }

            match serde_json::from_slice::<WalRecord>(&mmap[body_start..body_end]) {
                Ok(record) => {
                    if matches!(record.op, WalOp::Checkpoint) {
                        scan.last_checkpoint = Some(scan.records.len());
                    }
                    scan.records.push(record);
                }
                Err(e) => {
                    if scan.records.is_empty() {
                        return Err(e).wrap_err_with(|| {
                            format!("WAL head is corrupt at {:?}", self.path)
                        });
                    }
                    scan.torn_tail = true;
                    break;
                }
            }

            offset = body_end;
        }

        Ok(scan)
    }

    /// Resets the segment to empty. Housekeeping only — never called on the
    /// mutation path.
    pub fn truncate(&self) -> Result<()> {
        let file = self.file.lock();
        file.set_len(0).wrap_err("failed to truncate WAL file")?;
        file.sync_data()
            .wrap_err("failed to sync WAL file after truncate")?;
        Ok(())
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_scan_round_trips() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path()).unwrap();

        wal.append(
            "users",
            WalOp::CreateTable {
                columns: vec!["id".to_string(), "name".to_string()],
            },
        )
        .unwrap();
        wal.append(
            "users",
            WalOp::Insert {
                values: vec!["1".to_string(), "alice".to_string()],
            },
        )
        .unwrap();

        let scan = wal.scan().unwrap();
        assert_eq!(scan.records.len(), 2);
        assert!(!scan.torn_tail);
        assert_eq!(scan.records[0].table, "users");
        assert_eq!(
            scan.records[1].op,
            WalOp::Insert {
                values: vec!["1".to_string(), "alice".to_string()],
            }
        );
    }

    #[test]
    fn replay_window_starts_after_last_checkpoint() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path()).unwrap();

        wal.append(
            "t",
            WalOp::Insert {
                values: vec!["a".to_string()],
            },
        )
        .unwrap();
        wal.checkpoint().unwrap();
        wal.append(
            "t",
            WalOp::Insert {
                values: vec!["b".to_string()],
            },
        )
        .unwrap();

        let scan = wal.scan().unwrap();
        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.last_checkpoint, Some(1));

        let window = scan.replay_window();
        assert_eq!(window.len(), 1);
        assert_eq!(
            window[0].op,
            WalOp::Insert {
                values: vec!["b".to_string()],
            }
        );
    }

    #[test]
    fn torn_tail_is_tolerated() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path()).unwrap();

        wal.append(
            "t",
            WalOp::Insert {
                values: vec!["a".to_string()],
            },
        )
        .unwrap();

        // Simulate power loss mid-append: a length prefix with no payload.
        {
            let mut file = OpenOptions::new().append(true).open(wal.path()).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(b"{\"trunc").unwrap();
        }

        let scan = wal.scan().unwrap();
        assert_eq!(scan.records.len(), 1);
        assert!(scan.torn_tail);
    }

    #[test]
    fn corrupt_head_is_fatal() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path()).unwrap();

        std::fs::write(wal.path(), [0xFFu8; 32]).unwrap();

        assert!(wal.scan().is_err());
    }

    #[test]
    fn truncate_resets_segment() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path()).unwrap();

        wal.append(
            "t",
            WalOp::Insert {
                values: vec!["a".to_string()],
            },
        )
        .unwrap();
        wal.truncate().unwrap();

        let scan = wal.scan().unwrap();
        assert!(scan.records.is_empty());
    }

    #[test]
    fn commit_envelope_round_trips() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path()).unwrap();

        let operations = vec![
            TableMutation {
                table: "t".to_string(),
                mutation: Mutation::Insert {
                    values: vec!["a".to_string()],
                },
            },
            TableMutation {
                table: "t".to_string(),
                mutation: Mutation::Delete { row_index: 0 },
            },
        ];
        wal.append("", WalOp::CommitTx {
            operations: operations.clone(),
        })
        .unwrap();

        let scan = wal.scan().unwrap();
        match &scan.records[0].op {
            WalOp::CommitTx { operations: got } => assert_eq!(got, &operations),
            other => panic!("expected CommitTx, got {:?}", other),
        }
    }
}
