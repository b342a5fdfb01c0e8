//! # WAL Recovery Tests
//!
//! Crash-recovery behavior of the write-ahead log:
//!
//! 1. A record appended to the WAL but never reflected in a table file is
//!    re-applied on the next startup (log-before-data).
//! 2. Replay only covers the window past the last checkpoint, so restarts
//!    are idempotent.
//! 3. A torn record at the tail of the log is tolerated; a corrupt head is
//!    a fatal startup error.

use rowandb::storage::{Mutation, TableMutation, WalManager, WalOp};
use rowandb::Database;
use tempfile::tempdir;

fn values(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn wal_record_without_data_file_is_replayed() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("users", values(&["id", "name"])).unwrap();
        db.insert("users", values(&["1", "A"])).unwrap();
        db.insert("users", values(&["2", "B"])).unwrap();
    }

    // Power loss after the WAL append of a third insert but before the
    // table file rename: the record exists, the data file does not have
    // the row.
    {
        let wal = WalManager::open(dir.path()).unwrap();
        wal.append(
            "users",
            WalOp::Insert {
                values: values(&["3", "C"]),
            },
        )
        .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let out = db.select_all("users").unwrap();
    assert_eq!(out.render(), "id | name\n1 | A\n2 | B\n3 | C\n");
}

#[test]
fn restart_after_checkpoint_is_idempotent() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("t", values(&["v"])).unwrap();
        db.insert("t", values(&["a"])).unwrap();
        db.insert("t", values(&["b"])).unwrap();
    }

    for _ in 0..3 {
        let db = Database::open(dir.path()).unwrap();
        let out = db.select_all("t").unwrap();
        assert_eq!(out.rows.len(), 2, "restart must not duplicate rows");
    }
}

#[test]
fn replayed_state_is_durable_without_the_wal() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("t", values(&["v"])).unwrap();
    }
    {
        let wal = WalManager::open(dir.path()).unwrap();
        wal.append(
            "t",
            WalOp::Insert {
                values: values(&["x"]),
            },
        )
        .unwrap();
    }

    // First reopen replays and re-persists the table, then checkpoints.
    {
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.select_all("t").unwrap().rows.len(), 1);
    }

    // The row must now live in the table file itself.
    let raw = std::fs::read_to_string(dir.path().join("t.table")).unwrap();
    assert!(raw.contains("\"x\""));
}

#[test]
fn replayed_drop_removes_loaded_table() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("doomed", values(&["v"])).unwrap();
        db.insert("doomed", values(&["1"])).unwrap();
    }
    {
        let wal = WalManager::open(dir.path()).unwrap();
        wal.append("doomed", WalOp::DropTable).unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    assert!(db.select_all("doomed").is_err());
    assert!(!dir.path().join("doomed.table").exists());
}

#[test]
fn replayed_create_replaces_loaded_schema() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("t", values(&["old"])).unwrap();
        db.insert("t", values(&["1"])).unwrap();
    }
    {
        let wal = WalManager::open(dir.path()).unwrap();
        wal.append(
            "t",
            WalOp::CreateTable {
                columns: values(&["fresh"]),
            },
        )
        .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let out = db.select_all("t").unwrap();
    assert_eq!(out.columns, values(&["fresh"]));
    assert_eq!(out.rows.len(), 0);
}

#[test]
fn out_of_bounds_replay_records_are_skipped() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("t", values(&["v"])).unwrap();
        db.insert("t", values(&["a"])).unwrap();
    }
    {
        let wal = WalManager::open(dir.path()).unwrap();
        wal.append(
            "t",
            WalOp::Update {
                row_index: 9,
                values: values(&["z"]),
            },
        )
        .unwrap();
        wal.append("t", WalOp::Delete { row_index: 9 }).unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let out = db.select_all("t").unwrap();
    assert_eq!(out.rows, vec![values(&["a"])]);
}

#[test]
fn torn_wal_tail_is_tolerated_on_startup() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("t", values(&["v"])).unwrap();
        db.insert("t", values(&["a"])).unwrap();
    }

    // A half-written record at the tail, as a crash mid-append leaves it.
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("wal.log"))
            .unwrap();
        file.write_all(&512u32.to_le_bytes()).unwrap();
        file.write_all(b"{\"timestamp\":12").unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.select_all("t").unwrap().rows.len(), 1);
}

#[test]
fn corrupt_wal_head_aborts_startup() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("wal.log"), [0xFFu8; 64]).unwrap();

    assert!(Database::open(dir.path()).is_err());
}

#[test]
fn committed_envelope_is_replayed_after_crash() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("t", values(&["v"])).unwrap();
    }

    // A COMMIT_TX envelope whose table writes never happened: the whole
    // buffered transaction must come back on restart.
    {
        let wal = WalManager::open(dir.path()).unwrap();
        wal.append(
            "",
            WalOp::CommitTx {
                operations: vec![
                    TableMutation {
                        table: "t".to_string(),
                        mutation: Mutation::Insert {
                            values: values(&["a"]),
                        },
                    },
                    TableMutation {
                        table: "t".to_string(),
                        mutation: Mutation::Insert {
                            values: values(&["b"]),
                        },
                    },
                    TableMutation {
                        table: "t".to_string(),
                        mutation: Mutation::Delete { row_index: 0 },
                    },
                ],
            },
        )
        .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let out = db.select_all("t").unwrap();
    assert_eq!(out.rows, vec![values(&["b"])]);
}

#[test]
fn table_round_trip_preserves_everything() {
    let dir = tempdir().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        db.create_table("users", values(&["id", "name"])).unwrap();
        db.insert("users", values(&["1", "A"])).unwrap();
        db.insert("users", values(&["2", "B"])).unwrap();
        db.create_index("users", "name").unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let out = db.select_all("users").unwrap();
    assert_eq!(out.columns, values(&["id", "name"]));
    assert_eq!(out.rows, vec![values(&["1", "A"]), values(&["2", "B"])]);

    let (columns, indexed) = db.table_info("users").unwrap();
    assert_eq!(columns, values(&["id", "name"]));
    assert_eq!(indexed, values(&["name"]));
}
