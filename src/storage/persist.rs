//! # Table Persistence
//!
//! One self-describing JSON file per table. The file carries exactly the
//! four durable fields — name, columns, rows, and the list of indexed
//! columns. Index buckets are derivations and never hit disk.
//!
//! ## Atomicity
//!
//! A table file is replaced, never patched. Each save serializes the table
//! to a temp file in the same directory, fsyncs the temp file, renames it
//! over the final path, and fsyncs the directory so the rename itself is
//! durable. A reader (or a crashed restart) therefore observes either the
//! old file or the new one, never a torn write. This rename is the
//! durability boundary that a WAL checkpoint record declares.
//!
//! ## Loading
//!
//! Startup loads every `*.table` file in the data directory. Unreadable or
//! unparseable files are skipped so one damaged table does not take down
//! the rest; WAL replay runs afterwards and may still reconstruct them.

use crate::config::TABLE_FILE_EXT;
use crate::schema::Table;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// On-disk layout of a `.table` file.
#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    #[serde(default)]
    indexed_columns: Vec<String>,
}

/// Final path of a table's data file.
pub fn table_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", name.to_lowercase(), TABLE_FILE_EXT))
}

/// Writes `table` to its data file atomically: temp file in the same
/// directory, fsync, rename, directory fsync.
pub fn save_table(data_dir: &Path, table: &Table) -> Result<()> {
    let payload = TableFile {
        name: table.name().to_string(),
        columns: table.columns().to_vec(),
        rows: table.rows().to_vec(),
        indexed_columns: table.indexed_columns().to_vec(),
    };
    let data = serde_json::to_vec_pretty(&payload)
        .wrap_err_with(|| format!("failed to serialize table {}", table.name()))?;

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", table.name()))
        .suffix(".tmp")
        .tempfile_in(data_dir)
        .wrap_err_with(|| format!("failed to create temp file in {:?}", data_dir))?;

    use std::io::Write;
    temp.as_file()
        .write_all(&data)
        .wrap_err_with(|| format!("failed to write temp file for table {}", table.name()))?;
    temp.as_file()
        .sync_all()
        .wrap_err_with(|| format!("failed to fsync temp file for table {}", table.name()))?;

    let final_path = table_path(data_dir, table.name());
    temp.persist(&final_path)
        .wrap_err_with(|| format!("failed to rename temp file to {:?}", final_path))?;

    sync_dir(data_dir)
}

/// Unlinks a table's data file. Absence is not an error.
pub fn remove_table_file(data_dir: &Path, name: &str) -> Result<()> {
    let path = table_path(data_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => sync_dir(data_dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).wrap_err_with(|| format!("failed to remove table file {:?}", path)),
    }
}

/// Loads every readable `.table` file from `data_dir`, rebuilding the hash
/// indexes declared by each file. Damaged files are skipped.
pub fn load_tables(data_dir: &Path) -> Result<Vec<Table>> {
    let entries = fs::read_dir(data_dir)
        .wrap_err_with(|| format!("failed to read data directory {:?}", data_dir))?;

    let mut tables = Vec::new();
    for entry in entries {
        let entry = entry.wrap_err("failed to read directory entry")?;
        let path = entry.path();

        if path.extension().map(|e| e == TABLE_FILE_EXT) != Some(true) {
            continue;
        }

        let Ok(raw) = fs::read(&path) else {
            continue;
        };
        let Ok(disk) = serde_json::from_slice::<TableFile>(&raw) else {
            continue;
        };

        // Prefer the embedded name; fall back to the file stem.
        let name = if disk.name.is_empty() {
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_lowercase(),
                None => continue,
            }
        } else {
            disk.name.to_lowercase()
        };

        tables.push(Table::from_parts(
            name,
            disk.columns,
            disk.rows,
            disk.indexed_columns,
        ));
    }

    Ok(tables)
}

/// Fsyncs the directory so a completed rename or unlink is durable.
fn sync_dir(dir: &Path) -> Result<()> {
    let handle =
        File::open(dir).wrap_err_with(|| format!("failed to open directory {:?}", dir))?;
    handle
        .sync_all()
        .wrap_err_with(|| format!("failed to fsync directory {:?}", dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Table {
        let mut t = Table::new("users", vec!["id".to_string(), "name".to_string()]);
        t.push_row(vec!["1".to_string(), "alice".to_string()]);
        t.push_row(vec!["2".to_string(), "bob".to_string()]);
        t.add_indexed_column("name");
        t
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let table = sample();

        save_table(dir.path(), &table).unwrap();
        let loaded = load_tables(dir.path()).unwrap();

        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];
        assert_eq!(got.name(), "users");
        assert_eq!(got.columns(), table.columns());
        assert_eq!(got.rows(), table.rows());
        assert_eq!(got.indexed_columns(), table.indexed_columns());
        assert_eq!(got.index_lookup("name", "bob"), Some(&[1][..]));
    }

    #[test]
    fn save_overwrites_previous_file() {
        let dir = tempdir().unwrap();
        let mut table = sample();

        save_table(dir.path(), &table).unwrap();
        table.push_row(vec!["3".to_string(), "carol".to_string()]);
        save_table(dir.path(), &table).unwrap();

        let loaded = load_tables(dir.path()).unwrap();
        assert_eq!(loaded[0].row_count(), 3);
    }

    #[test]
    fn damaged_file_is_skipped() {
        let dir = tempdir().unwrap();
        save_table(dir.path(), &sample()).unwrap();
        fs::write(dir.path().join("broken.table"), b"{not json").unwrap();

        let loaded = load_tables(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name(), "users");
    }

    #[test]
    fn remove_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        remove_table_file(dir.path(), "ghost").unwrap();
    }

    #[test]
    fn table_names_are_lowercased_on_disk() {
        let dir = tempdir().unwrap();
        let table = Table::new("Users", vec!["id".to_string()]);

        save_table(dir.path(), &table).unwrap();
        assert!(table_path(dir.path(), "users").exists());
    }
}
