//! # Table Definition Module
//!
//! The in-memory representation of one table: an ordered list of column
//! names, the row data, and the equality hash indexes derived from it.
//!
//! ## Data Model
//!
//! Every stored value is a string. Rows are addressed by zero-based position;
//! there is no primary key. Deleting a row shifts every subsequent row down
//! by one, so positions are stable only between mutations.
//!
//! ## Hash Indexes
//!
//! An index maps a column's values to the ordered list of row positions
//! holding that value:
//!
//! ```text
//! indexes["name"]:  "alice" -> [0, 3]
//!                   "bob"   -> [1]
//! ```
//!
//! Indexes are pure derivations of the row data. Only the list of indexed
//! column names is persisted with the table; the buckets themselves are
//! rebuilt by a full scan on load. Inserts append the new position to each
//! indexed column's bucket. Updates and deletes shift positions or change
//! values in ways that are cheaper to repair wholesale, so both trigger a
//! full rebuild of every indexed column.
//!
//! ## Invariants
//!
//! - Every row's arity equals the column count (enforced by callers before
//!   mutation).
//! - Every name in `indexed_columns` names an existing column.
//! - For every indexed column, the union of all bucket position lists is
//!   exactly `0..row_count`.

use hashbrown::HashMap;

/// Value -> ordered row positions for one indexed column.
pub type HashIndex = HashMap<String, Vec<usize>>;

/// One table: schema, rows, and derived equality indexes.
#[derive(Debug, Clone, Default)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    indexed_columns: Vec<String>,
    indexes: HashMap<String, HashIndex>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
            indexed_columns: Vec::new(),
            indexes: HashMap::new(),
        }
    }

    /// Reconstructs a table from its persisted fields, rebuilding every
    /// index listed in `indexed_columns` by a full scan.
    pub fn from_parts(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        indexed_columns: Vec<String>,
    ) -> Self {
        let mut table = Self {
            name: name.into(),
            columns,
            rows,
            indexed_columns,
            indexes: HashMap::new(),
        };
        table.rebuild_all_indexes();
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn indexed_columns(&self) -> &[String] {
        &self.indexed_columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexed_columns.iter().any(|c| c == column)
    }

    /// Row positions holding `value` in `column`, when an index exists.
    pub fn index_lookup(&self, column: &str, value: &str) -> Option<&[usize]> {
        self.indexes
            .get(column)
            .map(|idx| idx.get(value).map(|p| p.as_slice()).unwrap_or(&[]))
    }

    /// Appends a row and extends each indexed column's bucket with the new
    /// position. The caller has already checked arity.
    pub fn push_row(&mut self, values: Vec<String>) {
        let position = self.rows.len();
        self.rows.push(values);

        let row = &self.rows[position];
        for column in &self.indexed_columns {
            let Some(col_idx) = self.columns.iter().position(|c| c == column) else {
                continue;
            };
            let bucket = self.indexes.entry(column.clone()).or_default();
            bucket
                .entry(row[col_idx].clone())
                .or_default()
                .push(position);
        }
    }

    /// Replaces the row at `index` and rebuilds every index, since the old
    /// values no longer belong in their buckets.
    pub fn set_row(&mut self, index: usize, values: Vec<String>) {
        self.rows[index] = values;
        self.rebuild_all_indexes();
    }

    /// Removes the row at `index`. Every later row shifts down one
    /// position, so all indexes are rebuilt.
    pub fn remove_row(&mut self, index: usize) {
        self.rows.remove(index);
        self.rebuild_all_indexes();
    }

    /// Registers `column` as indexed (idempotent) and builds its bucket map
    /// from the current rows.
    pub fn add_indexed_column(&mut self, column: &str) {
        if !self.is_indexed(column) {
            self.indexed_columns.push(column.to_string());
        }
        self.rebuild_index(column);
    }

    pub fn rebuild_all_indexes(&mut self) {
        self.indexes.clear();
        let columns = self.indexed_columns.clone();
        for column in &columns {
            self.rebuild_index(column);
        }
    }

    fn rebuild_index(&mut self, column: &str) {
        let Some(col_idx) = self.columns.iter().position(|c| c == column) else {
            return;
        };

        let mut bucket: HashIndex = HashMap::new();
        for (position, row) in self.rows.iter().enumerate() {
            if let Some(value) = row.get(col_idx) {
                bucket.entry(value.clone()).or_default().push(position);
            }
        }
        self.indexes.insert(column.to_string(), bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(
            "users",
            vec!["id".to_string(), "name".to_string()],
        );
        t.push_row(vec!["1".to_string(), "alice".to_string()]);
        t.push_row(vec!["2".to_string(), "bob".to_string()]);
        t.push_row(vec!["3".to_string(), "alice".to_string()]);
        t
    }

    fn index_positions(table: &Table, column: &str) -> Vec<usize> {
        let mut all: Vec<usize> = table.indexes[column]
            .values()
            .flat_map(|p| p.iter().copied())
            .collect();
        all.sort_unstable();
        all
    }

    #[test]
    fn index_buckets_cover_all_rows() {
        let mut t = sample();
        t.add_indexed_column("name");

        assert_eq!(index_positions(&t, "name"), vec![0, 1, 2]);
        assert_eq!(t.index_lookup("name", "alice"), Some(&[0, 2][..]));
        assert_eq!(t.index_lookup("name", "bob"), Some(&[1][..]));
    }

    #[test]
    fn insert_extends_index_without_rebuild() {
        let mut t = sample();
        t.add_indexed_column("name");
        t.push_row(vec!["4".to_string(), "bob".to_string()]);

        assert_eq!(t.index_lookup("name", "bob"), Some(&[1, 3][..]));
        assert_eq!(index_positions(&t, "name"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn delete_shifts_positions_and_rebuilds() {
        let mut t = sample();
        t.add_indexed_column("name");
        t.remove_row(0);

        assert_eq!(t.row_count(), 2);
        assert_eq!(t.index_lookup("name", "alice"), Some(&[1][..]));
        assert_eq!(t.index_lookup("name", "bob"), Some(&[0][..]));
        assert_eq!(t.index_lookup("name", "carol"), Some(&[][..]));
    }

    #[test]
    fn update_moves_value_between_buckets() {
        let mut t = sample();
        t.add_indexed_column("name");
        t.set_row(1, vec!["2".to_string(), "alice".to_string()]);

        assert_eq!(t.index_lookup("name", "alice"), Some(&[0, 1, 2][..]));
        assert_eq!(t.index_lookup("name", "bob"), Some(&[][..]));
    }

    #[test]
    fn from_parts_rebuilds_declared_indexes() {
        let t = Table::from_parts(
            "users",
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec!["1".to_string(), "alice".to_string()],
                vec!["2".to_string(), "bob".to_string()],
            ],
            vec!["name".to_string()],
        );

        assert!(t.is_indexed("name"));
        assert_eq!(t.index_lookup("name", "alice"), Some(&[0][..]));
    }

    #[test]
    fn bucket_values_match_row_cells() {
        let mut t = sample();
        t.add_indexed_column("name");

        let col_idx = t.column_index("name").unwrap();
        for (value, positions) in &t.indexes["name"] {
            for &p in positions {
                assert_eq!(&t.rows()[p][col_idx], value);
            }
        }
    }
}
