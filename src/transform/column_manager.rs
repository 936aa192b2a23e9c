//! Transactional column writes against one table's in-memory rows and schema.
//!
//! A batch either fully applies or fully rolls back: the pipeline stages every
//! write against cloned rows/columns and only swaps them into the live table
//! once every write in the batch has succeeded.

use crate::contracts::Row;
use crate::errors::DolexError;
use crate::model::DataColumn;
use serde_json::Value;

/// What to do when a write's column name collides with an existing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if the column already exists.
    Add,
    /// Replace the existing column outright.
    Overwrite,
    /// Keep the old values but mark the column so later reads prefer the new
    /// derived definition (manifest records this as the authoritative one).
    Shadow,
}

pub struct ColumnWrite {
    pub name: String,
    pub values: Vec<Value>,
    pub profile: DataColumn,
    pub mode: WriteMode,
}

/// Apply every write in `batch` to cloned copies of `rows`/`columns`, then
/// commit only if all succeeded. On any failure, `rows`/`columns` are left
/// untouched and the first error is returned.
pub fn apply_batch(
    rows: &mut Vec<Row>,
    columns: &mut Vec<DataColumn>,
    batch: Vec<ColumnWrite>,
) -> Result<(), DolexError> {
    let mut staged_rows = rows.clone();
    let mut staged_columns = columns.clone();

    for write in batch {
        apply_one(&mut staged_rows, &mut staged_columns, write)?;
    }

    *rows = staged_rows;
    *columns = staged_columns;
    Ok(())
}

fn apply_one(rows: &mut [Row], columns: &mut Vec<DataColumn>, write: ColumnWrite) -> Result<(), DolexError> {
    if write.values.len() != rows.len() {
        return Err(DolexError::backend(format!(
            "column \"{}\" produced {} values for {} rows",
            write.name,
            write.values.len(),
            rows.len()
        )));
    }

    let existing_index = columns.iter().position(|c| c.name == write.name);
    match (write.mode, existing_index) {
        (WriteMode::Add, Some(_)) => {
            return Err(DolexError::NameCollision { name: write.name });
        }
        (WriteMode::Add, None) => {
            columns.push(write.profile);
        }
        (WriteMode::Overwrite, Some(idx)) | (WriteMode::Shadow, Some(idx)) => {
            columns[idx] = write.profile;
        }
        (WriteMode::Overwrite, None) | (WriteMode::Shadow, None) => {
            columns.push(write.profile);
        }
    }

    for (row, value) in rows.iter_mut().zip(write.values.into_iter()) {
        row.insert(write.name.clone(), value);
    }

    Ok(())
}

/// Remove a column from both rows and schema. No-op if it does not exist.
pub fn drop_column(rows: &mut [Row], columns: &mut Vec<DataColumn>, name: &str) {
    columns.retain(|c| c.name != name);
    for row in rows.iter_mut() {
        row.shift_remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SemanticType;
    use serde_json::json;

    fn sample_column(name: &str) -> DataColumn {
        DataColumn {
            name: name.to_string(),
            semantic_type: SemanticType::Numeric,
            samples: vec![],
            unique_count: 0,
            null_count: 0,
            total_count: 0,
            numeric_stats: None,
            top_values: None,
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn add_rejects_name_collision() {
        let mut rows = vec![row(&[("a", json!(1))])];
        let mut columns = vec![sample_column("a")];
        let batch = vec![ColumnWrite {
            name: "a".into(),
            values: vec![json!(2)],
            profile: sample_column("a"),
            mode: WriteMode::Add,
        }];
        let err = apply_batch(&mut rows, &mut columns, batch).unwrap_err();
        assert!(matches!(err, DolexError::NameCollision { .. }));
        assert_eq!(rows[0].get("a"), Some(&json!(1)));
    }

    #[test]
    fn batch_rolls_back_entirely_on_second_write_failure() {
        let mut rows = vec![row(&[("a", json!(1))])];
        let mut columns = vec![sample_column("a")];
        let batch = vec![
            ColumnWrite { name: "b".into(), values: vec![json!(10)], profile: sample_column("b"), mode: WriteMode::Add },
            ColumnWrite { name: "a".into(), values: vec![json!(99)], profile: sample_column("a"), mode: WriteMode::Add },
        ];
        let err = apply_batch(&mut rows, &mut columns, batch);
        assert!(err.is_err());
        assert!(!rows[0].contains_key("b"));
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn overwrite_replaces_existing_values() {
        let mut rows = vec![row(&[("a", json!(1))])];
        let mut columns = vec![sample_column("a")];
        let batch = vec![ColumnWrite {
            name: "a".into(),
            values: vec![json!(42)],
            profile: sample_column("a"),
            mode: WriteMode::Overwrite,
        }];
        apply_batch(&mut rows, &mut columns, batch).unwrap();
        assert_eq!(rows[0].get("a"), Some(&json!(42)));
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn drop_column_removes_from_rows_and_schema() {
        let mut rows = vec![row(&[("a", json!(1)), ("b", json!(2))])];
        let mut columns = vec![sample_column("a"), sample_column("b")];
        drop_column(&mut rows, &mut columns, "b");
        assert!(!rows[0].contains_key("b"));
        assert_eq!(columns.len(), 1);
    }
}
