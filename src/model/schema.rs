//! Schema introspection types (spec §3 `DataSchema`, `DataColumn`).

use crate::types::SemanticType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric summary statistics computed once at connect/profile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub p25: f64,
    pub p75: f64,
}

/// One column's profile (spec §3 `DataColumn`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Up to 20 representative sample values.
    pub samples: Vec<Value>,
    pub unique_count: usize,
    pub null_count: usize,
    pub total_count: usize,
    pub numeric_stats: Option<NumericStats>,
    /// Top values by count, categoricals only.
    pub top_values: Option<Vec<(Value, usize)>>,
}

impl DataColumn {
    pub const MAX_SAMPLES: usize = 20;
}

/// An inferred or declared foreign-key relationship between two tables in the
/// same schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// One table's shape: row count plus its columns, in schema order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub row_count: usize,
    pub columns: Vec<DataColumn>,
}

/// A full schema: every table in a source plus the foreign keys linking them
/// (spec §3 invariant: every foreign-key endpoint refers to an existing
/// table+column in the same schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSchema {
    pub tables: IndexMap<String, TableSchema>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl DataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .map(|t| t.columns.iter().any(|c| c.name == column))
            .unwrap_or(false)
    }

    /// Validate the invariant that every foreign key refers to an existing
    /// table+column pair within this schema.
    pub fn validate_foreign_keys(&self) -> anyhow::Result<()> {
        for fk in &self.foreign_keys {
            anyhow::ensure!(
                self.has_column(&fk.table, &fk.column),
                "foreign key references unknown column {}.{}",
                fk.table,
                fk.column
            );
            anyhow::ensure!(
                self.has_column(&fk.ref_table, &fk.ref_column),
                "foreign key references unknown column {}.{}",
                fk.ref_table,
                fk.ref_column
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn validate_foreign_keys_accepts_valid_references() {
        let mut schema = DataSchema::new();
        schema.tables.insert(
            "orders".to_string(),
            TableSchema { row_count: 1, columns: vec![sample_column("product_id")] },
        );
        schema.tables.insert(
            "products".to_string(),
            TableSchema { row_count: 1, columns: vec![sample_column("product_id")] },
        );
        schema.foreign_keys.push(ForeignKey {
            table: "orders".into(),
            column: "product_id".into(),
            ref_table: "products".into(),
            ref_column: "product_id".into(),
        });
        assert!(schema.validate_foreign_keys().is_ok());
    }

    #[test]
    fn validate_foreign_keys_rejects_dangling_reference() {
        let mut schema = DataSchema::new();
        schema.tables.insert(
            "orders".to_string(),
            TableSchema { row_count: 1, columns: vec![sample_column("product_id")] },
        );
        schema.foreign_keys.push(ForeignKey {
            table: "orders".into(),
            column: "product_id".into(),
            ref_table: "products".into(),
            ref_column: "product_id".into(),
        });
        assert!(schema.validate_foreign_keys().is_err());
    }

    #[test]
    fn column_names_returns_empty_for_unknown_table() {
        let schema = DataSchema::new();
        assert!(schema.column_names("missing").is_empty());
    }
}
