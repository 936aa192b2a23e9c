// Contract-First Design
// This module defines the core traits and their preconditions, postconditions, and
// invariants as formal specifications, following the same documentation discipline
// across every trait in this crate.

use crate::model::{DataSchema, SourceConfig};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One row of tabular data, keyed by column name.
pub type Row = indexmap::IndexMap<String, Value>;

/// The result of running raw SQL text against a connected source.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// A connector family (CSV, SQLite, ...). Implementations provide both a
/// pre-connection health check and the means to obtain a live handle.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Validate that a configuration is connectable without keeping the
    /// connection open.
    ///
    /// # Preconditions
    /// - `config` matches this connector's expected shape.
    ///
    /// # Postconditions
    /// - Returns `Ok(())` if the configuration would succeed in `connect`.
    /// - Never mutates any persistent state.
    async fn test(&self, config: &SourceConfig) -> Result<()>;

    /// Open a live handle to the configured source.
    ///
    /// # Preconditions
    /// - `config` has already passed `test`, or the caller accepts the
    ///   connect-time error as the first validation.
    ///
    /// # Postconditions
    /// - On success, the returned handle's `get_schema` reflects the source as
    ///   it exists at connect time.
    async fn connect(&self, config: &SourceConfig) -> Result<Box<dyn ConnectedSource>>;
}

/// A live handle to a connected source, owned exclusively by the Source Manager
/// (spec §3 `ConnectedSource`).
#[async_trait]
pub trait ConnectedSource: Send + Sync {
    /// Introspect tables, columns, and inferred foreign keys.
    ///
    /// # Postconditions
    /// - Every foreign-key endpoint refers to an existing table+column in the
    ///   returned schema.
    /// - Does not mutate the underlying source.
    async fn get_schema(&self) -> Result<DataSchema>;

    /// Representative rows for display (spec §4.F "sample rows for display").
    ///
    /// # Postconditions
    /// - Returns at most `n` rows.
    /// - For tables with at most `n` rows, returns all of them.
    /// - For larger tables, rows are approximately evenly spaced by position.
    async fn get_sample_rows(&self, table: &str, n: usize) -> Result<Vec<Row>>;

    /// Execute already-wrapped, already-validated read-only SQL.
    ///
    /// # Preconditions
    /// - `sql` has already passed `validation::sql::validate_select_only` and
    ///   been wrapped with a row cap by the caller (Source Manager).
    ///
    /// # Postconditions
    /// - Never mutates the underlying source (CSV in-memory table or SQLite
    ///   file opened read-only).
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Release any held resources (file handles, in-memory database).
    ///
    /// # Postconditions
    /// - Idempotent: closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_rows_preserve_column_order() {
        let mut row = Row::new();
        row.insert("name".to_string(), Value::String("Alice".into()));
        row.insert("value".to_string(), Value::from(100));
        let result = QueryResult {
            columns: vec!["name".to_string(), "value".to_string()],
            rows: vec![row],
        };
        assert_eq!(result.rows[0].keys().next().unwrap(), "name");
        assert_eq!(result.columns, vec!["name", "value"]);
    }
}
