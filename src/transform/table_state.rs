//! Bridges the read-only Source Manager with the transform pipeline's
//! in-memory working table.
//!
//! `ConnectedSource` has no write-back method (spec §4.F): derived and
//! working columns exist only in a materialized snapshot the transform
//! system owns per `(source, table)`. `TransformManager` lazily materializes
//! that snapshot on first touch — raw rows via `SourceManager::query_sql`,
//! schema columns from `get_schema`, replayed against the on-disk manifest —
//! and keeps it live across `transform_data`/`promote_columns`/`drop_columns`
//! calls for the lifetime of the process. `MaterializedSource` re-exposes a
//! snapshot as a `ConnectedSource` so the DSL hybrid executor and the
//! visualization path see derived columns exactly like any other column,
//! pushdown included.

use crate::connector::csv::{create_sqlite_table, run_query};
use crate::contracts::{ConnectedSource, QueryResult, Row};
use crate::errors::DolexError;
use crate::model::{DataColumn, Source, SourceConfig};
use crate::source::manager::SourceManager;
use crate::transform::manifest::Manifest;
use crate::transform::metadata::TransformRecord;
use crate::transform::pipeline::{DropOutcome, TransformPipeline};
use crate::types::Layer;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// Where a source's derived-column manifest lives (spec §6 "Manifest file
/// next to each source, e.g. `<table>.dolex.json`"): a sibling of a
/// single-file source, or a dotfile inside a directory source.
fn manifest_path_for(config: &SourceConfig) -> PathBuf {
    let path = Path::new(config.path());
    if path.is_dir() {
        return path.join(".dolex-manifest.json");
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("source");
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    dir.join(format!("{stem}.dolex.json"))
}

struct TableState {
    rows: Vec<Row>,
    columns: Vec<DataColumn>,
    pipeline: TransformPipeline,
    manifest: Manifest,
    manifest_path: PathBuf,
}

/// Owns one live, transform-augmented snapshot per `(source_id, table)`.
pub struct TransformManager {
    states: Mutex<HashMap<(String, String), TableState>>,
}

impl Default for TransformManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformManager {
    pub fn new() -> Self {
        Self { states: Mutex::new(HashMap::new()) }
    }

    async fn ensure_loaded(&self, source_manager: &SourceManager, source: &Source, table: &str) -> Result<(), DolexError> {
        let key = (source.id.as_str().to_string(), table.to_string());
        if self.states.lock().await.contains_key(&key) {
            return Ok(());
        }

        let schema = source_manager.get_schema(source).await?;
        let table_schema = schema
            .tables
            .get(table)
            .ok_or_else(|| DolexError::user_input(format!("unknown table: {table}")))?;
        let mut columns = table_schema.columns.clone();

        let quoted = format!("\"{}\"", table.replace('"', "\"\""));
        let result = source_manager.query_sql(source, &format!("SELECT * FROM {quoted}"), Some(usize::MAX)).await?;
        let mut rows = result.rows;

        let manifest_path = manifest_path_for(&source.config);
        let manifest = Manifest::load(&manifest_path).map_err(|e| DolexError::backend(e.to_string()))?;
        let pipeline = TransformPipeline::replay(manifest.entries_for(table), &mut rows, &mut columns);

        self.states.lock().await.insert(key, TableState { rows, columns, pipeline, manifest, manifest_path });
        Ok(())
    }

    /// The current rows/columns for a table, including every working and
    /// derived column applied so far.
    pub async fn snapshot(&self, source_manager: &SourceManager, source: &Source, table: &str) -> Result<(Vec<Row>, Vec<DataColumn>), DolexError> {
        self.ensure_loaded(source_manager, source, table).await?;
        let states = self.states.lock().await;
        let state = states.get(&(source.id.as_str().to_string(), table.to_string())).expect("just loaded");
        Ok((state.rows.clone(), state.columns.clone()))
    }

    /// A `ConnectedSource` view of the current snapshot, for the DSL hybrid
    /// executor and `visualize_from_source` — so derived columns participate
    /// in SQL pushdown exactly like source columns.
    pub async fn materialized_source(&self, source_manager: &SourceManager, source: &Source, table: &str) -> Result<MaterializedSource, DolexError> {
        self.materialized_source_with_joins(source_manager, source, table, &[]).await
    }

    /// Like `materialized_source`, but also mirrors `join_tables` (other
    /// tables in the same source referenced by a DSL query's `join` clause)
    /// into the same in-memory connection, raw and untransformed, so SQL
    /// joins across tables of one source actually resolve (spec §4.H/I).
    /// `table` itself is never duplicated even if it appears in `join_tables`.
    pub async fn materialized_source_with_joins(
        &self,
        source_manager: &SourceManager,
        source: &Source,
        table: &str,
        join_tables: &[&str],
    ) -> Result<MaterializedSource, DolexError> {
        let (rows, columns) = self.snapshot(source_manager, source, table).await?;
        let mut extra = Vec::new();
        for &joined in join_tables {
            if joined == table {
                continue;
            }
            let quoted = format!("\"{}\"", joined.replace('"', "\"\""));
            let schema = source_manager.get_schema(source).await?;
            let joined_schema = schema
                .tables
                .get(joined)
                .ok_or_else(|| DolexError::user_input(format!("unknown table: {joined}")))?;
            let result = source_manager.query_sql(source, &format!("SELECT * FROM {quoted}"), Some(usize::MAX)).await?;
            extra.push((joined.to_string(), joined_schema.columns.clone(), result.rows));
        }
        MaterializedSource::build(table, columns, rows, extra).map_err(|e| DolexError::backend(e.to_string()))
    }

    pub async fn add_column(
        &self,
        source_manager: &SourceManager,
        source: &Source,
        table: &str,
        name: &str,
        expr_text: &str,
        partition_by: Option<String>,
    ) -> Result<Vec<String>, DolexError> {
        self.ensure_loaded(source_manager, source, table).await?;
        let mut states = self.states.lock().await;
        let state = states.get_mut(&(source.id.as_str().to_string(), table.to_string())).expect("just loaded");
        state.pipeline.add_column(name, expr_text, partition_by, &mut state.rows, &mut state.columns)
    }

    pub async fn promote_columns(&self, source_manager: &SourceManager, source: &Source, table: &str, names: &[String]) -> Result<Vec<String>, DolexError> {
        self.ensure_loaded(source_manager, source, table).await?;
        let mut states = self.states.lock().await;
        let state = states.get_mut(&(source.id.as_str().to_string(), table.to_string())).expect("just loaded");
        let promoted = state.pipeline.promote_columns(names, &mut state.manifest, table)?;
        state.manifest.save(&state.manifest_path).map_err(|e| DolexError::backend(e.to_string()))?;
        Ok(promoted)
    }

    pub async fn drop_columns(&self, source_manager: &SourceManager, source: &Source, table: &str, names: &[String], layer: Layer) -> Result<DropOutcome, DolexError> {
        self.ensure_loaded(source_manager, source, table).await?;
        let mut states = self.states.lock().await;
        let state = states.get_mut(&(source.id.as_str().to_string(), table.to_string())).expect("just loaded");
        let outcome = state.pipeline.drop_columns(names, layer, &mut state.rows, &mut state.columns, &mut state.manifest, table)?;
        state.manifest.save(&state.manifest_path).map_err(|e| DolexError::backend(e.to_string()))?;
        Ok(outcome)
    }

    pub async fn list(&self, source_manager: &SourceManager, source: &Source, table: &str, layer: Option<Layer>) -> Result<Vec<TransformRecord>, DolexError> {
        self.ensure_loaded(source_manager, source, table).await?;
        let states = self.states.lock().await;
        let state = states.get(&(source.id.as_str().to_string(), table.to_string())).expect("just loaded");
        Ok(state.pipeline.list(layer).into_iter().cloned().collect())
    }
}

/// A read-only `ConnectedSource` backed by an already-materialized
/// `Vec<Row>`/`Vec<DataColumn>`, mirrored into an in-memory SQLite table the
/// same way the CSV connector does — so the hybrid executor's SQL pushdown
/// path works unchanged against data that includes derived columns.
pub struct MaterializedSource {
    conn: StdMutex<rusqlite::Connection>,
    schema_columns: Vec<DataColumn>,
    rows: Vec<Row>,
    table: String,
    joined_tables: Vec<(String, Vec<DataColumn>, usize)>,
}

impl MaterializedSource {
    fn build(table: &str, columns: Vec<DataColumn>, rows: Vec<Row>, extra: Vec<(String, Vec<DataColumn>, Vec<Row>)>) -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        create_sqlite_table(&conn, table, &columns, &rows)?;
        let mut joined_tables = Vec::new();
        for (name, join_columns, join_rows) in &extra {
            create_sqlite_table(&conn, name, join_columns, join_rows)?;
            joined_tables.push((name.clone(), join_columns.clone(), join_rows.len()));
        }
        Ok(Self { conn: StdMutex::new(conn), schema_columns: columns, rows, table: table.to_string(), joined_tables })
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.schema_columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

#[async_trait]
impl ConnectedSource for MaterializedSource {
    async fn get_schema(&self) -> Result<crate::model::DataSchema> {
        let mut schema = crate::model::DataSchema::new();
        schema.tables.insert(
            self.table.clone(),
            crate::model::TableSchema { row_count: self.rows.len(), columns: self.schema_columns.clone() },
        );
        for (name, columns, row_count) in &self.joined_tables {
            schema.tables.insert(name.clone(), crate::model::TableSchema { row_count: *row_count, columns: columns.clone() });
        }
        Ok(schema)
    }

    async fn get_sample_rows(&self, _table: &str, n: usize) -> Result<Vec<Row>> {
        Ok(crate::connector::csv::bucketed_sample(&self.rows, n))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let conn = self.conn.lock().map_err(|_| anyhow::anyhow!("materialized source lock poisoned"))?;
        run_query(&conn, sql)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceConfig;

    #[test]
    fn manifest_path_is_sibling_dolex_json_for_file_source() {
        let config = SourceConfig::Csv { path: "/data/orders.csv".into() };
        assert_eq!(manifest_path_for(&config), PathBuf::from("/data/orders.dolex.json"));
    }

    #[test]
    fn manifest_path_is_dotfile_for_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = SourceConfig::Csv { path: dir.path().to_string_lossy().to_string() };
        assert_eq!(manifest_path_for(&config), dir.path().join(".dolex-manifest.json"));
    }

    #[tokio::test]
    async fn add_column_and_snapshot_round_trip_through_transform_manager() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id,price\n1,10\n2,20\n").unwrap();

        let registry_path = dir.path().join("sources.json");
        let source_manager = SourceManager::new(crate::source::manager::SourceManagerConfig {
            registry_path,
            sandbox_prefixes: vec![],
            max_query_rows: 1000,
            hard_row_cap: 10_000,
        });
        source_manager.add_source("orders", SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() }).await.unwrap();
        let source = source_manager.find_entry("orders").await.unwrap();

        let transforms = TransformManager::new();
        transforms.add_column(&source_manager, &source, "orders", "doubled", "price * 2", None).await.unwrap();

        let (rows, columns) = transforms.snapshot(&source_manager, &source, "orders").await.unwrap();
        assert!(columns.iter().any(|c| c.name == "doubled"));
        assert_eq!(rows[0].get("doubled"), Some(&serde_json::json!(20.0)));
    }

    #[tokio::test]
    async fn materialized_source_exposes_derived_columns_to_sql() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id,price\n1,10\n2,20\n").unwrap();

        let registry_path = dir.path().join("sources.json");
        let source_manager = SourceManager::new(crate::source::manager::SourceManagerConfig {
            registry_path,
            sandbox_prefixes: vec![],
            max_query_rows: 1000,
            hard_row_cap: 10_000,
        });
        source_manager.add_source("orders", SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() }).await.unwrap();
        let source = source_manager.find_entry("orders").await.unwrap();

        let transforms = TransformManager::new();
        transforms.add_column(&source_manager, &source, "orders", "doubled", "price * 2", None).await.unwrap();

        let materialized = transforms.materialized_source(&source_manager, &source, "orders").await.unwrap();
        let result = materialized.execute_query("SELECT SUM(doubled) AS total FROM orders").await.unwrap();
        assert_eq!(result.rows[0].get("total"), Some(&serde_json::json!(60.0)));
    }

    #[tokio::test]
    async fn materialized_source_with_joins_mirrors_the_joined_table_too() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.csv"), "id,product_id\n1,p1\n2,p2\n").unwrap();
        std::fs::write(dir.path().join("products.csv"), "product_id,name\np1,Widget\np2,Gadget\n").unwrap();

        let registry_path = dir.path().join("sources.json");
        let source_manager = SourceManager::new(crate::source::manager::SourceManagerConfig {
            registry_path,
            sandbox_prefixes: vec![],
            max_query_rows: 1000,
            hard_row_cap: 10_000,
        });
        source_manager.add_source("shop", SourceConfig::Csv { path: dir.path().to_string_lossy().to_string() }).await.unwrap();
        let source = source_manager.find_entry("shop").await.unwrap();

        let transforms = TransformManager::new();
        let materialized = transforms
            .materialized_source_with_joins(&source_manager, &source, "orders", &["products"])
            .await
            .unwrap();

        let result = materialized
            .execute_query("SELECT o.id, p.name FROM orders o JOIN products p ON o.product_id = p.product_id ORDER BY o.id")
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].get("name"), Some(&serde_json::json!("Widget")));

        let schema = materialized.get_schema().await.unwrap();
        assert!(schema.tables.contains_key("products"));
    }
}
