//! CSV connector: one table per `.csv` file in a directory (or a single file
//! registered directly), profiled into a `DataSchema` at connect time and
//! mirrored into an in-memory SQLite database so `execute_query` can run
//! arbitrary read-only SQL against it.

use crate::contracts::{ConnectedSource, Connector, QueryResult, Row};
use crate::model::{profile_column, DataColumn, DataSchema, ForeignKey, SourceConfig, TableSchema};
use crate::types::SemanticType;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

const MAX_CSV_SAMPLES: usize = 30;

pub struct CsvConnector;

#[async_trait]
impl Connector for CsvConnector {
    async fn test(&self, config: &SourceConfig) -> Result<()> {
        let path = Path::new(config.path());
        if !path.exists() {
            return Err(anyhow!("path does not exist: {}", path.display()));
        }
        if path.is_dir() {
            crate::path_utils::infer_directory_source_type(path)?
                .ok_or_else(|| anyhow!("no .csv files found in {}", path.display()))?;
        }
        Ok(())
    }

    async fn connect(&self, config: &SourceConfig) -> Result<Box<dyn ConnectedSource>> {
        let path = PathBuf::from(config.path());
        let files = csv_files(&path)?;

        let mut tables: IndexMap<String, (Vec<String>, Vec<Row>)> = IndexMap::new();
        for file in &files {
            let table_name = crate::path_utils::sanitize_table_name(
                file.file_stem().and_then(|s| s.to_str()).unwrap_or("table"),
            );
            let (headers, rows) = read_csv(file)?;
            tables.insert(table_name, (headers, rows));
        }

        if tables.is_empty() {
            return Err(anyhow!("no CSV tables found at {}", path.display()));
        }

        let conn = rusqlite::Connection::open_in_memory().context("opening in-memory SQLite engine")?;
        let mut schema = DataSchema::new();

        for (table_name, (headers, rows)) in &tables {
            let columns: Vec<DataColumn> = headers
                .iter()
                .map(|h| {
                    let values: Vec<Value> = rows.iter().map(|r| r.get(h).cloned().unwrap_or(Value::Null)).collect();
                    profile_column(h, &values, Some(MAX_CSV_SAMPLES))
                })
                .collect();

            create_sqlite_table(&conn, table_name, &columns, rows)?;

            schema.tables.insert(table_name.clone(), TableSchema { row_count: rows.len(), columns });
        }

        schema.foreign_keys = infer_foreign_keys(&schema);
        info!(tables = schema.tables.len(), "connected CSV source");

        Ok(Box::new(CsvConnectedSource {
            conn: Mutex::new(conn),
            schema,
            tables: tables.into_iter().map(|(name, (_, rows))| (name, rows)).collect(),
        }))
    }
}

fn csv_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    files.sort();
    Ok(files)
}

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(trimmed.to_string())
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Row>)> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            let cell = record.get(i).unwrap_or("");
            row.insert(header.clone(), parse_cell(cell));
        }
        rows.push(row);
    }
    debug!(path = %path.display(), rows = rows.len(), "parsed CSV file");
    Ok((headers, rows))
}

pub(crate) fn sqlite_type(semantic_type: SemanticType) -> &'static str {
    match semantic_type {
        SemanticType::Numeric => "REAL",
        _ => "TEXT",
    }
}

pub(crate) fn create_sqlite_table(conn: &rusqlite::Connection, table: &str, columns: &[DataColumn], rows: &[Row]) -> Result<()> {
    let column_defs = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, sqlite_type(c.semantic_type)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(&format!("CREATE TABLE \"{table}\" ({column_defs})"), [])?;

    let placeholders = columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let column_names = columns.iter().map(|c| format!("\"{}\"", c.name)).collect::<Vec<_>>().join(", ");
    let insert_sql = format!("INSERT INTO \"{table}\" ({column_names}) VALUES ({placeholders})");
    let mut stmt = conn.prepare(&insert_sql)?;

    for row in rows {
        let values: Vec<rusqlite::types::Value> = columns
            .iter()
            .map(|c| match row.get(&c.name) {
                Some(Value::Number(n)) => n.as_f64().map(rusqlite::types::Value::Real).unwrap_or(rusqlite::types::Value::Null),
                Some(Value::String(s)) => rusqlite::types::Value::Text(s.clone()),
                Some(Value::Bool(b)) => rusqlite::types::Value::Integer(*b as i64),
                _ => rusqlite::types::Value::Null,
            })
            .collect();
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        stmt.execute(params.as_slice())?;
    }
    Ok(())
}

/// Infer foreign keys by matching `<singular>_id`-shaped column names in one
/// table against an `id` (or matching `_id`) column in another table.
fn infer_foreign_keys(schema: &DataSchema) -> Vec<ForeignKey> {
    let mut fks = Vec::new();
    for (table_name, table) in &schema.tables {
        for column in &table.columns {
            if column.semantic_type != SemanticType::Id || column.name == "id" {
                continue;
            }
            let Some(stem) = column.name.strip_suffix("_id") else { continue };
            for (other_name, other_table) in &schema.tables {
                if other_name == table_name {
                    continue;
                }
                let matches_by_name = other_name == stem || other_name == &format!("{stem}s");
                let has_id_column = other_table.columns.iter().any(|c| c.name == "id");
                if matches_by_name && has_id_column {
                    fks.push(ForeignKey {
                        table: table_name.clone(),
                        column: column.name.clone(),
                        ref_table: other_name.clone(),
                        ref_column: "id".to_string(),
                    });
                }
            }
        }
    }
    fks
}

struct CsvConnectedSource {
    conn: Mutex<rusqlite::Connection>,
    schema: DataSchema,
    tables: IndexMap<String, Vec<Row>>,
}

#[async_trait]
impl ConnectedSource for CsvConnectedSource {
    async fn get_schema(&self) -> Result<DataSchema> {
        Ok(self.schema.clone())
    }

    async fn get_sample_rows(&self, table: &str, n: usize) -> Result<Vec<Row>> {
        let rows = self.tables.get(table).ok_or_else(|| anyhow!("unknown table: {table}"))?;
        Ok(bucketed_sample(rows, n))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.to_string();
        let conn = self.conn.lock().map_err(|_| anyhow!("CSV connection lock poisoned"))?;
        run_query(&conn, &sql)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Approximately evenly spaced sample of at most `n` rows.
pub fn bucketed_sample(rows: &[Row], n: usize) -> Vec<Row> {
    if rows.len() <= n {
        return rows.to_vec();
    }
    if n == 0 {
        return Vec::new();
    }
    let step = rows.len() as f64 / n as f64;
    (0..n)
        .map(|i| rows[((i as f64 * step) as usize).min(rows.len() - 1)].clone())
        .collect()
}

pub(crate) fn run_query(conn: &rusqlite::Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows_out = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut out = Row::new();
        for (i, name) in column_names.iter().enumerate() {
            let value: rusqlite::types::Value = row.get(i)?;
            out.insert(name.clone(), sqlite_value_to_json(value));
        }
        rows_out.push(out);
    }
    Ok(QueryResult { columns: column_names, rows: rows_out })
}

pub(crate) fn sqlite_value_to_json(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::from(i),
        rusqlite::types::Value::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        rusqlite::types::Value::Text(s) => Value::String(s),
        rusqlite::types::Value::Blob(_) => Value::Null,
    }
}
