//! SQLite connector: opens an existing database file read-only and
//! introspects its catalog directly — no in-memory mirroring needed since the
//! file already is a SQL engine.

use crate::connector::csv::bucketed_sample;
use crate::contracts::{ConnectedSource, Connector, QueryResult, Row};
use crate::model::{profile_column, DataColumn, DataSchema, ForeignKey, SourceConfig, TableSchema};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

const PROFILE_SAMPLE_ROWS: usize = 500;

pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    async fn test(&self, config: &SourceConfig) -> Result<()> {
        let path = config.path();
        if !std::path::Path::new(path).exists() {
            return Err(anyhow!("path does not exist: {path}"));
        }
        rusqlite::Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .context("opening SQLite database")?;
        Ok(())
    }

    async fn connect(&self, config: &SourceConfig) -> Result<Box<dyn ConnectedSource>> {
        let path = config.path().to_string();
        let conn = rusqlite::Connection::open_with_flags(&path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .context("opening SQLite database")?;

        let schema = introspect_schema(&conn)?;
        info!(tables = schema.tables.len(), "connected SQLite source");

        Ok(Box::new(SqliteConnectedSource { conn: Mutex::new(conn), schema }))
    }
}

fn introspect_schema(conn: &rusqlite::Connection) -> Result<DataSchema> {
    let mut schema = DataSchema::new();
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let table_names: Vec<String> = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    let mut foreign_keys = Vec::new();

    for table in &table_names {
        let row_count: usize = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?;

        let mut column_stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
        let column_names: Vec<String> = column_stmt.query_map([], |row| row.get::<_, String>(1))?.collect::<rusqlite::Result<_>>()?;
        drop(column_stmt);

        let sample_sql = format!("SELECT * FROM \"{table}\" LIMIT {PROFILE_SAMPLE_ROWS}");
        let mut sample_stmt = conn.prepare(&sample_sql)?;
        let mut sample_rows = sample_stmt.query([])?;
        let mut per_column_values: Vec<Vec<serde_json::Value>> = vec![Vec::new(); column_names.len()];
        while let Some(row) = sample_rows.next()? {
            for (i, values) in per_column_values.iter_mut().enumerate() {
                let value: rusqlite::types::Value = row.get(i)?;
                values.push(sqlite_value_to_json(value));
            }
        }
        drop(sample_stmt);

        let columns: Vec<DataColumn> = column_names
            .iter()
            .zip(per_column_values)
            .map(|(name, values)| profile_column(name, &values, None))
            .collect();

        let mut fk_stmt = conn.prepare(&format!("PRAGMA foreign_key_list(\"{table}\")"))?;
        let table_fks: Vec<(String, String, String)> = fk_stmt
            .query_map([], |row| Ok((row.get::<_, String>(2)?, row.get::<_, String>(3)?, row.get::<_, String>(4)?)))?
            .collect::<rusqlite::Result<_>>()?;
        for (ref_table, from_col, to_col) in table_fks {
            foreign_keys.push(ForeignKey {
                table: table.clone(),
                column: from_col,
                ref_table,
                ref_column: to_col,
            });
        }

        schema.tables.insert(table.clone(), TableSchema { row_count, columns });
    }

    schema.foreign_keys = foreign_keys;
    Ok(schema)
}

fn sqlite_value_to_json(value: rusqlite::types::Value) -> serde_json::Value {
    match value {
        rusqlite::types::Value::Null => serde_json::Value::Null,
        rusqlite::types::Value::Integer(i) => serde_json::Value::from(i),
        rusqlite::types::Value::Real(f) => serde_json::Number::from_f64(f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        rusqlite::types::Value::Text(s) => serde_json::Value::String(s),
        rusqlite::types::Value::Blob(_) => serde_json::Value::Null,
    }
}

struct SqliteConnectedSource {
    conn: Mutex<rusqlite::Connection>,
    schema: DataSchema,
}

#[async_trait]
impl ConnectedSource for SqliteConnectedSource {
    async fn get_schema(&self) -> Result<DataSchema> {
        Ok(self.schema.clone())
    }

    async fn get_sample_rows(&self, table: &str, n: usize) -> Result<Vec<Row>> {
        if !self.schema.tables.contains_key(table) {
            return Err(anyhow!("unknown table: {table}"));
        }
        let conn = self.conn.lock().map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
        let row_count: usize = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?;
        if row_count <= n {
            let result = run_query(&conn, &format!("SELECT * FROM \"{table}\""))?;
            return Ok(result.rows);
        }
        let all = run_query(&conn, &format!("SELECT * FROM \"{table}\""))?;
        Ok(bucketed_sample(&all.rows, n))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let conn = self.conn.lock().map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
        run_query(&conn, sql)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn run_query(conn: &rusqlite::Connection, sql: &str) -> Result<QueryResult> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn introspects_table_and_row_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE orders (id INTEGER, amount REAL)", []).unwrap();
            conn.execute("INSERT INTO orders VALUES (1, 10.5)", []).unwrap();
        }

        let connector = SqliteConnector;
        let config = SourceConfig::Sqlite { path: path.to_string_lossy().to_string() };
        let source = connector.connect(&config).await.unwrap();
        let schema = source.get_schema().await.unwrap();

        assert_eq!(schema.tables.get("orders").unwrap().row_count, 1);
    }

    #[tokio::test]
    async fn execute_query_runs_select() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE t (n INTEGER)", []).unwrap();
            conn.execute("INSERT INTO t VALUES (42)", []).unwrap();
        }

        let connector = SqliteConnector;
        let config = SourceConfig::Sqlite { path: path.to_string_lossy().to_string() };
        let source = connector.connect(&config).await.unwrap();
        let result = source.execute_query("SELECT * FROM t").await.unwrap();
        assert_eq!(result.rows[0].get("n"), Some(&serde_json::json!(42)));
    }
}
