//! Source Manager: owns the registry of data sources, lazily connects to
//! them, and is the only path through which SQL reaches a connector.

use crate::connector;
use crate::contracts::{ConnectedSource, QueryResult};
use crate::errors::DolexError;
use crate::model::{ConnectedSourceInfo, DataSchema, Source, SourceConfig};
use crate::source::registry::Registry;
use crate::types::{SourceId, ValidatedName};
use crate::util::edit_distance::closest_match;
use crate::validation::sql;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct SourceManagerConfig {
    pub registry_path: PathBuf,
    pub sandbox_prefixes: Vec<String>,
    pub max_query_rows: usize,
    pub hard_row_cap: usize,
}

/// Owns every registered source and the live connections opened against
/// them. Connections are established lazily: `add_source` persists the
/// registry entry and connects immediately to validate it and report schema,
/// but a process restart only reloads the registry — connections are
/// re-established on first use.
pub struct SourceManager {
    config: SourceManagerConfig,
    sources: Mutex<Vec<Source>>,
    connections: Mutex<HashMap<String, Arc<dyn ConnectedSource>>>,
}

impl SourceManager {
    pub fn new(config: SourceManagerConfig) -> Self {
        let registry = Registry::load(&config.registry_path);
        Self { config, sources: Mutex::new(registry.sources), connections: Mutex::new(HashMap::new()) }
    }

    async fn persist(&self, sources: &[Source]) -> Result<()> {
        let registry = Registry { sources: sources.to_vec() };
        registry.save(&self.config.registry_path)
    }

    /// Register a new source, connecting immediately to validate it and
    /// report its tables. Rejects duplicate names.
    pub async fn add_source(&self, name: &str, config: SourceConfig) -> Result<ConnectedSourceInfo, DolexError> {
        let validated = ValidatedName::new(name).map_err(|e| DolexError::user_input(e.to_string()))?;
        let name = validated.as_str();

        {
            let sources = self.sources.lock().await;
            if sources.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                return Err(DolexError::user_input(format!("a source named \"{name}\" already exists")));
            }
        }

        let connector = connector::for_source_type(config.source_type());
        connector
            .test(&config)
            .await
            .map_err(|e| DolexError::backend(e.to_string()))?;
        let connected = connector
            .connect(&config)
            .await
            .map_err(|e| DolexError::backend(e.to_string()))?;
        let schema = connected.get_schema().await.map_err(|e| DolexError::backend(e.to_string()))?;

        let mut source = Source::new(name.to_string(), config.clone());
        source.connected_at = Some(chrono::Utc::now());
        let info = ConnectedSourceInfo {
            source_id: source.id.clone(),
            name: source.name.clone(),
            source_type: config.source_type(),
            tables: schema.tables.keys().cloned().collect(),
        };

        {
            let mut sources = self.sources.lock().await;
            sources.push(source);
            self.persist(&sources).await.map_err(|e| DolexError::backend(e.to_string()))?;
        }
        {
            let mut connections = self.connections.lock().await;
            connections.insert(info.source_id.as_str().to_string(), Arc::from(connected));
        }

        info!(source = %info.name, tables = info.tables.len(), "added source");
        Ok(info)
    }

    /// Resolve a caller-supplied identifier (source ID, exact name, or
    /// case-insensitive name) to a registered `Source`.
    pub async fn find_entry(&self, id_or_name: &str) -> Option<Source> {
        let sources = self.sources.lock().await;
        if let Ok(id) = SourceId::parse(id_or_name) {
            if let Some(source) = sources.iter().find(|s| s.id == id) {
                return Some(source.clone());
            }
        }
        sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(id_or_name))
            .cloned()
            .or_else(|| {
                let derived = SourceId::from_name(id_or_name);
                sources.iter().find(|s| s.id == derived).cloned()
            })
    }

    pub async fn list_sources(&self) -> Vec<Source> {
        self.sources.lock().await.clone()
    }

    pub async fn remove_source(&self, id_or_name: &str) -> Result<(), DolexError> {
        let source = self
            .find_entry(id_or_name)
            .await
            .ok_or_else(|| DolexError::user_input(format!("unknown source: {id_or_name}")))?;

        {
            let mut connections = self.connections.lock().await;
            if let Some(conn) = connections.remove(source.id.as_str()) {
                let _ = conn.close().await;
            }
        }
        {
            let mut sources = self.sources.lock().await;
            sources.retain(|s| s.id != source.id);
            self.persist(&sources).await.map_err(|e| DolexError::backend(e.to_string()))?;
        }
        Ok(())
    }

    /// Get (lazily connecting if necessary) the live connection for a source.
    pub async fn get_connection(&self, source: &Source) -> Result<Arc<dyn ConnectedSource>, DolexError> {
        {
            let connections = self.connections.lock().await;
            if let Some(conn) = connections.get(source.id.as_str()) {
                return Ok(conn.clone());
            }
        }
        let connector = connector::for_source_type(source.config.source_type());
        let connected = connector
            .connect(&source.config)
            .await
            .map_err(|e| DolexError::backend(e.to_string()))?;
        let connected: Arc<dyn ConnectedSource> = Arc::from(connected);
        self.connections.lock().await.insert(source.id.as_str().to_string(), connected.clone());
        Ok(connected)
    }

    pub async fn get_schema(&self, source: &Source) -> Result<DataSchema, DolexError> {
        let conn = self.get_connection(source).await?;
        conn.get_schema().await.map_err(|e| DolexError::backend(e.to_string()))
    }

    /// Validate, cap, and execute caller-supplied SQL against one source,
    /// enriching "no such column/table/function" failures with a
    /// suggestion drawn from the live schema.
    pub async fn query_sql(&self, source: &Source, raw_sql: &str, requested_max_rows: Option<usize>) -> Result<QueryResult, DolexError> {
        sql::validate_select_only(raw_sql).map_err(|e| DolexError::user_input(e.to_string()))?;
        let wrapped = sql::wrap_with_limit(
            raw_sql,
            requested_max_rows.unwrap_or(self.config.max_query_rows),
            self.config.hard_row_cap,
        );

        let conn = self.get_connection(source).await?;
        match conn.execute_query(&wrapped).await {
            Ok(result) => Ok(result),
            Err(e) => Err(self.enrich_sql_error(source, e).await),
        }
    }

    /// Enrich a "no such column/table/function" backend error with the
    /// actual available names from the live schema (spec §4.G step 5, §7).
    async fn enrich_sql_error(&self, source: &Source, err: anyhow::Error) -> DolexError {
        let message = err.to_string();
        let schema = self.get_schema(source).await.ok();

        if let Some(column) = extract_unknown_reference(&message, "column") {
            let known_columns: Vec<String> = schema
                .as_ref()
                .map(|s| s.tables.values().flat_map(|t| t.columns.iter().map(|c| c.name.clone())).collect())
                .unwrap_or_default();
            let suggestion = self.suggest_column(&column, &known_columns);
            return DolexError::UnknownColumn { column, suggestion };
        }

        if let Some(table) = extract_unknown_reference(&message, "table") {
            let known_tables: Vec<String> = schema.as_ref().map(|s| s.tables.keys().cloned().collect()).unwrap_or_default();
            let suggestion = self.suggest_column(&table, &known_tables);
            return DolexError::user_input(format_enriched_reference("table", &table, &suggestion, &known_tables));
        }

        if let Some(function) = extract_unknown_reference(&message, "function") {
            let known_functions: Vec<String> = KNOWN_SQL_FUNCTIONS.iter().map(|s| s.to_string()).collect();
            let suggestion = self.suggest_column(&function, &known_functions);
            return DolexError::user_input(format_enriched_reference("function", &function, &suggestion, &known_functions));
        }

        DolexError::backend(message)
    }

    /// Suggest the closest known name for an unrecognized one, bounded edit
    /// distance 2 (§7 "did you mean").
    pub fn suggest_column(&self, unknown: &str, known_names: &[String]) -> Option<String> {
        closest_match(unknown, known_names, 2).map(|s| s.to_string())
    }
}

/// Names of the SQL functions Dolex's queries are expected to use, kept here
/// as the "available names" catalog for "no such function" enrichment since
/// there is no live-schema equivalent for functions the way there is for
/// tables/columns.
const KNOWN_SQL_FUNCTIONS: &[&str] = &[
    "sum", "avg", "min", "max", "count", "abs", "round", "coalesce", "ifnull", "length", "upper", "lower", "trim",
    "substr", "strftime", "date", "datetime", "cast", "total", "group_concat",
];

fn format_enriched_reference(kind: &str, name: &str, suggestion: &Option<String>, available: &[String]) -> String {
    let mut message = format!("no such {kind}: {name}");
    if let Some(s) = suggestion {
        message.push_str(&format!(", did you mean \"{s}\"?"));
    }
    if !available.is_empty() {
        message.push_str(&format!(" (available {kind}s: {})", available.join(", ")));
    }
    message
}

fn extract_unknown_reference<'a>(message: &'a str, kind: &str) -> Option<String> {
    let needle = format!("no such {kind}: ");
    message.find(&needle).map(|pos| {
        message[pos + needle.len()..]
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> SourceManagerConfig {
        SourceManagerConfig {
            registry_path: dir.join("sources.json"),
            sandbox_prefixes: vec![],
            max_query_rows: 1000,
            hard_row_cap: 10_000,
        }
    }

    #[tokio::test]
    async fn add_source_rejects_duplicate_name() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id\n1\n").unwrap();

        let manager = SourceManager::new(config(dir.path()));
        let cfg = SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() };
        manager.add_source("orders", cfg.clone()).await.unwrap();
        let err = manager.add_source("orders", cfg).await.unwrap_err();
        assert!(matches!(err, DolexError::UserInput { .. }));
    }

    #[tokio::test]
    async fn find_entry_matches_case_insensitive_name() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id\n1\n").unwrap();

        let manager = SourceManager::new(config(dir.path()));
        let cfg = SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() };
        manager.add_source("Orders", cfg).await.unwrap();

        assert!(manager.find_entry("orders").await.is_some());
        assert!(manager.find_entry("ORDERS").await.is_some());
    }

    #[tokio::test]
    async fn query_sql_rejects_non_select() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id\n1\n").unwrap();

        let manager = SourceManager::new(config(dir.path()));
        let cfg = SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() };
        manager.add_source("orders", cfg).await.unwrap();
        let source = manager.find_entry("orders").await.unwrap();

        let err = manager.query_sql(&source, "DROP TABLE orders", None).await.unwrap_err();
        assert!(matches!(err, DolexError::UserInput { .. }));
    }

    #[tokio::test]
    async fn query_sql_enriches_unknown_column_with_suggestion() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id,revenue\n1,10\n").unwrap();

        let manager = SourceManager::new(config(dir.path()));
        let cfg = SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() };
        manager.add_source("orders", cfg).await.unwrap();
        let source = manager.find_entry("orders").await.unwrap();

        let err = manager.query_sql(&source, "SELECT revenu FROM orders", None).await.unwrap_err();
        match err {
            DolexError::UnknownColumn { column, suggestion } => {
                assert_eq!(column, "revenu");
                assert_eq!(suggestion.as_deref(), Some("revenue"));
            }
            other => panic!("expected UnknownColumn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_sql_enriches_unknown_table_with_available_names() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id\n1\n").unwrap();

        let manager = SourceManager::new(config(dir.path()));
        let cfg = SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() };
        manager.add_source("orders", cfg).await.unwrap();
        let source = manager.find_entry("orders").await.unwrap();

        let err = manager.query_sql(&source, "SELECT * FROM orderz", None).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("did you mean \"orders\""), "{message}");
        assert!(message.contains("orders"), "{message}");
    }

    #[tokio::test]
    async fn remove_source_drops_registry_entry() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        std::fs::write(&csv_path, "id\n1\n").unwrap();

        let manager = SourceManager::new(config(dir.path()));
        let cfg = SourceConfig::Csv { path: csv_path.to_string_lossy().to_string() };
        manager.add_source("orders", cfg).await.unwrap();
        manager.remove_source("orders").await.unwrap();
        assert!(manager.find_entry("orders").await.is_none());
    }
}
