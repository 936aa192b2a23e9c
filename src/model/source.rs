//! `Source` and its type-specific configuration (spec §3 `Source`).

use crate::types::{SourceId, SourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type-specific connection configuration. CSV carries a path to a file or
/// directory; SQLite carries a path to a database file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Csv { path: String },
    Sqlite { path: String },
}

impl SourceConfig {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceConfig::Csv { .. } => SourceType::Csv,
            SourceConfig::Sqlite { .. } => SourceType::Sqlite,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            SourceConfig::Csv { path } => path,
            SourceConfig::Sqlite { path } => path,
        }
    }
}

/// A registered external dataset (spec §3). Never mutated in place — the
/// registry entry is replaced wholesale on reconnect, and `connected_at` is the
/// only field that changes over a `Source`'s lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub config: SourceConfig,
    pub connected_at: Option<DateTime<Utc>>,
}

impl Source {
    pub fn new(name: String, config: SourceConfig) -> Self {
        let id = SourceId::from_name(&name);
        Self {
            id,
            name,
            config,
            connected_at: None,
        }
    }
}

/// Summary returned to callers when listing sources or reporting a successful
/// `add_source`/`load_csv` call — never the live connection itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedSourceInfo {
    pub source_id: SourceId,
    pub name: String,
    pub source_type: SourceType,
    pub tables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_new_derives_id_from_name() {
        let source = Source::new("orders".to_string(), SourceConfig::Csv { path: "/tmp/orders.csv".into() });
        assert_eq!(source.id, SourceId::from_name("orders"));
        assert!(source.connected_at.is_none());
    }

    #[test]
    fn source_config_reports_type_and_path() {
        let config = SourceConfig::Sqlite { path: "/tmp/db.sqlite".into() };
        assert_eq!(config.source_type(), crate::types::SourceType::Sqlite);
        assert_eq!(config.path(), "/tmp/db.sqlite");
    }
}
