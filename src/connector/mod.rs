//! Concrete `Connector` implementations: CSV (directory of files mirrored
//! into an in-memory SQLite engine) and SQLite (direct, read-only).

pub mod csv;
pub mod sqlite;

pub use csv::CsvConnector;
pub use sqlite::SqliteConnector;

use crate::contracts::Connector;
use crate::types::SourceType;

/// Pick the connector implementation for a source type.
pub fn for_source_type(source_type: SourceType) -> Box<dyn Connector> {
    match source_type {
        SourceType::Csv => Box::new(CsvConnector),
        SourceType::Sqlite => Box::new(SqliteConnector),
    }
}
