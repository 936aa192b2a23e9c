//! Data model types shared across the Source Manager, connectors, DSL, and
//! transform pipeline.

pub mod inference;
pub mod profile;
mod schema;
mod source;

pub use inference::{infer_semantic_type, ColumnShape};
pub use profile::{profile_column, profile_rows};
pub use schema::{DataColumn, DataSchema, ForeignKey, NumericStats, TableSchema};
pub use source::{ConnectedSourceInfo, Source, SourceConfig};
