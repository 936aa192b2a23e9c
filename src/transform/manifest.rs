//! On-disk manifest of derived columns: `{tables: {<table>: [entry, ...]}}`,
//! persisted so the pipeline can replay it after a restart.

use crate::path_utils::write_atomic;
use crate::types::Layer;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// One column entry as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub column: String,
    pub expr: String,
    #[serde(rename = "type")]
    pub layer: Layer,
    #[serde(skip_serializing_if = "Option::is_none", rename = "partitionBy")]
    pub partition_by: Option<String>,
    pub order: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub tables: IndexMap<String, Vec<ManifestEntry>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        match serde_json::from_str(&contents) {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "manifest is corrupt, starting empty");
                Ok(Self::new())
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &contents)
    }

    pub fn entries_for(&self, table: &str) -> &[ManifestEntry] {
        self.tables.get(table).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Append one entry to `table`'s list, in the order it was applied. Order
    /// is derived from the current length so replay re-applies in the same
    /// sequence columns were originally added.
    pub fn push(&mut self, table: &str, column: &str, expr: &str, layer: Layer, partition_by: Option<String>) {
        let entries = self.tables.entry(table.to_string()).or_default();
        let order = entries.len();
        entries.push(ManifestEntry { column: column.to_string(), expr: expr.to_string(), layer, partition_by, order });
    }

    /// Remove a column's manifest entry, if present.
    pub fn remove(&mut self, table: &str, column: &str) {
        if let Some(entries) = self.tables.get_mut(table) {
            entries.retain(|e| e.column != column);
        }
    }
}
