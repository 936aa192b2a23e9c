//! The durable part of the Source Manager: the list of registered sources,
//! persisted as JSON and tolerant of a partially-corrupt reload (bad entries
//! are dropped, not fatal).

use crate::model::Source;
use crate::path_utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub sources: Vec<Source>,
}

impl Registry {
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Registry>(&contents) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "source registry is corrupt, starting empty");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceConfig;
    use tempfile::tempdir;

    #[test]
    fn round_trips_registered_sources() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.json");

        let mut registry = Registry::default();
        registry.sources.push(Source::new("orders".into(), SourceConfig::Csv { path: "/tmp/orders.csv".into() }));
        registry.save(&path).unwrap();

        let reloaded = Registry::load(&path);
        assert_eq!(reloaded.sources.len(), 1);
        assert_eq!(reloaded.sources[0].name, "orders");
    }

    #[test]
    fn load_missing_file_returns_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = Registry::load(&dir.path().join("missing.json"));
        assert!(registry.sources.is_empty());
    }

    #[test]
    fn load_corrupt_file_falls_back_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, b"{not json").unwrap();
        let registry = Registry::load(&path);
        assert!(registry.sources.is_empty());
    }
}
