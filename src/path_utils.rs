//! Path resolution for registering a data source (spec §6 "Safety rules on paths").
//!
//! Consolidates tilde expansion, sandbox-prefix rejection, and existence checking
//! into one pipeline so every call site (`add_source` tool handler, CLI) gets the
//! same behavior.

use crate::validation::path as path_validation;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors specific to source-path resolution.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("path '{0}' is under a sandboxed location and cannot be used as a source")]
    Sandboxed(String),

    #[error("path too long: {length} bytes (max: {max})")]
    TooLong { length: usize, max: usize },

    #[error("cannot expand '~': HOME is not set")]
    NoHome,
}

/// Configuration controlling which source paths are permitted.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    /// Path prefixes that may never be registered as a durable source (e.g.
    /// transient upload staging directories).
    pub sandbox_prefixes: Vec<String>,
}

/// Resolve a user-supplied path into an absolute, validated `PathBuf`:
/// expand `~`, reject sandboxed prefixes, confirm the path exists.
pub fn resolve_source_path(raw: &str, policy: &PathPolicy) -> Result<PathBuf> {
    let expanded = path_validation::expand_tilde(raw)?;
    debug!(raw, expanded = %expanded.display(), "resolved source path");

    path_validation::validate_length(&expanded)?;

    for prefix in &policy.sandbox_prefixes {
        if expanded.to_string_lossy().starts_with(prefix.as_str()) {
            return Err(PathError::Sandboxed(expanded.to_string_lossy().to_string()).into());
        }
    }

    if !expanded.exists() {
        return Err(PathError::NotFound(expanded.to_string_lossy().to_string()).into());
    }

    Ok(expanded)
}

/// Decide the default connector kind for a directory: CSV if it contains at
/// least one `.csv` file, SQLite if it contains a `.sqlite`/`.db` file.
///
/// Returns `None` when the directory contains neither, leaving the caller to
/// report an explicit "no recognizable tabular files" error.
pub fn infer_directory_source_type(dir: &Path) -> Result<Option<crate::types::SourceType>> {
    let mut has_csv = false;
    let mut has_sqlite = false;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => has_csv = true,
            Some("sqlite") | Some("db") => has_sqlite = true,
            _ => {}
        }
    }

    if has_csv {
        Ok(Some(crate::types::SourceType::Csv))
    } else if has_sqlite {
        Ok(Some(crate::types::SourceType::Sqlite))
    } else {
        Ok(None)
    }
}

/// Sanitize a filename (minus extension) into an identifier-safe table name,
/// used when a CSV directory produces one table per file (spec §4.F).
pub fn sanitize_table_name(stem: &str) -> String {
    let mut out: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    if out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        out = format!("t_{out}");
    }
    if out.is_empty() {
        out = "table".to_string();
    }
    out
}

/// Atomically persist `contents` to `path` via write-then-rename, so a crash
/// mid-write never leaves a half-written registry or manifest file behind
/// (spec §5: "On-disk manifest writes are atomic (write-rename)").
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("path has no parent directory: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dolex".to_string()),
        std::process::id()
    ));

    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_source_path_expands_tilde() {
        let dir = tempdir().unwrap();
        std::env::set_var("HOME", dir.path());
        std::fs::write(dir.path().join("data.csv"), "a,b\n1,2\n").unwrap();

        let policy = PathPolicy::default();
        let resolved = resolve_source_path("~/data.csv", &policy).unwrap();
        assert_eq!(resolved, dir.path().join("data.csv"));
    }

    #[test]
    fn resolve_source_path_rejects_sandbox_prefix() {
        let dir = tempdir().unwrap();
        let sandbox = dir.path().join("uploads");
        std::fs::create_dir_all(&sandbox).unwrap();
        let file = sandbox.join("data.csv");
        std::fs::write(&file, "a,b\n1,2\n").unwrap();

        let policy = PathPolicy {
            sandbox_prefixes: vec![sandbox.to_string_lossy().to_string()],
        };
        let result = resolve_source_path(&file.to_string_lossy(), &policy);
        assert!(result.is_err());
    }

    #[test]
    fn resolve_source_path_reports_not_found() {
        let policy = PathPolicy::default();
        let result = resolve_source_path("/no/such/path/exists.csv", &policy);
        assert!(matches!(
            result.unwrap_err().downcast::<PathError>(),
            Ok(PathError::NotFound(_))
        ));
    }

    #[test]
    fn infer_directory_source_type_prefers_csv() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        std::fs::write(dir.path().join("b.db"), "").unwrap();
        assert_eq!(
            infer_directory_source_type(dir.path()).unwrap(),
            Some(crate::types::SourceType::Csv)
        );
    }

    #[test]
    fn infer_directory_source_type_falls_back_to_sqlite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.sqlite"), "").unwrap();
        assert_eq!(
            infer_directory_source_type(dir.path()).unwrap(),
            Some(crate::types::SourceType::Sqlite)
        );
    }

    #[test]
    fn infer_directory_source_type_none_when_unrecognized() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        assert_eq!(infer_directory_source_type(dir.path()).unwrap(), None);
    }

    #[test]
    fn sanitize_table_name_replaces_invalid_chars_and_leading_digit() {
        assert_eq!(sanitize_table_name("2024-orders"), "t_2024_orders");
        assert_eq!(sanitize_table_name("orders"), "orders");
    }

    #[test]
    fn write_atomic_produces_readable_file_with_no_tmp_left_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("registry.json");
        write_atomic(&target, b"{\"sources\":[]}").unwrap();

        let contents = std::fs::read_to_string(&target).unwrap();
        assert_eq!(contents, "{\"sources\":[]}");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
