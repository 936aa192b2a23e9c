//! Runtime precondition checking, following the same `ValidationContext` builder
//! pattern across every domain module: collect the operation name and a few
//! attributes, then `.validate(condition, message)` to turn a failed condition into
//! a structured, consistently formatted error.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("precondition failed for {operation}: {message}")]
    PreconditionFailed { operation: String, message: String },

    #[error("postcondition failed for {operation}: {message}")]
    PostconditionFailed { operation: String, message: String },

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Builder that accumulates context for one logical operation and renders a
/// consistent error message when a condition fails.
pub struct ValidationContext {
    operation: String,
    attributes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Consume `self`; `Ok(())` if `condition` holds, otherwise a `PreconditionFailed`
    /// carrying the operation name, message, and any attributes attached so far.
    pub fn validate(self, condition: bool, message: impl Into<String>) -> Result<()> {
        if condition {
            Ok(())
        } else {
            let message = message.into();
            let attrs = if self.attributes.is_empty() {
                String::new()
            } else {
                let mut pairs: Vec<_> = self.attributes.iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                format!(
                    " ({})",
                    pairs
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            Err(ValidationError::PreconditionFailed {
                operation: self.operation,
                message: format!("{message}{attrs}"),
            }
            .into())
        }
    }
}

/// Filesystem path rules (spec §6 "Safety rules on paths").
pub mod path {
    use super::*;
    use std::path::{Path, PathBuf};

    pub const MAX_PATH_LENGTH: usize = 4096;

    /// Expand a single leading `~` (or `~/...`) using `HOME`. Paths that do not
    /// start with `~` are returned unchanged.
    pub fn expand_tilde(raw: &str) -> Result<PathBuf> {
        if let Some(rest) = raw.strip_prefix("~") {
            let home = std::env::var("HOME")
                .map_err(|_| anyhow!("cannot expand '~': HOME is not set"))?;
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            if rest.is_empty() {
                Ok(PathBuf::from(home))
            } else {
                Ok(Path::new(&home).join(rest))
            }
        } else {
            Ok(PathBuf::from(raw))
        }
    }

    /// Reject paths under any configured sandbox prefix (e.g. upload staging dirs
    /// that should never be registered as a durable source).
    pub fn validate_not_sandboxed(path: &Path, sandbox_prefixes: &[String]) -> Result<()> {
        let path_str = path.to_string_lossy();
        for prefix in sandbox_prefixes {
            if path_str.starts_with(prefix.as_str()) {
                return Err(anyhow!(
                    "path '{}' is under a sandboxed location and cannot be used as a source",
                    path_str
                ));
            }
        }
        Ok(())
    }

    pub fn validate_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(anyhow!("Path not found: {}", path.display()));
        }
        Ok(())
    }

    pub fn validate_length(path: &Path) -> Result<()> {
        let len = path.to_string_lossy().len();
        ValidationContext::new("path.validate_length")
            .with_attribute("length", len.to_string())
            .validate(len <= MAX_PATH_LENGTH, "path exceeds maximum length")
    }

    /// Full pipeline used by `add_source`/`connect_data`: expand, length-check,
    /// reject sandboxed locations, then confirm existence.
    pub fn resolve_source_path(raw: &str, sandbox_prefixes: &[String]) -> Result<PathBuf> {
        let expanded = expand_tilde(raw)?;
        validate_length(&expanded)?;
        validate_not_sandboxed(&expanded, sandbox_prefixes)?;
        validate_exists(&expanded)?;
        Ok(expanded)
    }
}

/// Derived-column name rules (spec §4.E step 1).
pub mod column_name {
    use super::*;

    /// `non-empty; no spaces, dots, or leading digit; identifier chars only`.
    pub fn validate(name: &str) -> Result<()> {
        ValidationContext::new("column_name.validate")
            .with_attribute("name", name)
            .validate(!name.is_empty(), "column name must not be empty")?;

        let first = name.chars().next().unwrap();
        ValidationContext::new("column_name.validate")
            .with_attribute("name", name)
            .validate(
                !first.is_ascii_digit(),
                "column name must not start with a digit",
            )?;

        let valid_chars = name.chars().all(|c| c.is_alphanumeric() || c == '_');
        ValidationContext::new("column_name.validate")
            .with_attribute("name", name)
            .validate(
                valid_chars,
                "column name must contain only identifier characters (letters, digits, underscore)",
            )?;

        Ok(())
    }

    pub fn validate_no_collision(name: &str, existing_source_columns: &[String]) -> Result<()> {
        let collides = existing_source_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name));
        ValidationContext::new("column_name.validate_no_collision")
            .with_attribute("name", name)
            .validate(
                !collides,
                format!("column \"{name}\" already exists on the source table"),
            )
    }
}

/// SQL-safety rules for the Source Manager's `querySql` path (spec §4.G, §8 property 10).
pub mod sql {
    use super::*;

    /// Strip a single leading `/* ... */` block comment (and surrounding whitespace)
    /// before inspecting the leading keyword.
    fn strip_leading_comment(sql: &str) -> &str {
        let trimmed = sql.trim_start();
        if let Some(rest) = trimmed.strip_prefix("/*") {
            if let Some(end) = rest.find("*/") {
                return strip_leading_comment(&rest[end + 2..]);
            }
        }
        trimmed
    }

    /// Accept only statements that begin with `SELECT` or `WITH` (case-insensitive)
    /// after stripping a leading block comment.
    pub fn validate_select_only(sql: &str) -> Result<()> {
        let body = strip_leading_comment(sql);
        let leading_word: String = body
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        ValidationContext::new("sql.validate_select_only").validate(
            leading_word == "SELECT" || leading_word == "WITH",
            "Only SELECT/WITH statements are allowed",
        )
    }

    /// Wrap validated user SQL so it can never return more than `max_rows` and can
    /// never do anything the outer `SELECT` doesn't already scope to a read.
    pub fn wrap_with_limit(sql: &str, max_rows: usize, hard_cap: usize) -> String {
        let capped = max_rows.min(hard_cap);
        format!("SELECT * FROM ({sql}) AS _q LIMIT {capped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_context_ok_on_true_condition() {
        let result = ValidationContext::new("op").validate(true, "should not happen");
        assert!(result.is_ok());
    }

    #[test]
    fn validation_context_includes_attributes_in_message() {
        let result = ValidationContext::new("op")
            .with_attribute("column", "foo")
            .validate(false, "bad thing");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("bad thing"));
        assert!(err.contains("column=foo"));
    }

    #[test]
    fn column_name_rejects_spaces_and_leading_digit() {
        assert!(column_name::validate("has space").is_err());
        assert!(column_name::validate("1abc").is_err());
        assert!(column_name::validate("a.b").is_err());
        assert!(column_name::validate("").is_err());
        assert!(column_name::validate("valid_name_2").is_ok());
    }

    #[test]
    fn column_name_detects_collision_case_insensitively() {
        let existing = vec!["Revenue".to_string()];
        assert!(column_name::validate_no_collision("revenue", &existing).is_err());
        assert!(column_name::validate_no_collision("cost", &existing).is_ok());
    }

    #[test]
    fn sql_rejects_non_select_statements() {
        assert!(sql::validate_select_only("DROP TABLE t").is_err());
        assert!(sql::validate_select_only("SELECT * FROM t; DROP TABLE t").is_ok());
        assert!(sql::validate_select_only("  /* comment */ WITH x AS (SELECT 1) SELECT * FROM x").is_ok());
    }

    #[test]
    fn sql_wrap_caps_at_hard_limit() {
        let wrapped = sql::wrap_with_limit("SELECT 1", 50_000, 10_000);
        assert!(wrapped.ends_with("LIMIT 10000"));
    }

    #[test]
    fn path_expand_tilde_uses_home() {
        std::env::set_var("HOME", "/home/tester");
        let expanded = path::expand_tilde("~/data/file.csv").unwrap();
        assert_eq!(expanded, std::path::PathBuf::from("/home/tester/data/file.csv"));
    }

    #[test]
    fn path_rejects_sandboxed_prefix() {
        let prefixes = vec!["/mnt/user-data/uploads".to_string()];
        let path = std::path::Path::new("/mnt/user-data/uploads/foo.csv");
        assert!(path::validate_not_sandboxed(path, &prefixes).is_err());
    }
}
