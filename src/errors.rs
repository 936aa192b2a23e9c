//! Structured error taxonomy for Dolex.
//!
//! Every fallible core operation returns `Result<T, DolexError>` (or `anyhow::Result<T>`
//! for call sites that only need to propagate). Tool handlers convert any error reaching
//! them into the `{error: string, isError: true}` shape; no variant here carries a stack
//! trace or a filesystem path the caller did not already supply.

use thiserror::Error;

/// The five error categories named by the error-handling design, plus a sixth
/// (`Evaluation`) that the spec explicitly treats as warnings rather than failures
/// and therefore has no variant here.
#[derive(Debug, Error)]
pub enum DolexError {
    /// Bad paths, unknown sources, disallowed SQL, missing arguments, unknown pattern
    /// IDs, invalid DSL fields.
    #[error("{message}")]
    UserInput { message: String },

    /// Expression parse failure. `position` is a character offset into the source text.
    #[error("parse error at offset {position}: {message}")]
    ParseError { position: usize, message: String },

    /// Reference to a column that does not exist on the live table, with an optional
    /// bounded edit-distance suggestion.
    #[error("unknown column \"{column}\"{}", suggestion.as_ref().map(|s| format!(", did you mean \"{s}\"?")).unwrap_or_default())]
    UnknownColumn {
        column: String,
        suggestion: Option<String>,
    },

    /// A proposed derived column would close a cycle in the dependency graph.
    #[error("circular dependency: {}", cycle.join(" \u{2192} "))]
    CircularDependency { cycle: Vec<String> },

    /// A new column name collides with an existing source column.
    #[error("column \"{name}\" already exists on the source table")]
    NameCollision { name: String },

    /// A new column name fails the identifier rules (non-empty, no spaces/dots,
    /// no leading digit, identifier characters only).
    #[error("invalid column name \"{name}\": {reason}")]
    InvalidName { name: String, reason: String },

    /// Connector connect failure, SQL engine error, or missing table/column/function,
    /// enriched with schema context before being returned to the caller.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Tool-input schema validation failure.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Startup-time failure severe enough to abort (unwritable persistence path,
    /// unable to bind the transport).
    #[error("fatal: {message}")]
    Fatal { message: String },
}

impl DolexError {
    pub fn user_input(message: impl Into<String>) -> Self {
        Self::UserInput {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Render as the `{error: string}` body every tool response uses on failure.
    pub fn to_error_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string(), "isError": true })
    }
}

/// Convert any error into the caller-facing `{error, isError}` shape, collapsing the
/// chain to its top message so internal causes (e.g. a lower-level `std::io::Error`)
/// never leak a path or stack trace beyond what the caller already supplied.
pub fn error_response(err: &anyhow::Error) -> serde_json::Value {
    serde_json::json!({ "error": err.to_string(), "isError": true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_column_renders_suggestion_when_present() {
        let err = DolexError::UnknownColumn {
            column: "revenu".into(),
            suggestion: Some("revenue".into()),
        };
        assert!(err.to_string().contains("did you mean \"revenue\""));
    }

    #[test]
    fn unknown_column_omits_suggestion_when_absent() {
        let err = DolexError::UnknownColumn {
            column: "zzz".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "unknown column \"zzz\"");
    }

    #[test]
    fn circular_dependency_renders_cycle_path() {
        let err = DolexError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "circular dependency: a \u{2192} b \u{2192} a");
    }

    #[test]
    fn to_error_body_has_expected_shape() {
        let err = DolexError::user_input("missing argument: path");
        let body = err.to_error_body();
        assert_eq!(body["isError"], true);
        assert_eq!(body["error"], "missing argument: path");
    }
}
