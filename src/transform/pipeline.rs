//! Orchestrates one table's derived columns: validates a new expression,
//! resolves its dependencies, evaluates it, and commits the result through
//! the column manager — keeping the dependency graph, the working/derived
//! layering, and the on-disk manifest in sync with the live rows.

use crate::contracts::Row;
use crate::errors::DolexError;
use crate::expr::{evaluate, parse};
use crate::model::{profile_column, DataColumn};
use crate::transform::column_manager::{apply_batch, drop_column as drop_column_rows, ColumnWrite, WriteMode};
use crate::transform::manifest::{Manifest, ManifestEntry};
use crate::transform::metadata::{DependencyGraph, TransformRecord};
use crate::types::{Layer, ValidatedColumnName};
use crate::util::edit_distance::closest_match;
use indexmap::IndexMap;

/// Result of a `drop_columns` call: the full set of names removed from the
/// live table, and the subset that were shadow (working) columns whose drop
/// restored a derived column of the same name (spec §4.E).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropOutcome {
    pub dropped: Vec<String>,
    pub restored: Vec<String>,
}

/// In-memory transform state for a single table, rebuilt from the manifest on
/// connect and kept current as columns are added, promoted, or dropped.
#[derive(Default)]
pub struct TransformPipeline {
    graph: DependencyGraph,
    order: Vec<String>,
    working: IndexMap<String, TransformRecord>,
    derived: IndexMap<String, TransformRecord>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay a table's manifest entries (always `derived`-layer, per the
    /// persistence format) against already-loaded `rows`/`columns`, tolerating
    /// per-column failures (a column whose expression no longer parses or
    /// whose dependency vanished is skipped, not fatal).
    pub fn replay(entries: &[ManifestEntry], rows: &mut Vec<Row>, columns: &mut Vec<DataColumn>) -> Self {
        let mut pipeline = Self::new();
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|e| e.order);

        for entry in sorted {
            let Ok(expr) = parse(&entry.expr) else {
                tracing::warn!(column = %entry.column, "skipping manifest entry with unparsable expression");
                continue;
            };
            let refs = expr.extract_column_refs();
            if pipeline
                .replay_one(&entry.column, &entry.expr, entry.partition_by.clone(), &refs, rows, columns)
                .is_err()
            {
                tracing::warn!(column = %entry.column, "skipping manifest entry that failed to replay");
            }
        }
        pipeline
    }

    fn replay_one(
        &mut self,
        name: &str,
        expr_text: &str,
        partition_by: Option<String>,
        refs: &[String],
        rows: &mut Vec<Row>,
        columns: &mut Vec<DataColumn>,
    ) -> Result<(), DolexError> {
        let expr = parse(expr_text).map_err(|e| DolexError::ParseError { position: e.position, message: e.message })?;
        let output = evaluate(&expr, rows, partition_by.as_deref(), None)
            .map_err(|e| DolexError::backend(e.to_string()))?;
        let profile = profile_column(name, &output.values, None);
        apply_batch(
            rows,
            columns,
            vec![ColumnWrite { name: name.to_string(), values: output.values, profile, mode: WriteMode::Overwrite }],
        )?;
        self.graph.insert(name, refs);
        if !self.order.contains(&name.to_string()) {
            self.order.push(name.to_string());
        }
        self.derived.insert(
            name.to_string(),
            TransformRecord {
                column: name.to_string(),
                expr: expr_text.to_string(),
                layer: Layer::Derived,
                depends_on: refs.to_vec(),
                partition_by,
            },
        );
        Ok(())
    }

    fn is_tracked(&self, name: &str) -> bool {
        self.working.contains_key(name) || self.derived.contains_key(name)
    }

    /// Validate and add a new derived column as a `working` record (spec
    /// §4.E step 5): a name never seen before becomes a fresh working column;
    /// an existing working record is overwritten; an existing derived record
    /// is shadowed (its values are overwritten but the derived record and its
    /// manifest entry are untouched until a later `promote_columns` or
    /// `drop_columns`). Returns evaluation warnings on success.
    #[allow(clippy::too_many_arguments)]
    pub fn add_column(
        &mut self,
        name: &str,
        expr_text: &str,
        partition_by: Option<String>,
        rows: &mut Vec<Row>,
        columns: &mut Vec<DataColumn>,
    ) -> Result<Vec<String>, DolexError> {
        let validated = ValidatedColumnName::new(name).map_err(|e| DolexError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let name = validated.as_str();

        if columns.iter().any(|c| c.name == name) && !self.is_tracked(name) {
            return Err(DolexError::NameCollision { name: name.to_string() });
        }

        let expr = parse(expr_text).map_err(|e| DolexError::ParseError { position: e.position, message: e.message })?;
        let refs = expr.extract_column_refs();

        let known: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        for r in &refs {
            if !known.contains(r) {
                let suggestion = closest_match(r, &known, 2).map(|s| s.to_string());
                return Err(DolexError::UnknownColumn { column: r.clone(), suggestion });
            }
        }

        if let Some(cycle) = self.graph.would_cycle(name, &refs) {
            return Err(DolexError::CircularDependency { cycle });
        }

        let output = evaluate(&expr, rows, partition_by.as_deref(), None)
            .map_err(|e| DolexError::backend(e.to_string()))?;
        let profile = profile_column(name, &output.values, None);

        let mode = if columns.iter().any(|c| c.name == name) { WriteMode::Overwrite } else { WriteMode::Add };
        apply_batch(
            rows,
            columns,
            vec![ColumnWrite { name: name.to_string(), values: output.values, profile, mode }],
        )?;

        self.graph.insert(name, &refs);
        if !self.order.contains(&name.to_string()) {
            self.order.push(name.to_string());
        }
        self.working.insert(
            name.to_string(),
            TransformRecord {
                column: name.to_string(),
                expr: expr_text.to_string(),
                layer: Layer::Working,
                depends_on: refs,
                partition_by,
            },
        );

        Ok(output.warnings)
    }

    /// Move `names` (or every working column, if `names == ["*"]`) from
    /// `working` to `derived`, overwriting any existing derived record of the
    /// same name and writing the manifest. Returns the promoted names.
    pub fn promote_columns(&mut self, names: &[String], manifest: &mut Manifest, table: &str) -> Result<Vec<String>, DolexError> {
        let targets = self.resolve_targets(names, Layer::Working);
        for name in &targets {
            if !self.working.contains_key(name) {
                return Err(DolexError::user_input(format!("no working column named \"{name}\"")));
            }
        }

        let mut promoted = Vec::new();
        for name in &targets {
            let record = self.working.shift_remove(name).expect("checked above");
            manifest.remove(table, name);
            manifest.push(table, name, &record.expr, Layer::Derived, record.partition_by.clone());
            self.derived.insert(
                name.clone(),
                TransformRecord { layer: Layer::Derived, ..record },
            );
            promoted.push(name.clone());
        }
        Ok(promoted)
    }

    /// Drop columns from one layer (spec §4.E `drop_columns`): dropping a
    /// `derived` column is rejected while transitive dependents remain;
    /// dropping a `working` column that shadows a `derived` record restores
    /// the derived values and removes only the working record (reported in
    /// `restored`); a standalone working column is removed outright along
    /// with its dependents.
    pub fn drop_columns(
        &mut self,
        names: &[String],
        layer: Layer,
        rows: &mut Vec<Row>,
        columns: &mut Vec<DataColumn>,
        manifest: &mut Manifest,
        table: &str,
    ) -> Result<DropOutcome, DolexError> {
        let targets = self.resolve_targets(names, layer);

        for name in &targets {
            match layer {
                Layer::Working => {
                    if !self.working.contains_key(name) {
                        return Err(DolexError::user_input(format!("no working column named \"{name}\"")));
                    }
                }
                Layer::Derived => {
                    if !self.derived.contains_key(name) {
                        return Err(DolexError::user_input(format!("no derived column named \"{name}\"")));
                    }
                    let dependents: Vec<String> =
                        self.graph.find_dependents(name).into_iter().filter(|d| !targets.contains(d)).collect();
                    if !dependents.is_empty() {
                        return Err(DolexError::user_input(format!(
                            "cannot drop \"{name}\": {} depends on it",
                            dependents.join(", ")
                        )));
                    }
                }
            }
        }

        let mut outcome = DropOutcome::default();

        for name in &targets {
            match layer {
                Layer::Working => {
                    self.working.shift_remove(name);
                    if let Some(record) = self.derived.get(name).cloned() {
                        self.restore_derived(&record, rows, columns);
                        outcome.restored.push(name.clone());
                    } else {
                        drop_column_rows(rows, columns, name);
                        self.graph.remove(name);
                        self.order.retain(|c| c != name);
                    }
                    outcome.dropped.push(name.clone());
                }
                Layer::Derived => {
                    self.derived.shift_remove(name);
                    self.working.shift_remove(name);
                    drop_column_rows(rows, columns, name);
                    manifest.remove(table, name);
                    self.graph.remove(name);
                    self.order.retain(|c| c != name);
                    outcome.dropped.push(name.clone());
                }
            }
        }

        Ok(outcome)
    }

    fn restore_derived(&self, record: &TransformRecord, rows: &mut Vec<Row>, columns: &mut Vec<DataColumn>) {
        let Ok(expr) = parse(&record.expr) else { return };
        let Ok(output) = evaluate(&expr, rows, record.partition_by.as_deref(), None) else { return };
        let profile = profile_column(&record.column, &output.values, None);
        let _ = apply_batch(
            rows,
            columns,
            vec![ColumnWrite { name: record.column.clone(), values: output.values, profile, mode: WriteMode::Overwrite }],
        );
    }

    fn resolve_targets(&self, names: &[String], layer: Layer) -> Vec<String> {
        if names.len() == 1 && names[0] == "*" {
            match layer {
                Layer::Working => self.working.keys().cloned().collect(),
                Layer::Derived => self.derived.keys().cloned().collect(),
            }
        } else {
            names.to_vec()
        }
    }

    /// Every transform record in `layer` (or both layers if `None`), in
    /// application order — used by `list_transforms`.
    pub fn list(&self, layer: Option<Layer>) -> Vec<&TransformRecord> {
        self.order
            .iter()
            .filter_map(|name| match layer {
                Some(Layer::Working) => self.working.get(name),
                Some(Layer::Derived) => self.derived.get(name),
                None => self.working.get(name).or_else(|| self.derived.get(name)),
            })
            .collect()
    }

    /// Names of every derived or working column currently tracked, in the
    /// order first applied.
    pub fn derived_columns(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SemanticType;
    use serde_json::json;

    fn sample_column(name: &str, ty: SemanticType) -> DataColumn {
        DataColumn {
            name: name.to_string(),
            semantic_type: ty,
            samples: vec![],
            unique_count: 0,
            null_count: 0,
            total_count: 0,
            numeric_stats: None,
            top_values: None,
        }
    }

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn add_column_rejects_unknown_reference_with_suggestion() {
        let mut pipeline = TransformPipeline::new();
        let mut rows = vec![row(&[("revenue", json!(10))])];
        let mut columns = vec![sample_column("revenue", SemanticType::Numeric)];

        let err = pipeline.add_column("doubled", "revenu * 2", None, &mut rows, &mut columns).unwrap_err();
        match err {
            DolexError::UnknownColumn { suggestion, .. } => assert_eq!(suggestion.as_deref(), Some("revenue")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn add_column_succeeds_as_working_without_touching_manifest() {
        let mut pipeline = TransformPipeline::new();
        let mut rows = vec![row(&[("revenue", json!(10))]), row(&[("revenue", json!(20))])];
        let mut columns = vec![sample_column("revenue", SemanticType::Numeric)];

        pipeline.add_column("doubled", "revenue * 2", None, &mut rows, &mut columns).unwrap();

        assert_eq!(rows[0].get("doubled"), Some(&json!(20.0)));
        assert_eq!(pipeline.derived_columns(), &["doubled".to_string()]);
        assert_eq!(pipeline.list(Some(Layer::Working)).len(), 1);
        assert!(pipeline.list(Some(Layer::Derived)).is_empty());
    }

    #[test]
    fn add_column_detects_cycle_through_dependent_derived_column() {
        let mut pipeline = TransformPipeline::new();
        let mut rows = vec![row(&[("revenue", json!(10))])];
        let mut columns = vec![sample_column("revenue", SemanticType::Numeric)];

        pipeline.add_column("doubled", "revenue * 2", None, &mut rows, &mut columns).unwrap();

        let err = pipeline.add_column("revenue", "doubled + 1", None, &mut rows, &mut columns);
        assert!(err.is_err());
    }

    #[test]
    fn shadow_promote_and_restore_round_trip() {
        let mut pipeline = TransformPipeline::new();
        let mut rows = vec![row(&[("score", json!(1))]), row(&[("score", json!(2))])];
        let mut columns = vec![sample_column("score", SemanticType::Numeric)];
        let mut manifest = Manifest::new();

        pipeline.add_column("extra", "score + 1", None, &mut rows, &mut columns).unwrap();
        pipeline.promote_columns(&["extra".to_string()], &mut manifest, "orders").unwrap();
        assert_eq!(manifest.entries_for("orders")[0].expr, "score + 1");
        assert_eq!(rows[0].get("extra"), Some(&json!(2.0)));

        pipeline.add_column("extra", "score + 100", None, &mut rows, &mut columns).unwrap();
        assert_eq!(rows[0].get("extra"), Some(&json!(101.0)));
        assert_eq!(manifest.entries_for("orders")[0].expr, "score + 1");

        let outcome = pipeline
            .drop_columns(&["extra".to_string()], Layer::Working, &mut rows, &mut columns, &mut manifest, "orders")
            .unwrap();
        assert_eq!(outcome.dropped, vec!["extra".to_string()]);
        assert_eq!(outcome.restored, vec!["extra".to_string()]);
        assert_eq!(rows[0].get("extra"), Some(&json!(2.0)));
        assert_eq!(manifest.entries_for("orders")[0].expr, "score + 1");
    }

    #[test]
    fn drop_column_cascades_to_dependents() {
        let mut pipeline = TransformPipeline::new();
        let mut rows = vec![row(&[("revenue", json!(10))])];
        let mut columns = vec![sample_column("revenue", SemanticType::Numeric)];
        let mut manifest = Manifest::new();

        pipeline.add_column("doubled", "revenue * 2", None, &mut rows, &mut columns).unwrap();
        pipeline.promote_columns(&["doubled".to_string()], &mut manifest, "orders").unwrap();
        pipeline.add_column("quadrupled", "doubled * 2", None, &mut rows, &mut columns).unwrap();
        pipeline.promote_columns(&["quadrupled".to_string()], &mut manifest, "orders").unwrap();

        let err = pipeline
            .drop_columns(&["doubled".to_string()], Layer::Derived, &mut rows, &mut columns, &mut manifest, "orders")
            .unwrap_err();
        assert!(matches!(err, DolexError::UserInput { .. }));

        let outcome = pipeline
            .drop_columns(
                &["doubled".to_string(), "quadrupled".to_string()],
                Layer::Derived,
                &mut rows,
                &mut columns,
                &mut manifest,
                "orders",
            )
            .unwrap();
        assert!(outcome.dropped.contains(&"doubled".to_string()));
        assert!(outcome.dropped.contains(&"quadrupled".to_string()));
        assert!(!rows[0].contains_key("doubled"));
        assert!(!rows[0].contains_key("quadrupled"));
        assert!(manifest.entries_for("orders").is_empty());
    }
}
