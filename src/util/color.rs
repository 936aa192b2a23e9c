//! Color-preference application for visualization specs (spec §4.M).
//!
//! Mutates a spec's `color` encoding from caller-supplied `{palette,
//! highlight, colorField}`, auto-inferring a color field when none was given
//! and reporting when a requested highlight value is absent from the data.

use crate::model::DataColumn;
use crate::pattern::{Encoding, VisualizationSpec};
use crate::types::SemanticType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The palette applied when the caller names none.
pub const DEFAULT_PALETTE: &str = "categorical10";

/// Palette names the MCP App's chart renderer understands; Dolex only
/// carries the name through, it never renders pixels itself (spec §9 "chart
/// renderers" is explicitly out of scope for the core).
pub const AVAILABLE_PALETTES: &[&str] = &["categorical10", "sequential_blue", "diverging_redblue", "monochrome"];

/// Caller-supplied color knobs accepted by `visualize`/`refine_visualization`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColorPreferences {
    pub palette: Option<String>,
    pub highlight: Option<Value>,
    #[serde(rename = "colorField")]
    pub color_field: Option<String>,
}

/// Apply `prefs` to `spec`'s encoding and config in place, returning
/// human-readable notes about anything that could not be honored as asked.
pub fn apply_color_preferences(spec: &mut VisualizationSpec, columns: &[DataColumn], prefs: &ColorPreferences) -> Vec<String> {
    let mut notes = Vec::new();

    let field = prefs.color_field.clone().or_else(|| infer_color_field(&spec.encoding, columns));
    if let Some(field) = field {
        if columns.iter().any(|c| c.name == field) {
            spec.encoding.color = Some(field);
        } else {
            notes.push(format!(
                "requested color field \"{field}\" was not found on this data; leaving the color encoding unchanged"
            ));
        }
    }

    if let Some(palette) = &prefs.palette {
        spec.config["palette"] = Value::String(palette.clone());
        if !AVAILABLE_PALETTES.contains(&palette.as_str()) {
            notes.push(format!("palette \"{palette}\" is not a recognized palette name; the renderer may fall back to its default"));
        }
    } else if spec.config.get("palette").is_none() {
        spec.config["palette"] = Value::String(DEFAULT_PALETTE.to_string());
    }

    if let Some(highlight) = &prefs.highlight {
        let color_field = spec.encoding.color.clone();
        let present = color_field
            .as_ref()
            .map(|f| spec.data.iter().any(|row| row.get(f).map(|v| values_match(v, highlight)).unwrap_or(false)))
            .unwrap_or(false);
        if present {
            spec.config["highlight"] = highlight.clone();
        } else {
            notes.push(format!("highlight value {highlight} was not found in the data; no rows will be highlighted"));
        }
    }

    notes
}

fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.eq_ignore_ascii_case(y),
        _ => a == b,
    }
}

/// Prefer a categorical column already used as a nominal axis (`x` or
/// `series`); otherwise fall back to the lowest-cardinality categorical
/// column not already encoded elsewhere (spec §4.M "auto-infer ... from
/// nominal axes or, failing that, from the first suitable low-cardinality
/// categorical column").
fn infer_color_field(encoding: &Encoding, columns: &[DataColumn]) -> Option<String> {
    for candidate in [&encoding.x, &encoding.series] {
        if let Some(name) = candidate {
            if columns.iter().any(|c| c.name == *name && c.semantic_type == SemanticType::Categorical) {
                return Some(name.clone());
            }
        }
    }
    columns
        .iter()
        .filter(|c| c.semantic_type == SemanticType::Categorical && c.unique_count >= 2 && c.unique_count <= 12)
        .filter(|c| Some(&c.name) != encoding.x.as_ref() && Some(&c.name) != encoding.series.as_ref())
        .min_by_key(|c| c.unique_count)
        .map(|c| c.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::Row;
    use serde_json::json;

    fn column(name: &str, semantic_type: SemanticType, unique_count: usize) -> DataColumn {
        DataColumn {
            name: name.to_string(),
            semantic_type,
            samples: vec![],
            unique_count,
            null_count: 0,
            total_count: 0,
            numeric_stats: None,
            top_values: None,
        }
    }

    fn spec_with(encoding: Encoding, rows: Vec<Row>) -> VisualizationSpec {
        VisualizationSpec { pattern_id: "bar".into(), title: "Bar Chart".into(), data: rows, encoding, config: json!({}) }
    }

    #[test]
    fn infers_color_from_low_cardinality_categorical_when_unset() {
        let columns = vec![column("region", SemanticType::Categorical, 4), column("sales", SemanticType::Numeric, 0)];
        let mut spec = spec_with(Encoding { x: Some("sales".into()), ..Default::default() }, vec![]);
        let notes = apply_color_preferences(&mut spec, &columns, &ColorPreferences::default());
        assert_eq!(spec.encoding.color.as_deref(), Some("region"));
        assert!(notes.is_empty());
    }

    #[test]
    fn notes_when_requested_color_field_is_unknown() {
        let columns = vec![column("region", SemanticType::Categorical, 4)];
        let mut spec = spec_with(Encoding::default(), vec![]);
        let prefs = ColorPreferences { color_field: Some("missing".into()), ..Default::default() };
        let notes = apply_color_preferences(&mut spec, &columns, &prefs);
        assert!(spec.encoding.color.is_none());
        assert!(notes[0].contains("missing"));
    }

    #[test]
    fn notes_when_highlight_value_absent_from_data() {
        let columns = vec![column("region", SemanticType::Categorical, 2)];
        let mut row = Row::new();
        row.insert("region".to_string(), json!("north"));
        let mut spec = spec_with(Encoding { color: Some("region".into()), ..Default::default() }, vec![row]);
        let prefs = ColorPreferences { highlight: Some(json!("south")), ..Default::default() };
        let notes = apply_color_preferences(&mut spec, &columns, &prefs);
        assert!(notes.iter().any(|n| n.contains("highlight")));
        assert!(spec.config.get("highlight").is_none());
    }

    #[test]
    fn defaults_palette_when_none_requested() {
        let mut spec = spec_with(Encoding::default(), vec![]);
        apply_color_preferences(&mut spec, &[], &ColorPreferences::default());
        assert_eq!(spec.config["palette"], json!(DEFAULT_PALETTE));
    }
}
