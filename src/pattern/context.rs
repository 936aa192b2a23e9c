//! Derives a `PatternMatchContext` — the shape summary rule predicates score
//! against — from a data set's rows and inferred columns (spec §3, §4.K).

use crate::contracts::Row;
use crate::model::DataColumn;
use crate::types::SemanticType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatchContext {
    pub row_count: usize,
    pub numeric_count: usize,
    pub categorical_count: usize,
    pub date_count: usize,
    pub has_time_series: bool,
    pub category_count: usize,
    pub series_count: usize,
    pub value_min: f64,
    pub value_max: f64,
    pub has_negative: bool,
    pub intent: String,
}

fn time_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)date|time|year|month|day|created_at|timestamp").unwrap())
}

/// Whether a column's name alone suggests a time axis, independent of its
/// inferred semantic type — used by time-family generators to pick an axis
/// among categorical-but-time-named columns (e.g. a `month` label column).
pub fn looks_time_like(name: &str) -> bool {
    time_name_pattern().is_match(name)
}

/// Build the match context for one data set and a natural-language intent.
pub fn build_context(rows: &[Row], columns: &[DataColumn], intent: &str) -> PatternMatchContext {
    let numeric_count = columns.iter().filter(|c| c.semantic_type == SemanticType::Numeric).count();
    let categorical_count = columns.iter().filter(|c| c.semantic_type == SemanticType::Categorical).count();
    let date_count = columns.iter().filter(|c| c.semantic_type == SemanticType::Date).count();

    let has_time_series = date_count > 0 || columns.iter().any(|c| time_name_pattern().is_match(&c.name));

    let category_count = columns
        .iter()
        .find(|c| c.semantic_type == SemanticType::Categorical)
        .map(|c| c.unique_count)
        .unwrap_or(0);

    let series_count = columns
        .iter()
        .filter(|c| c.semantic_type == SemanticType::Categorical && c.unique_count >= 2)
        .map(|c| c.unique_count)
        .min()
        .unwrap_or(0);

    let mut value_min = f64::INFINITY;
    let mut value_max = f64::NEG_INFINITY;
    let mut has_negative = false;
    for column in columns.iter().filter(|c| c.semantic_type == SemanticType::Numeric) {
        if let Some(stats) = &column.numeric_stats {
            value_min = value_min.min(stats.min);
            value_max = value_max.max(stats.max);
            has_negative |= stats.min < 0.0;
        }
    }
    if !value_min.is_finite() {
        value_min = 0.0;
    }
    if !value_max.is_finite() {
        value_max = 0.0;
    }

    PatternMatchContext {
        row_count: rows.len(),
        numeric_count,
        categorical_count,
        date_count,
        has_time_series,
        category_count,
        series_count,
        value_min,
        value_max,
        has_negative,
        intent: intent.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NumericStats;

    fn numeric(name: &str, min: f64, max: f64) -> DataColumn {
        DataColumn {
            name: name.to_string(),
            semantic_type: SemanticType::Numeric,
            samples: vec![],
            unique_count: 0,
            null_count: 0,
            total_count: 0,
            numeric_stats: Some(NumericStats { min, max, mean: 0.0, median: 0.0, stddev: 0.0, p25: 0.0, p75: 0.0 }),
            top_values: None,
        }
    }

    fn categorical(name: &str, unique_count: usize) -> DataColumn {
        DataColumn {
            name: name.to_string(),
            semantic_type: SemanticType::Categorical,
            samples: vec![],
            unique_count,
            null_count: 0,
            total_count: 0,
            numeric_stats: None,
            top_values: None,
        }
    }

    #[test]
    fn detects_time_series_from_column_name_without_date_type() {
        let columns = vec![categorical("created_at", 5), numeric("sales", 1.0, 10.0)];
        let ctx = build_context(&[], &columns, "trend over time");
        assert!(ctx.has_time_series);
    }

    #[test]
    fn computes_value_range_and_negative_flag_across_numeric_columns() {
        let columns = vec![numeric("profit", -50.0, 100.0), numeric("cost", 0.0, 20.0)];
        let ctx = build_context(&[], &columns, "");
        assert_eq!(ctx.value_min, -50.0);
        assert_eq!(ctx.value_max, 100.0);
        assert!(ctx.has_negative);
    }

    #[test]
    fn series_count_ignores_single_valued_categoricals() {
        let columns = vec![categorical("flag", 1), categorical("region", 4)];
        let ctx = build_context(&[], &columns, "");
        assert_eq!(ctx.series_count, 4);
    }
}
