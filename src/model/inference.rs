//! Column semantic-type inference, shared by the CSV connector (profiling a
//! table at connect time) and the visualization path (profiling inline rows
//! that never went through a connector). One set of rules backs both so a
//! column gets the same type whether it arrived from a file or from the
//! caller's `data` argument.

use crate::types::SemanticType;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn date_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)date|time|year|timestamp").unwrap())
}

fn year_family_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)year|cohort|fiscal").unwrap())
}

fn quarter_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-Q[1-4]$").unwrap())
}

fn week_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-W\d{2}$").unwrap())
}

fn looks_like_date(sample: &str) -> bool {
    if quarter_form_re().is_match(sample) || week_form_re().is_match(sample) {
        return true;
    }
    if !sample.starts_with(|c: char| c.is_ascii_digit()) || sample.len() < 4 {
        return false;
    }
    NaiveDate::parse_from_str(sample, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(sample, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::NaiveDateTime::parse_from_str(sample, "%Y-%m-%dT%H:%M:%S").is_ok()
        || sample.starts_with(|c: char| c.is_ascii_digit()) && sample.len() == 4 && sample.parse::<i32>().is_ok()
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Inputs needed to classify one column (§4.F type inference plus the
/// "year-like" addendum from the shared-utilities section).
pub struct ColumnShape<'a> {
    pub name: &'a str,
    pub samples: &'a [Value],
    pub unique_count: usize,
    pub row_count: usize,
}

/// Classify a column's semantic type. Mirrors §4.F's rules for CSV profiling
/// and is reused verbatim for inline-data inference.
pub fn infer_semantic_type(shape: &ColumnShape) -> SemanticType {
    let lower_name = shape.name.to_lowercase();
    let non_null: Vec<&Value> = shape.samples.iter().filter(|v| !v.is_null()).collect();
    let n = non_null.len().max(1);

    let uniqueness = shape.unique_count as f64 / shape.row_count.max(1) as f64;

    if lower_name == "id" && uniqueness > 0.9 {
        return SemanticType::Id;
    }
    if lower_name.ends_with("_id") {
        return SemanticType::Id;
    }
    if lower_name.ends_with("id") && lower_name != "id" && uniqueness > 0.5 {
        return SemanticType::Id;
    }

    if date_name_re().is_match(&lower_name) {
        return SemanticType::Date;
    }
    let date_like = non_null
        .iter()
        .filter_map(|v| as_string(v))
        .filter(|s| looks_like_date(s))
        .count();
    if !non_null.is_empty() && date_like == non_null.len() {
        return SemanticType::Date;
    }

    if let Some(year_like) = infer_year_like(&lower_name, shape) {
        if year_like {
            return SemanticType::Date;
        }
    }

    let numeric_like = non_null
        .iter()
        .filter(|v| matches!(v, Value::Number(_)) || as_string(v).and_then(|s| s.trim().parse::<f64>().ok()).is_some())
        .count();
    if numeric_like as f64 / n as f64 > 0.7 {
        return SemanticType::Numeric;
    }

    let avg_len: f64 = {
        let total: usize = non_null.iter().filter_map(|v| as_string(v)).map(|s| s.chars().count()).sum();
        total as f64 / n as f64
    };
    let high_cardinality = uniqueness > 0.9 && shape.row_count > 20;
    if avg_len > 100.0 || (high_cardinality && avg_len > 30.0) {
        return SemanticType::Text;
    }

    SemanticType::Categorical
}

/// The "year-like" heuristic: numeric, integral, in `[1900, 2100]`, and the
/// column name matches a year/cohort/fiscal family. Returns `None` when the
/// name doesn't even suggest a year (caller should fall through to other
/// rules); `Some(true)` when the heuristic fires.
fn infer_year_like(lower_name: &str, shape: &ColumnShape) -> Option<bool> {
    if !year_family_name_re().is_match(lower_name) {
        return None;
    }
    let non_null: Vec<&Value> = shape.samples.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return Some(false);
    }
    let all_year_ints = non_null.iter().all(|v| {
        let Some(s) = as_string(v) else { return false };
        match s.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 => (1900.0..=2100.0).contains(&f),
            _ => false,
        }
    });
    Some(all_year_ints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape<'a>(name: &'a str, samples: &'a [Value]) -> ColumnShape<'a> {
        let unique = {
            let mut v: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
            v.sort();
            v.dedup();
            v.len()
        };
        ColumnShape { name, samples, unique_count: unique, row_count: samples.len() }
    }

    #[test]
    fn infers_id_from_suffix() {
        let samples = vec![json!(1), json!(2), json!(3)];
        let shape = shape("customer_id", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Id);
    }

    #[test]
    fn infers_numeric_when_mostly_parseable() {
        let samples = vec![json!(1.5), json!(2.5), json!(3.5)];
        let shape = shape("amount", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Numeric);
    }

    #[test]
    fn infers_date_from_column_name() {
        let samples = vec![json!("2024-01-01"), json!("2024-02-01")];
        let shape = shape("order_date", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Date);
    }

    #[test]
    fn infers_date_from_sample_shape_without_name_hint() {
        let samples = vec![json!("2024-01-01"), json!("2024-02-15")];
        let shape = shape("d", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Date);
    }

    #[test]
    fn year_like_numeric_column_infers_as_date() {
        let samples = vec![json!(2021), json!(2022), json!(2023)];
        let shape = shape("fiscal_year", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Date);
    }

    #[test]
    fn falls_back_to_categorical() {
        let samples = vec![json!("red"), json!("blue"), json!("red")];
        let shape = shape("color", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Categorical);
    }

    #[test]
    fn long_text_infers_as_text() {
        let long = "x".repeat(150);
        let samples = vec![json!(long.clone()), json!(long)];
        let shape = shape("description", &samples);
        assert_eq!(infer_semantic_type(&shape), SemanticType::Text);
    }
}
