//! Build a `DataColumn` profile from a column's raw values — the computation
//! shared by the CSV connector (profiling at connect time) and the inline-data
//! path (profiling rows that never went through a connector).

use crate::contracts::Row;
use crate::model::inference::{infer_semantic_type, ColumnShape};
use crate::model::schema::{DataColumn, NumericStats};
use crate::types::SemanticType;
use crate::util::stats;
use indexmap::IndexMap;
use serde_json::Value;

const MAX_SAMPLES: usize = 20;
const MAX_CSV_SAMPLES: usize = 30;
const TOP_VALUES: usize = 10;

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Profile one column's values into a `DataColumn`. `sample_cap` lets the CSV
/// connector take up to 30 distinct samples (§4.F) while other callers use
/// the general 20-sample cap (§3 `DataColumn`).
pub fn profile_column(name: &str, values: &[Value], sample_cap: Option<usize>) -> DataColumn {
    let total_count = values.len();
    let null_count = values.iter().filter(|v| v.is_null()).count();

    let mut seen = IndexMap::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        *seen.entry(v.to_string()).or_insert(0usize) += 1;
    }
    let unique_count = seen.len();

    let cap = sample_cap.unwrap_or(MAX_SAMPLES).min(MAX_CSV_SAMPLES);
    let mut samples = Vec::new();
    let mut sample_seen = std::collections::HashSet::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        let key = v.to_string();
        if sample_seen.insert(key) {
            samples.push(v.clone());
            if samples.len() >= cap {
                break;
            }
        }
    }

    let shape = ColumnShape { name, samples: &samples, unique_count, row_count: total_count };
    let semantic_type = infer_semantic_type(&shape);

    let numeric_stats = if semantic_type == SemanticType::Numeric {
        let mut nums: Vec<f64> = values.iter().filter_map(as_f64).collect();
        nums.sort_by(|a, b| a.partial_cmp(b).unwrap());
        if nums.is_empty() {
            None
        } else {
            let mean = stats::mean(&nums);
            Some(NumericStats {
                min: nums[0],
                max: nums[nums.len() - 1],
                mean: mean.unwrap_or(0.0),
                median: stats::median(&nums).unwrap_or(0.0),
                stddev: stats::stddev_population(&nums, mean),
                p25: stats::percentile(&nums, 25.0).unwrap_or(0.0),
                p75: stats::percentile(&nums, 75.0).unwrap_or(0.0),
            })
        }
    } else {
        None
    };

    let top_values = if semantic_type == SemanticType::Categorical {
        let mut pairs: Vec<(String, usize)> = seen.into_iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs.truncate(TOP_VALUES);
        Some(
            pairs
                .into_iter()
                .map(|(k, count)| (serde_json::from_str(&k).unwrap_or(Value::String(k)), count))
                .collect(),
        )
    } else {
        None
    };

    DataColumn {
        name: name.to_string(),
        semantic_type,
        samples,
        unique_count,
        null_count,
        total_count,
        numeric_stats,
        top_values,
    }
}

/// Profile every column appearing on any of `rows` (spec §4.M "column
/// inference from raw rows"), for data that arrived inline rather than
/// through a connector. Column order follows first appearance.
pub fn profile_rows(rows: &[Row]) -> Vec<DataColumn> {
    let mut order: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for row in rows {
        for key in row.keys() {
            if seen.insert(key.clone()) {
                order.push(key.clone());
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let values: Vec<Value> = rows.iter().map(|r| r.get(&name).cloned().unwrap_or(Value::Null)).collect();
            profile_column(&name, &values, None)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profiles_numeric_column_with_stats() {
        let values = vec![json!(1), json!(2), json!(3), json!(4), Value::Null];
        let column = profile_column("amount", &values, None);
        assert_eq!(column.semantic_type, SemanticType::Numeric);
        assert_eq!(column.null_count, 1);
        assert_eq!(column.total_count, 5);
        let stats = column.numeric_stats.unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
    }

    #[test]
    fn profiles_categorical_column_with_top_values() {
        let values = vec![json!("a"), json!("b"), json!("a"), json!("a")];
        let column = profile_column("category", &values, None);
        assert_eq!(column.semantic_type, SemanticType::Categorical);
        let top = column.top_values.unwrap();
        assert_eq!(top[0], (json!("a"), 3));
    }

    #[test]
    fn profile_rows_unions_keys_across_sparse_rows() {
        let mut row_a = Row::new();
        row_a.insert("name".to_string(), json!("alice"));
        row_a.insert("age".to_string(), json!(30));
        let mut row_b = Row::new();
        row_b.insert("name".to_string(), json!("bob"));

        let columns = profile_rows(&[row_a, row_b]);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age"]);
        let age = columns.iter().find(|c| c.name == "age").unwrap();
        assert_eq!(age.null_count, 1);
    }
}
