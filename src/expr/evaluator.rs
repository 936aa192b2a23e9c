//! Two-phase expression evaluator (spec §4.B).
//!
//! Phase 1 precomputes every column-wise function call in the expression
//! (`col_mean`, `zscore`, `rank`, ...) into a scalar or a per-row map, optionally
//! partitioned. Phase 2 walks the AST once per row, reading precomputed values
//! where needed and evaluating everything else directly.

use super::ast::{BinaryOp, Expr, UnaryOp, COLUMN_WISE_FUNCTIONS};
use super::functions as f;
use crate::contracts::Row;
use crate::types::SemanticType;
use crate::util::stats;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use serde_json::Value;

/// Comparison operators accepted by row filters (shared with DSL `having`,
/// spec §4.B "optional row filter").
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone)]
pub struct RowFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Option<Value>,
}

pub fn filter_matches(filter: &RowFilter, row: &Row) -> bool {
    let cell = row.get(&filter.field).cloned().unwrap_or(Value::Null);
    match filter.op {
        FilterOp::IsNull => cell.is_null(),
        FilterOp::IsNotNull => !cell.is_null(),
        FilterOp::Eq => filter.value.as_ref().map(|v| values_equal(&cell, v)).unwrap_or(false),
        FilterOp::Ne => !filter.value.as_ref().map(|v| values_equal(&cell, v)).unwrap_or(false),
        FilterOp::Gt => compare_numeric_or_string(&cell, filter.value.as_ref()).map(|o| o.is_gt()).unwrap_or(false),
        FilterOp::Ge => compare_numeric_or_string(&cell, filter.value.as_ref()).map(|o| !o.is_lt()).unwrap_or(false),
        FilterOp::Lt => compare_numeric_or_string(&cell, filter.value.as_ref()).map(|o| o.is_lt()).unwrap_or(false),
        FilterOp::Le => compare_numeric_or_string(&cell, filter.value.as_ref()).map(|o| !o.is_gt()).unwrap_or(false),
        FilterOp::In => filter
            .value
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().any(|v| values_equal(&cell, v)))
            .unwrap_or(false),
        FilterOp::NotIn => !filter
            .value
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().any(|v| values_equal(&cell, v)))
            .unwrap_or(false),
        FilterOp::Between => filter
            .value
            .as_ref()
            .and_then(|v| v.as_array())
            .filter(|arr| arr.len() == 2)
            .and_then(|arr| Some((f::as_f64(&arr[0])?, f::as_f64(&arr[1])?)))
            .and_then(|(lo, hi)| f::as_f64(&cell).map(|v| v >= lo && v <= hi))
            .unwrap_or(false),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (f::as_f64(a), f::as_f64(b)) {
        return (x - y).abs() < f64::EPSILON;
    }
    a == b
}

fn compare_numeric_or_string(a: &Value, b: Option<&Value>) -> Option<std::cmp::Ordering> {
    let b = b?;
    if let (Some(x), Some(y)) = (f::as_f64(a), f::as_f64(b)) {
        return x.partial_cmp(&y);
    }
    f::as_str(a).and_then(|x| f::as_str(b).map(|y| x.cmp(&y)))
}

#[derive(Debug, Clone, Default)]
pub struct EvalStats {
    pub count: usize,
    pub nulls: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EvalOutput {
    pub values: Vec<Value>,
    pub result_type: SemanticType,
    pub stats: EvalStats,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PrecomputeKey {
    name: String,
    column: String,
    extra: Option<String>,
}

#[derive(Debug, Clone)]
enum Precomputed {
    Scalar(Option<f64>),
    PerRow(Vec<Option<f64>>),
}

fn group_indices(rows: &[Row], partition_by: Option<&str>) -> Vec<Vec<usize>> {
    let Some(partition_col) = partition_by else {
        return vec![(0..rows.len()).collect()];
    };
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let key = row
            .get(partition_col)
            .map(|v| v.to_string())
            .unwrap_or_default();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(i);
    }
    order.into_iter().map(|k| groups.remove(&k).unwrap()).collect()
}

fn numeric_column(rows: &[Row], column: &str) -> Vec<Option<f64>> {
    rows.iter().map(|r| r.get(column).and_then(f::as_f64)).collect()
}

fn collect_column_wise_calls(expr: &Expr, out: &mut Vec<(String, String, Option<String>)>) {
    match expr {
        Expr::Call { name, args } if COLUMN_WISE_FUNCTIONS.contains(&name.as_str()) => {
            if let Some(Expr::Column(column)) = args.first() {
                let extra = args.get(1).and_then(|a| match a {
                    Expr::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                out.push((name.clone(), column.clone(), extra));
            }
            for arg in args {
                collect_column_wise_calls(arg, out);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_column_wise_calls(arg, out);
            }
        }
        Expr::Array(items) => {
            for item in items {
                collect_column_wise_calls(item, out);
            }
        }
        Expr::Unary { operand, .. } => collect_column_wise_calls(operand, out),
        Expr::Binary { left, right, .. } => {
            collect_column_wise_calls(left, out);
            collect_column_wise_calls(right, out);
        }
        _ => {}
    }
}

fn dense_rank(group_values: &[(usize, f64)]) -> HashMap<usize, f64> {
    let mut sorted = group_values.to_vec();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    let mut out = HashMap::new();
    let mut rank = 0usize;
    let mut last: Option<f64> = None;
    for (idx, value) in sorted {
        if last.map(|l| (l - value).abs() > f64::EPSILON).unwrap_or(true) {
            rank += 1;
            last = Some(value);
        }
        out.insert(idx, rank as f64);
    }
    out
}

fn percentile_rank_map(group_values: &[(usize, f64)]) -> HashMap<usize, f64> {
    let n = group_values.len();
    let mut out = HashMap::new();
    if n <= 1 {
        for (idx, _) in group_values {
            out.insert(*idx, 0.0);
        }
        return out;
    }
    for (idx, value) in group_values {
        let below = group_values.iter().filter(|(_, v)| v < value).count();
        out.insert(*idx, below as f64 / (n - 1) as f64);
    }
    out
}

fn ntile_map(group_values: &[(usize, f64)], n_buckets: usize) -> HashMap<usize, f64> {
    let mut sorted = group_values.to_vec();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    let len = sorted.len();
    let mut out = HashMap::new();
    for (position, (idx, _)) in sorted.into_iter().enumerate() {
        let bucket = if n_buckets == 0 {
            1
        } else {
            ((position * n_buckets) / len.max(1)) + 1
        };
        out.insert(idx, bucket as f64);
    }
    out
}

fn compute_precomputed(
    name: &str,
    column: &str,
    extra: &Option<String>,
    rows: &[Row],
    partition_by: Option<&str>,
) -> Precomputed {
    let values = numeric_column(rows, column);
    let groups = group_indices(rows, partition_by);
    let mut per_row: Vec<Option<f64>> = vec![None; rows.len()];
    let mut scalar_value: Option<f64> = None;

    for group in &groups {
        let group_values: Vec<f64> = group.iter().filter_map(|&i| values[i]).collect();
        match name {
            "col_mean" => {
                let m = stats::mean(&group_values);
                for &i in group {
                    per_row[i] = m;
                }
                scalar_value = m;
            }
            "col_sd" => {
                let m = stats::mean(&group_values);
                let sd = stats::stddev_population(&group_values, m);
                for &i in group {
                    per_row[i] = Some(sd);
                }
                scalar_value = Some(sd);
            }
            "col_min" => {
                let v = stats::min_max(&group_values).map(|(lo, _)| lo);
                for &i in group {
                    per_row[i] = v;
                }
                scalar_value = v;
            }
            "col_max" => {
                let v = stats::min_max(&group_values).map(|(_, hi)| hi);
                for &i in group {
                    per_row[i] = v;
                }
                scalar_value = v;
            }
            "col_median" => {
                let mut sorted = group_values.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let v = stats::median(&sorted);
                for &i in group {
                    per_row[i] = v;
                }
                scalar_value = v;
            }
            "zscore" => {
                let m = stats::mean(&group_values).unwrap_or(0.0);
                let sd = stats::stddev_population(&group_values, Some(m));
                for &i in group {
                    per_row[i] = values[i].and_then(|v| if sd > 0.0 { Some((v - m) / sd) } else { None });
                }
            }
            "center" => {
                let m = stats::mean(&group_values);
                for &i in group {
                    per_row[i] = values[i].and_then(|v| m.map(|mm| v - mm));
                }
            }
            "rank" => {
                let pairs: Vec<(usize, f64)> = group.iter().filter_map(|&i| values[i].map(|v| (i, v))).collect();
                let ranks = dense_rank(&pairs);
                for &i in group {
                    per_row[i] = ranks.get(&i).copied();
                }
            }
            "percentile_rank" => {
                let pairs: Vec<(usize, f64)> = group.iter().filter_map(|&i| values[i].map(|v| (i, v))).collect();
                let ranks = percentile_rank_map(&pairs);
                for &i in group {
                    per_row[i] = ranks.get(&i).copied();
                }
            }
            "ntile" => {
                let n_buckets = extra.as_ref().and_then(|s| s.parse::<f64>().ok()).unwrap_or(4.0) as usize;
                let pairs: Vec<(usize, f64)> = group.iter().filter_map(|&i| values[i].map(|v| (i, v))).collect();
                let buckets = ntile_map(&pairs, n_buckets);
                for &i in group {
                    per_row[i] = buckets.get(&i).copied();
                }
            }
            _ => {}
        }
    }

    let is_scalar_family = matches!(name, "col_mean" | "col_sd" | "col_min" | "col_max" | "col_median");
    if is_scalar_family && partition_by.is_none() {
        Precomputed::Scalar(scalar_value)
    } else {
        Precomputed::PerRow(per_row)
    }
}

struct EvalCtx<'a> {
    precomputed: HashMap<PrecomputeKey, Precomputed>,
    row: &'a Row,
    row_index: usize,
}

impl<'a> EvalCtx<'a> {
    fn lookup(&self, name: &str, column: &str, extra: &Option<String>) -> Option<f64> {
        let key = PrecomputeKey { name: name.to_string(), column: column.to_string(), extra: extra.clone() };
        match self.precomputed.get(&key)? {
            Precomputed::Scalar(v) => *v,
            Precomputed::PerRow(v) => v.get(self.row_index).copied().flatten(),
        }
    }
}

fn eval_node(expr: &Expr, ctx: &EvalCtx) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::from(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Boolean(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Column(name) => Ok(ctx.row.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Array(items) => {
            let values = items.iter().map(|i| eval_node(i, ctx)).collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(values))
        }
        Expr::Unary { op, operand } => {
            let v = eval_node(operand, ctx)?;
            Ok(match op {
                UnaryOp::Neg => f::as_f64(&v).map(|n| Value::from(-n)).unwrap_or(Value::Null),
                UnaryOp::Not => Value::Bool(!f::is_truthy(&v)),
            })
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
        Expr::Call { name, args } => eval_call(name, args, ctx),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &EvalCtx) -> Result<Value> {
    match op {
        BinaryOp::Or => {
            let l = eval_node(left, ctx)?;
            if f::is_truthy(&l) {
                return Ok(Value::Bool(true));
            }
            let r = eval_node(right, ctx)?;
            Ok(Value::Bool(f::is_truthy(&r)))
        }
        BinaryOp::And => {
            let l = eval_node(left, ctx)?;
            if !f::is_truthy(&l) {
                return Ok(Value::Bool(false));
            }
            let r = eval_node(right, ctx)?;
            Ok(Value::Bool(f::is_truthy(&r)))
        }
        _ => {
            let l = eval_node(left, ctx)?;
            let r = eval_node(right, ctx)?;
            Ok(match op {
                BinaryOp::Eq => Value::Bool(values_equal(&l, &r)),
                BinaryOp::Ne => Value::Bool(!values_equal(&l, &r)),
                BinaryOp::Lt => bool_or_null(compare_numeric_or_string(&l, Some(&r)).map(|o| o.is_lt())),
                BinaryOp::Le => bool_or_null(compare_numeric_or_string(&l, Some(&r)).map(|o| !o.is_gt())),
                BinaryOp::Gt => bool_or_null(compare_numeric_or_string(&l, Some(&r)).map(|o| o.is_gt())),
                BinaryOp::Ge => bool_or_null(compare_numeric_or_string(&l, Some(&r)).map(|o| !o.is_lt())),
                BinaryOp::Add => numeric_binop(&l, &r, |a, b| a + b),
                BinaryOp::Sub => numeric_binop(&l, &r, |a, b| a - b),
                BinaryOp::Mul => numeric_binop(&l, &r, |a, b| a * b),
                BinaryOp::Div => match (f::as_f64(&l), f::as_f64(&r)) {
                    (Some(a), Some(b)) if b != 0.0 => Value::from(a / b),
                    _ => Value::Null,
                },
                BinaryOp::Mod => match (f::as_f64(&l), f::as_f64(&r)) {
                    (Some(a), Some(b)) if b != 0.0 => Value::from(a % b),
                    _ => Value::Null,
                },
                BinaryOp::Pow => numeric_binop(&l, &r, |a, b| a.powf(b)),
                BinaryOp::Or | BinaryOp::And => unreachable!(),
            })
        }
    }
}

fn bool_or_null(v: Option<bool>) -> Value {
    v.map(Value::Bool).unwrap_or(Value::Null)
}

fn numeric_binop(l: &Value, r: &Value, f_op: impl Fn(f64, f64) -> f64) -> Value {
    match (f::as_f64(l), f::as_f64(r)) {
        (Some(a), Some(b)) => Value::from(f_op(a, b)),
        _ => Value::Null,
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &EvalCtx) -> Result<Value> {
    if COLUMN_WISE_FUNCTIONS.contains(&name) {
        if let Some(Expr::Column(column)) = args.first() {
            let extra = args.get(1).and_then(|a| match a {
                Expr::Number(n) => Some(n.to_string()),
                _ => None,
            });
            return Ok(ctx
                .lookup(name, column, &extra)
                .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                .unwrap_or(Value::Null));
        }
        return Ok(Value::Null);
    }

    let values = args.iter().map(|a| eval_node(a, ctx)).collect::<Result<Vec<_>>>()?;
    Ok(match name {
        "log" => f::log(&values[0]),
        "log10" => f::log10(&values[0]),
        "log2" => f::log2(&values[0]),
        "sqrt" => f::sqrt(&values[0]),
        "abs" => f::abs(&values[0]),
        "exp" => f::exp(&values[0]),
        "round" => f::round(&values[0], values.get(1)),
        "ceil" => f::ceil(&values[0]),
        "floor" => f::floor(&values[0]),
        "upper" => f::upper(&values[0]),
        "lower" => f::lower(&values[0]),
        "trim" => f::trim(&values[0]),
        "concat" => f::concat(&values),
        "substr" => f::substr(&values[0], &values[1], values.get(2)),
        "len" => f::str_len(&values[0]),
        "date_part" => f::date_part(&values[0], &values[1]),
        "row_mean" => f::row_mean(&values),
        "row_sum" => f::row_sum(&values),
        "row_min" => f::row_min(&values),
        "row_max" => f::row_max(&values),
        "if_else" => f::if_else(&values[0], values[1].clone(), values[2].clone()),
        "recode" => f::recode(&values[0], &values[1..]),
        "cut" => {
            let mid = 1 + (values.len() - 1) / 2;
            let breaks = values[1].as_array().cloned().unwrap_or_else(|| values[1..mid].to_vec());
            let labels = values[2].as_array().cloned().unwrap_or_else(|| values[mid..].to_vec());
            f::cut(&values[0], &breaks, &labels)
        }
        other => return Err(anyhow!("unknown function: {other}")),
    })
}

/// Determine the output semantic type from the top-level expression shape
/// (spec §4.B: arithmetic -> numeric; comparison/logical -> boolean; string
/// functions, `cut`, string branches of `if_else`/`recode` -> categorical;
/// otherwise preserve input type).
fn infer_result_type(expr: &Expr, values: &[Value]) -> SemanticType {
    match expr {
        Expr::Binary { op, .. } => match op {
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
            | BinaryOp::Or | BinaryOp::And => SemanticType::Categorical,
            _ => SemanticType::Numeric,
        },
        Expr::Unary { op: UnaryOp::Not, .. } => SemanticType::Categorical,
        Expr::Unary { op: UnaryOp::Neg, .. } => SemanticType::Numeric,
        Expr::Call { name, .. } => match name.as_str() {
            "upper" | "lower" | "trim" | "concat" | "substr" | "cut" | "recode" | "if_else" => {
                if values.iter().all(|v| v.is_number() || v.is_null()) && values.iter().any(|v| v.is_number()) {
                    SemanticType::Numeric
                } else {
                    SemanticType::Categorical
                }
            }
            "len" | "date_part" | "round" | "ceil" | "floor" | "abs" | "exp" | "log" | "log10" | "log2"
            | "sqrt" | "row_mean" | "row_sum" | "row_min" | "row_max" => SemanticType::Numeric,
            _ => SemanticType::Numeric,
        },
        Expr::Column(_) | Expr::Number(_) | Expr::String(_) | Expr::Boolean(_) | Expr::Null | Expr::Array(_) => {
            SemanticType::Numeric
        }
    }
}

/// Evaluate `expr` over every row, applying an optional row filter and an
/// optional partition column for column-wise functions.
pub fn evaluate(expr: &Expr, rows: &[Row], partition_by: Option<&str>, filter: Option<&RowFilter>) -> Result<EvalOutput> {
    let mut calls = Vec::new();
    collect_column_wise_calls(expr, &mut calls);
    calls.sort();
    calls.dedup();

    let mut precomputed = HashMap::new();
    for (name, column, extra) in &calls {
        let key = PrecomputeKey { name: name.clone(), column: column.clone(), extra: extra.clone() };
        precomputed.insert(key, compute_precomputed(name, column, extra, rows, partition_by));
    }

    let mut values = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let included = filter.map(|f| filter_matches(f, row)).unwrap_or(true);
        if !included {
            values.push(Value::Null);
            continue;
        }
        let ctx = EvalCtx { precomputed: precomputed.clone(), row, row_index: i };
        values.push(eval_node(expr, &ctx)?);
    }

    let result_type = infer_result_type(expr, &values);

    let mut stats = EvalStats::default();
    let mut numeric_values = Vec::new();
    for v in &values {
        stats.count += 1;
        if v.is_null() {
            stats.nulls += 1;
        } else if let Some(n) = f::as_f64(v) {
            numeric_values.push(n);
        }
    }
    if !numeric_values.is_empty() {
        stats.mean = stats::mean(&numeric_values);
        stats.min = stats::min_max(&numeric_values).map(|(lo, _)| lo);
        stats.max = stats::min_max(&numeric_values).map(|(_, hi)| hi);
    }

    let mut warnings = Vec::new();
    let non_null = stats.count - stats.nulls;
    if stats.count > 0 && stats.nulls == stats.count {
        warnings.push("all outputs are null".to_string());
    } else if stats.count > 0 && (stats.nulls as f64 / stats.count as f64) >= 0.2 {
        warnings.push(format!("{:.0}% of outputs are null", stats.nulls as f64 / stats.count as f64 * 100.0));
    }
    if non_null > 1 {
        let first_non_null = values.iter().find(|v| !v.is_null());
        if let Some(first) = first_non_null {
            if values.iter().filter(|v| !v.is_null()).all(|v| v == first) {
                warnings.push("output is constant".to_string());
            }
        }
    }

    Ok(EvalOutput { values, result_type, stats, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn evaluates_simple_arithmetic_expression() {
        let expr = parse("score + 1").unwrap();
        let rows = vec![row(&[("score", json!(1))]), row(&[("score", json!(2))])];
        let out = evaluate(&expr, &rows, None, None).unwrap();
        assert_eq!(out.values, vec![json!(2.0), json!(3.0)]);
        assert_eq!(out.result_type, SemanticType::Numeric);
    }

    #[test]
    fn zscore_uses_group_mean_and_stddev() {
        let expr = parse("zscore(score)").unwrap();
        let rows = vec![
            row(&[("score", json!(1))]),
            row(&[("score", json!(2))]),
            row(&[("score", json!(3))]),
        ];
        let out = evaluate(&expr, &rows, None, None).unwrap();
        assert!(matches!(out.values[1], Value::Number(_)));
    }

    #[test]
    fn rank_is_dense_and_one_based() {
        let expr = parse("rank(score)").unwrap();
        let rows = vec![
            row(&[("score", json!(10))]),
            row(&[("score", json!(10))]),
            row(&[("score", json!(20))]),
        ];
        let out = evaluate(&expr, &rows, None, None).unwrap();
        assert_eq!(out.values, vec![json!(1.0), json!(1.0), json!(2.0)]);
    }

    #[test]
    fn row_filter_nulls_excluded_rows() {
        let expr = parse("score * 2").unwrap();
        let rows = vec![row(&[("score", json!(1))]), row(&[("score", json!(5))])];
        let filter = RowFilter { field: "score".into(), op: FilterOp::Gt, value: Some(json!(3)) };
        let out = evaluate(&expr, &rows, None, Some(&filter)).unwrap();
        assert_eq!(out.values, vec![Value::Null, json!(10.0)]);
    }

    #[test]
    fn warns_when_output_is_constant() {
        let expr = parse("1 + 1").unwrap();
        let rows = vec![row(&[]), row(&[]), row(&[])];
        let out = evaluate(&expr, &rows, None, None).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("constant")));
    }

    #[test]
    fn comparison_yields_boolean_result_type() {
        let expr = parse("score > 1").unwrap();
        let rows = vec![row(&[("score", json!(1))])];
        let out = evaluate(&expr, &rows, None, None).unwrap();
        assert_eq!(out.result_type, SemanticType::Categorical);
    }
}
