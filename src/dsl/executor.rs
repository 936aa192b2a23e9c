//! Hybrid executor: runs a `DslQuery` against a connected source, pushing
//! down to SQL when every requested feature is pushdown-safe, otherwise
//! fetching the minimum raw columns and finishing aggregation, having,
//! windows, sort, and limit in-process.

use super::compiler::{compile_full, compile_reduced, is_pushdown_safe};
use super::query::{Aggregate, DslQuery, FilterOpWire, GroupByItem, OrderBy, SelectItem, SortDirection, TimeBucket, WindowFn};
use crate::contracts::{ConnectedSource, QueryResult, Row};
use crate::expr::functions as f;
use crate::util::stats;
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

const HARD_LIMIT: usize = 10_000;

/// Every unqualified *raw-table* field `query` references: select/group-by/
/// pre-aggregate filter and window partition/order fields. `having` and the
/// final `orderBy` are deliberately excluded — they reference the query's
/// *output* aliases (e.g. an aggregate's `as`), not raw source columns, so
/// checking them against table schemas would misfire on every aggregation.
fn referenced_fields(query: &DslQuery) -> Vec<&str> {
    let mut fields = Vec::new();
    for item in &query.select {
        match item {
            SelectItem::Field(f) => fields.push(f.as_str()),
            SelectItem::Aggregate { field, .. } => fields.push(field.as_str()),
            SelectItem::Window { field, partition_by, order_by, .. } => {
                if let Some(f) = field {
                    fields.push(f.as_str());
                }
                if let Some(p) = partition_by {
                    fields.push(p.as_str());
                }
                if let Some(o) = order_by {
                    fields.push(o.as_str());
                }
            }
        }
    }
    for g in &query.group_by {
        fields.push(g.field());
    }
    for f in &query.filter {
        fields.push(f.field.as_str());
    }
    fields
}

/// Spec §4.H/§4.I: "the compiler throws on ambiguous or unknown field
/// references and includes the set of available names in the message."
/// A field is ambiguous when it is unqualified (no `table.` prefix) and more
/// than one table in the join chain defines a column of that name.
async fn validate_field_references(source: &dyn ConnectedSource, table: &str, query: &DslQuery) -> Result<()> {
    let schema = source.get_schema().await?;
    let mut tables: Vec<&str> = vec![table];
    tables.extend(query.join.iter().map(|j| j.table.as_str()));

    for field in referenced_fields(query) {
        if field.contains('.') {
            continue;
        }
        let owners: Vec<&str> = tables.iter().filter(|t| schema.has_column(t, field)).copied().collect();
        match owners.len() {
            0 => {
                let available: Vec<String> = tables.iter().flat_map(|t| schema.column_names(t)).collect();
                anyhow::bail!("unknown field \"{field}\"; available fields: {}", available.join(", "));
            }
            1 => {}
            _ => {
                let candidates: Vec<String> = owners.iter().map(|t| format!("{t}.{field}")).collect();
                anyhow::bail!("ambiguous field \"{field}\"; qualify as one of: {}", candidates.join(", "));
            }
        }
    }
    Ok(())
}

pub async fn execute(source: &dyn ConnectedSource, table: &str, query: &DslQuery) -> Result<(QueryResult, bool)> {
    if !query.join.is_empty() {
        validate_field_references(source, table, query).await?;
    }

    if is_pushdown_safe(query) {
        let (sql, params) = compile_full(table, query)?;
        let sql = bind_params(&sql, &params);
        let result = source.execute_query(&sql).await?;
        let truncated = query.limit.map(|l| result.rows.len() >= l.min(HARD_LIMIT)).unwrap_or(false);
        return Ok((result, truncated));
    }

    let (sql, params, _columns) = compile_reduced(table, query)?;
    let sql = bind_params(&sql, &params);
    let raw = source.execute_query(&sql).await?;

    run_in_process(raw.rows, query)
}

/// Inline scalar parameters directly into SQL text. Connectors expose only
/// `execute_query(sql)`, so parameterization happens here rather than through
/// a prepared-statement API; values are JSON scalars produced by this crate's
/// own query shape, not arbitrary caller SQL.
fn bind_params(sql: &str, params: &[serde_json::Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut params = params.iter();
    for ch in sql.chars() {
        if ch == '?' {
            if let Some(p) = params.next() {
                out.push_str(&literal(p));
                continue;
            }
        }
        out.push(ch);
    }
    out
}

fn literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        serde_json::Value::Null => "NULL".to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn bucket_value(raw: &serde_json::Value, bucket: TimeBucket) -> serde_json::Value {
    let Some(s) = f::as_str(raw) else { return serde_json::Value::Null };
    let Ok(date) = NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d") else {
        return serde_json::Value::String(s);
    };
    let bucketed = match bucket {
        TimeBucket::Day => date.format("%Y-%m-%d").to_string(),
        TimeBucket::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        TimeBucket::Month => date.format("%Y-%m").to_string(),
        TimeBucket::Quarter => format!("{}-Q{}", date.year(), (date.month0() / 3) + 1),
        TimeBucket::Year => date.format("%Y").to_string(),
    };
    serde_json::Value::String(bucketed)
}

fn group_key(row: &Row, query: &DslQuery) -> Vec<serde_json::Value> {
    query
        .group_by
        .iter()
        .map(|g| match g {
            GroupByItem::Field(f) => row.get(f).cloned().unwrap_or(serde_json::Value::Null),
            GroupByItem::Bucket { field, bucket } => {
                bucket_value(row.get(field).unwrap_or(&serde_json::Value::Null), *bucket)
            }
        })
        .collect()
}

fn has_aggregates(query: &DslQuery) -> bool {
    query.select.iter().any(|item| matches!(item, SelectItem::Aggregate { .. }))
}

fn run_in_process(rows: Vec<Row>, query: &DslQuery) -> Result<(QueryResult, bool)> {
    let mut out_rows: Vec<Row> = if has_aggregates(query) || !query.group_by.is_empty() {
        let mut order: Vec<Vec<serde_json::Value>> = Vec::new();
        let mut buckets: HashMap<String, (Vec<serde_json::Value>, Vec<Row>)> = HashMap::new();
        for row in rows {
            let key = group_key(&row, query);
            let key_str = key.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\u{1}");
            if !buckets.contains_key(&key_str) {
                order.push(key.clone());
            }
            buckets.entry(key_str).or_insert_with(|| (key.clone(), Vec::new())).1.push(row);
        }
        let groups: Vec<(Vec<serde_json::Value>, Vec<Row>)> = order
            .into_iter()
            .map(|key| {
                let key_str = key.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\u{1}");
                buckets.remove(&key_str).unwrap()
            })
            .collect();

        groups
            .iter()
            .map(|(key, group_rows)| {
                let mut out = Row::new();
                for (g, value) in query.group_by.iter().zip(key.iter()) {
                    out.insert(g.field().to_string(), value.clone());
                }
                for item in &query.select {
                    if let SelectItem::Aggregate { field, aggregate, r#as, percentile } = item {
                        out.insert(r#as.clone(), compute_aggregate(group_rows, field, *aggregate, *percentile));
                    }
                }
                out
            })
            .collect()
    } else {
        // No grouping and no aggregates: pass raw rows through, renaming
        // fields to their `select` output names so window functions and the
        // final shape match what was requested.
        rows.into_iter()
            .map(|row| {
                let mut out = Row::new();
                for item in &query.select {
                    if let SelectItem::Field(f) = item {
                        out.insert(f.clone(), row.get(f).cloned().unwrap_or(serde_json::Value::Null));
                    }
                }
                for (k, v) in &row {
                    out.entry(k.clone()).or_insert_with(|| v.clone());
                }
                out
            })
            .collect()
    };

    for clause in &query.having {
        let filter = crate::expr::evaluator::RowFilter {
            field: clause.field.clone(),
            op: to_filter_op(clause.op),
            value: clause.value.clone(),
        };
        out_rows.retain(|row| crate::expr::evaluator::filter_matches(&filter, row));
    }

    apply_windows(&mut out_rows, query)?;
    sort_rows(&mut out_rows, &query.order_by);

    let limit = query.limit.unwrap_or(HARD_LIMIT).min(HARD_LIMIT);
    let truncated = out_rows.len() > limit;
    out_rows.truncate(limit);

    let columns: Vec<String> = query.select.iter().map(|s| s.output_name().to_string()).collect();
    Ok((QueryResult { columns, rows: out_rows }, truncated))
}

fn to_filter_op(op: FilterOpWire) -> crate::expr::evaluator::FilterOp {
    use crate::expr::evaluator::FilterOp as F;
    match op {
        FilterOpWire::Eq => F::Eq,
        FilterOpWire::Ne => F::Ne,
        FilterOpWire::Gt => F::Gt,
        FilterOpWire::Ge => F::Ge,
        FilterOpWire::Lt => F::Lt,
        FilterOpWire::Le => F::Le,
        FilterOpWire::In => F::In,
        FilterOpWire::NotIn => F::NotIn,
        FilterOpWire::Between => F::Between,
        FilterOpWire::IsNull => F::IsNull,
        FilterOpWire::IsNotNull => F::IsNotNull,
        FilterOpWire::Like => F::Eq,
    }
}

fn compute_aggregate(rows: &[Row], field: &str, aggregate: Aggregate, percentile: Option<f64>) -> serde_json::Value {
    let raw: Vec<&serde_json::Value> = rows.iter().map(|r| r.get(field).unwrap_or(&serde_json::Value::Null)).collect();
    let numeric: Vec<f64> = raw.iter().filter_map(|v| f::as_f64(v)).collect();

    match aggregate {
        Aggregate::Count => serde_json::Value::from(raw.iter().filter(|v| !v.is_null()).count()),
        Aggregate::CountDistinct => {
            let mut seen = std::collections::HashSet::new();
            for v in raw.iter().filter(|v| !v.is_null()) {
                seen.insert(v.to_string());
            }
            serde_json::Value::from(seen.len())
        }
        Aggregate::Sum => to_json(Some(numeric.iter().sum())),
        Aggregate::Avg => to_json(stats::mean(&numeric)),
        Aggregate::Min => to_json(stats::min_max(&numeric).map(|(lo, _)| lo)),
        Aggregate::Max => to_json(stats::min_max(&numeric).map(|(_, hi)| hi)),
        Aggregate::Median => {
            let mut sorted = numeric.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            to_json(stats::median(&sorted))
        }
        Aggregate::Stddev => to_json(Some(stats::stddev_population(&numeric, stats::mean(&numeric)))),
        Aggregate::P25 => {
            let mut sorted = numeric.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            to_json(stats::percentile(&sorted, 25.0))
        }
        Aggregate::P75 => {
            let mut sorted = numeric.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            to_json(stats::percentile(&sorted, 75.0))
        }
        Aggregate::Percentile => {
            let mut sorted = numeric.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            to_json(stats::percentile(&sorted, percentile.unwrap_or(50.0)))
        }
    }
}

fn to_json(v: Option<f64>) -> serde_json::Value {
    v.and_then(serde_json::Number::from_f64).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null)
}

/// Apply window functions in declaration order over the whole result set,
/// partitioned and sorted per window spec.
fn apply_windows(rows: &mut [Row], query: &DslQuery) -> Result<()> {
    for item in &query.select {
        let SelectItem::Window { window, field, r#as, partition_by, order_by, offset, default } = item else {
            continue;
        };

        let partitions = partition_indices(rows, partition_by.as_deref());
        for mut indices in partitions {
            if let Some(order_field) = order_by {
                indices.sort_by(|&a, &b| compare_cell(rows[a].get(order_field), rows[b].get(order_field)));
            }

            match window {
                WindowFn::Lag | WindowFn::Lead => {
                    let Some(field) = field else { continue };
                    let offset = offset.unwrap_or(1).max(1) as usize;
                    let values: Vec<serde_json::Value> =
                        indices.iter().map(|&i| rows[i].get(field).cloned().unwrap_or(serde_json::Value::Null)).collect();
                    for (pos, &idx) in indices.iter().enumerate() {
                        let source_pos = if matches!(window, WindowFn::Lag) {
                            pos.checked_sub(offset)
                        } else {
                            let next = pos + offset;
                            (next < values.len()).then_some(next)
                        };
                        let value = source_pos.map(|p| values[p].clone()).unwrap_or_else(|| default.clone().unwrap_or(serde_json::Value::Null));
                        rows[idx].insert(r#as.clone(), value);
                    }
                }
                WindowFn::RowNumber => {
                    for (pos, &idx) in indices.iter().enumerate() {
                        rows[idx].insert(r#as.clone(), serde_json::Value::from(pos + 1));
                    }
                }
                WindowFn::Rank | WindowFn::DenseRank => {
                    let Some(order_field) = order_by else { continue };
                    let mut rank = 0usize;
                    let mut dense = 0usize;
                    let mut last: Option<serde_json::Value> = None;
                    for (pos, &idx) in indices.iter().enumerate() {
                        let current = rows[idx].get(order_field).cloned();
                        let is_new = last.as_ref().map(|l| current.as_ref() != Some(l)).unwrap_or(true);
                        if is_new {
                            rank = pos + 1;
                            dense += 1;
                            last = current;
                        }
                        let value = if matches!(window, WindowFn::Rank) { rank } else { dense };
                        rows[idx].insert(r#as.clone(), serde_json::Value::from(value));
                    }
                }
                WindowFn::RunningSum | WindowFn::RunningAvg => {
                    let Some(field) = field else { continue };
                    let mut running = 0.0;
                    let mut count = 0usize;
                    for &idx in &indices {
                        if let Some(v) = f::as_f64(rows[idx].get(field).unwrap_or(&serde_json::Value::Null)) {
                            running += v;
                            count += 1;
                        }
                        let value = if matches!(window, WindowFn::RunningSum) { running } else if count > 0 { running / count as f64 } else { 0.0 };
                        rows[idx].insert(r#as.clone(), to_json(Some(value)));
                    }
                }
                WindowFn::PctOfTotal => {
                    let Some(field) = field else { continue };
                    let total: f64 = indices.iter().filter_map(|&i| f::as_f64(rows[i].get(field).unwrap_or(&serde_json::Value::Null))).sum();
                    for &idx in &indices {
                        let v = f::as_f64(rows[idx].get(field).unwrap_or(&serde_json::Value::Null)).unwrap_or(0.0);
                        let pct = if total != 0.0 { v / total } else { 0.0 };
                        rows[idx].insert(r#as.clone(), to_json(Some(pct)));
                    }
                }
            }
        }
    }
    Ok(())
}

fn partition_indices(rows: &[Row], partition_by: Option<&str>) -> Vec<Vec<usize>> {
    let Some(field) = partition_by else { return vec![(0..rows.len()).collect()] };
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let key = row.get(field).map(|v| v.to_string()).unwrap_or_default();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(i);
    }
    order.into_iter().map(|k| groups.remove(&k).unwrap()).collect()
}

fn compare_cell(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> std::cmp::Ordering {
    let a = a.cloned().unwrap_or(serde_json::Value::Null);
    let b = b.cloned().unwrap_or(serde_json::Value::Null);
    match (f::as_f64(&a), f::as_f64(&b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => f::as_str(&a).unwrap_or_default().cmp(&f::as_str(&b).unwrap_or_default()),
    }
}

/// Sort rows by `order_by`, numeric compare when both sides parse as
/// numbers, otherwise string compare; nulls last ascending, first
/// descending.
pub fn sort_rows(rows: &mut [Row], order_by: &[OrderBy]) {
    rows.sort_by(|a, b| {
        for order in order_by {
            let av = a.get(&order.field);
            let bv = b.get(&order.field);
            let ordering = match (av, bv) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => nulls_ordering(order.direction),
                (Some(_), None) => nulls_ordering(order.direction).reverse(),
                (Some(x), Some(y)) => {
                    let base = compare_cell(Some(x), Some(y));
                    if order.direction == SortDirection::Desc { base.reverse() } else { base }
                }
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn nulls_ordering(direction: SortDirection) -> std::cmp::Ordering {
    match direction {
        SortDirection::Asc => std::cmp::Ordering::Greater,
        SortDirection::Desc => std::cmp::Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::query::{Aggregate, GroupByItem, OrderBy, SelectItem, SortDirection};
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn sort_rows_orders_numeric_descending_with_nulls_last() {
        let mut rows = vec![
            row(&[("v", json!(1))]),
            row(&[("v", serde_json::Value::Null)]),
            row(&[("v", json!(5))]),
        ];
        sort_rows(&mut rows, &[OrderBy { field: "v".into(), direction: SortDirection::Desc }]);
        assert_eq!(rows[0].get("v"), Some(&json!(5)));
        assert!(rows[2].get("v").unwrap().is_null());
    }

    #[test]
    fn run_in_process_groups_and_sums() {
        let rows = vec![
            row(&[("category", json!("a")), ("price", json!(10))]),
            row(&[("category", json!("a")), ("price", json!(20))]),
            row(&[("category", json!("b")), ("price", json!(5))]),
        ];
        let query = DslQuery {
            join: vec![],
            select: vec![SelectItem::Aggregate { field: "price".into(), aggregate: Aggregate::Sum, r#as: "total".into(), percentile: None }],
            group_by: vec![GroupByItem::Field("category".into())],
            filter: vec![],
            having: vec![],
            order_by: vec![OrderBy { field: "total".into(), direction: SortDirection::Desc }],
            limit: None,
        };
        let (result, truncated) = run_in_process(rows, &query).unwrap();
        assert!(!truncated);
        assert_eq!(result.rows[0].get("total"), Some(&json!(30.0)));
    }

    #[test]
    fn run_in_process_applies_row_number_window() {
        let rows = vec![row(&[("v", json!(1))]), row(&[("v", json!(2))])];
        let query = DslQuery {
            join: vec![],
            select: vec![SelectItem::Window {
                window: WindowFn::RowNumber,
                field: None,
                r#as: "rn".into(),
                partition_by: None,
                order_by: None,
                offset: None,
                default: None,
            }],
            group_by: vec![],
            filter: vec![],
            having: vec![],
            order_by: vec![],
            limit: None,
        };
        let (result, _truncated) = run_in_process(rows, &query).unwrap();
        assert_eq!(result.rows[0].get("rn"), Some(&json!(1)));
        assert_eq!(result.rows[1].get("rn"), Some(&json!(2)));
    }
}
