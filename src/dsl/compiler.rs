//! Compiles a `DslQuery` to SQL for the SQLite dialect both connectors speak
//! (CSV tables are mirrored into an in-memory SQLite engine; SQLite sources
//! are SQLite natively). Decides, per query, whether every requested
//! aggregate/window/bucket is pushdown-safe.

use super::query::{Aggregate, DslQuery, FilterClause, FilterOpWire, GroupByItem, JoinType, OrderBy, SelectItem, SortDirection};
use anyhow::{anyhow, Result};

/// Whether `query` can be compiled and executed as one SQL statement on this
/// dialect, or needs in-process completion for some of its aggregates,
/// windows, or buckets.
pub fn is_pushdown_safe(query: &DslQuery) -> bool {
    let aggregates_ok = query.select.iter().all(|item| match item {
        SelectItem::Aggregate { aggregate, .. } => aggregate.is_pushdown_safe(),
        SelectItem::Window { .. } => false,
        SelectItem::Field(_) => true,
    });
    // A bucketed group-by key is never pushdown-safe: the in-process bucket
    // labeling (ISO week numbering for `week`) has no equivalent SQLite
    // expression that agrees with it bucket-for-bucket, and the compiled
    // SELECT list has no slot for the bucket label column the in-process
    // path always emits. Force these through the hybrid path so both ways
    // of evaluating a query produce the same grouping.
    let group_by_ok = query.group_by.iter().all(|g| !matches!(g, GroupByItem::Bucket { .. }));
    aggregates_ok && group_by_ok && query.having.is_empty()
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualify(field: &str) -> String {
    match field.split_once('.') {
        Some((table, column)) => format!("{}.{}", quote(table), quote(column)),
        None => quote(field),
    }
}

fn aggregate_sql(field: &str, aggregate: Aggregate, percentile: Option<f64>) -> String {
    let column = qualify(field);
    match aggregate {
        Aggregate::Sum => format!("SUM({column})"),
        Aggregate::Avg => format!("AVG({column})"),
        Aggregate::Min => format!("MIN({column})"),
        Aggregate::Max => format!("MAX({column})"),
        Aggregate::Count => format!("COUNT({column})"),
        Aggregate::CountDistinct => format!("COUNT(DISTINCT {column})"),
        // Not pushdown-safe on SQLite; only reached when the caller forces
        // full pushdown despite the unsupported aggregate.
        Aggregate::Median | Aggregate::Stddev | Aggregate::P25 | Aggregate::P75 | Aggregate::Percentile => {
            let _ = percentile;
            format!("AVG({column})")
        }
    }
}

fn filter_sql(clause: &FilterClause, params: &mut Vec<serde_json::Value>) -> String {
    let column = qualify(&clause.field);
    match clause.op {
        FilterOpWire::IsNull => format!("{column} IS NULL"),
        FilterOpWire::IsNotNull => format!("{column} IS NOT NULL"),
        FilterOpWire::Eq => push_param(&column, "=", clause, params),
        FilterOpWire::Ne => push_param(&column, "!=", clause, params),
        FilterOpWire::Gt => push_param(&column, ">", clause, params),
        FilterOpWire::Ge => push_param(&column, ">=", clause, params),
        FilterOpWire::Lt => push_param(&column, "<", clause, params),
        FilterOpWire::Le => push_param(&column, "<=", clause, params),
        FilterOpWire::Like => push_param(&column, "LIKE", clause, params),
        FilterOpWire::In | FilterOpWire::NotIn => {
            let items = clause.value.as_ref().and_then(|v| v.as_array()).cloned().unwrap_or_default();
            let placeholders: Vec<String> = items
                .into_iter()
                .map(|v| {
                    params.push(v);
                    "?".to_string()
                })
                .collect();
            let keyword = if clause.op == FilterOpWire::In { "IN" } else { "NOT IN" };
            format!("{column} {keyword} ({})", placeholders.join(", "))
        }
        FilterOpWire::Between => {
            let items = clause.value.as_ref().and_then(|v| v.as_array()).cloned().unwrap_or_default();
            if items.len() == 2 {
                params.push(items[0].clone());
                params.push(items[1].clone());
                format!("{column} BETWEEN ? AND ?")
            } else {
                "1=1".to_string()
            }
        }
    }
}

fn push_param(column: &str, op: &str, clause: &FilterClause, params: &mut Vec<serde_json::Value>) -> String {
    params.push(clause.value.clone().unwrap_or(serde_json::Value::Null));
    format!("{column} {op} ?")
}

fn from_clause(table: &str, query: &DslQuery) -> Result<String> {
    let mut sql = quote(table);
    for join in &query.join {
        let kind = match join.r#type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
        };
        sql.push_str(&format!(
            " {kind} {} ON {} = {}",
            quote(&join.table),
            qualify(&join.on.left),
            qualify(&join.on.right)
        ));
    }
    Ok(sql)
}

/// Compile a fully pushdown-safe query into one SQL statement (bound
/// parameters returned alongside for safe execution).
pub fn compile_full(table: &str, query: &DslQuery) -> Result<(String, Vec<serde_json::Value>)> {
    let mut params = Vec::new();
    let select_sql: Vec<String> = query
        .select
        .iter()
        .map(|item| match item {
            SelectItem::Field(f) => format!("{} AS {}", qualify(f), quote(f)),
            SelectItem::Aggregate { field, aggregate, r#as, percentile } => {
                format!("{} AS {}", aggregate_sql(field, *aggregate, *percentile), quote(r#as))
            }
            SelectItem::Window { .. } => unreachable!("windows are never pushdown-safe"),
        })
        .collect();

    let group_sql: Vec<String> = query
        .group_by
        .iter()
        .map(|g| match g {
            GroupByItem::Field(f) => qualify(f),
            // `is_pushdown_safe` routes any bucketed group-by through the
            // in-process path; `compile_full` never sees one.
            GroupByItem::Bucket { .. } => unreachable!("bucketed group-by is never pushdown-safe"),
        })
        .collect();

    let where_sql: Vec<String> = query.filter.iter().map(|f| filter_sql(f, &mut params)).collect();

    let mut sql = format!("SELECT {} FROM {}", select_sql.join(", "), from_clause(table, query)?);
    if !where_sql.is_empty() {
        sql.push_str(&format!(" WHERE {}", where_sql.join(" AND ")));
    }
    if !group_sql.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", group_sql.join(", ")));
    }
    if !query.order_by.is_empty() {
        let order_sql: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", quote(o.field.as_str()), direction_sql(o)))
            .collect();
        sql.push_str(&format!(" ORDER BY {}", order_sql.join(", ")));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit.min(10_000)));
    }

    Ok((sql, params))
}

fn direction_sql(order: &OrderBy) -> &'static str {
    match order.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

/// Compile the reduced query for the hybrid path: raw columns referenced by
/// select/group-by/filter/join, no aggregation, no limit, so the executor can
/// finish aggregation, having, windows, sort, and limit in-process.
pub fn compile_reduced(table: &str, query: &DslQuery) -> Result<(String, Vec<serde_json::Value>, Vec<String>)> {
    let mut columns: Vec<String> = Vec::new();
    let mut push = |name: &str, columns: &mut Vec<String>| {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    };

    for item in &query.select {
        match item {
            SelectItem::Field(f) => push(f, &mut columns),
            SelectItem::Aggregate { field, .. } => push(field, &mut columns),
            SelectItem::Window { field, partition_by, order_by, .. } => {
                if let Some(f) = field {
                    push(f, &mut columns);
                }
                if let Some(p) = partition_by {
                    push(p, &mut columns);
                }
                if let Some(o) = order_by {
                    push(o, &mut columns);
                }
            }
        }
    }
    for g in &query.group_by {
        push(g.field(), &mut columns);
    }
    for f in query.filter.iter().chain(query.having.iter()) {
        push(&f.field, &mut columns);
    }

    if columns.is_empty() {
        return Err(anyhow!("query references no columns"));
    }

    let mut params = Vec::new();
    let select_sql: Vec<String> = columns.iter().map(|c| format!("{} AS {}", qualify(c), quote(c))).collect();
    let where_sql: Vec<String> = query.filter.iter().map(|f| filter_sql(f, &mut params)).collect();

    let mut sql = format!("SELECT {} FROM {}", select_sql.join(", "), from_clause(table, query)?);
    if !where_sql.is_empty() {
        sql.push_str(&format!(" WHERE {}", where_sql.join(" AND ")));
    }

    Ok((sql, params, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::query::{FilterClause, JoinOn, SelectItem, TimeBucket};
    use serde_json::json;

    fn simple_query() -> DslQuery {
        DslQuery {
            join: vec![],
            select: vec![SelectItem::Aggregate {
                field: "price".into(),
                aggregate: Aggregate::Sum,
                r#as: "revenue".into(),
                percentile: None,
            }],
            group_by: vec![GroupByItem::Field("category".into())],
            filter: vec![],
            having: vec![],
            order_by: vec![],
            limit: Some(10),
        }
    }

    #[test]
    fn pushdown_safe_for_sum_group_by() {
        assert!(is_pushdown_safe(&simple_query()));
    }

    #[test]
    fn pushdown_unsafe_when_median_requested() {
        let mut query = simple_query();
        query.select.push(SelectItem::Aggregate {
            field: "price".into(),
            aggregate: Aggregate::Median,
            r#as: "median_price".into(),
            percentile: None,
        });
        assert!(!is_pushdown_safe(&query));
    }

    #[test]
    fn pushdown_unsafe_when_group_by_is_bucketed() {
        let mut query = simple_query();
        query.group_by = vec![GroupByItem::Bucket { field: "created_at".into(), bucket: TimeBucket::Week }];
        assert!(
            !is_pushdown_safe(&query),
            "a bucketed group-by key has no SQL equivalent that agrees with the in-process ISO week numbering, \
             so it must always route through the hybrid in-process path"
        );
    }

    #[test]
    fn compile_full_produces_group_by_and_limit() {
        let (sql, _params) = compile_full("orders", &simple_query()).unwrap();
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("SUM("));
    }

    #[test]
    fn compile_full_parameterizes_filter_values() {
        let mut query = simple_query();
        query.filter.push(FilterClause { field: "category".into(), op: FilterOpWire::Eq, value: Some(json!("shoes")) });
        let (sql, params) = compile_full("orders", &query).unwrap();
        assert!(sql.contains("WHERE"));
        assert_eq!(params, vec![json!("shoes")]);
    }

    #[test]
    fn compile_reduced_collects_all_referenced_columns() {
        let query = simple_query();
        let (_sql, _params, columns) = compile_reduced("orders", &query).unwrap();
        assert!(columns.contains(&"price".to_string()));
        assert!(columns.contains(&"category".to_string()));
    }

    #[test]
    fn joins_compile_with_qualified_on_clause() {
        let mut query = simple_query();
        query.join.push(super::super::query::Join {
            table: "products".into(),
            on: JoinOn { left: "product_id".into(), right: "products.product_id".into() },
            r#type: JoinType::Inner,
        });
        let (sql, _params) = compile_full("orders", &query).unwrap();
        assert!(sql.contains("JOIN \"products\""));
    }
}
