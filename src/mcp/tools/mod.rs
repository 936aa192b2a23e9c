//! Tool handlers (spec §4.L): one thin async function per tool, each
//! resolving its source through `ServerState`, calling into the core, and
//! shaping the `{content, isError?, structuredContent?}` envelope every tool
//! response uses. No handler implements analysis itself — that all lives in
//! the core modules this dispatches to.

use crate::cache::{ResultCacheEntry, SpecStoreEntry};
use crate::contracts::Row;
use crate::dsl::executor;
use crate::dsl::query::DslQuery;
use crate::errors::DolexError;
use crate::mcp::server::ServerState;
use crate::mcp::types::ToolDefinition;
use crate::model::{profile_rows, DataColumn, Source, SourceConfig};
use crate::path_utils::{self, PathPolicy};
use crate::pattern::{self, registry, select_pattern, Recommendation, SelectOptions, SelectionOutcome};
use crate::transform::metadata::TransformRecord;
use crate::types::{Layer, ResultId, SourceType, SpecId};
use crate::util::color::{self, apply_color_preferences, ColorPreferences};
use serde_json::{json, Value};

/// Dispatch one tool call by name. Returns `None` for an unrecognized tool
/// name (the caller turns that into a JSON-RPC `method not found`); every
/// known tool always returns `Some`, with failures carried as `isError` in
/// the body rather than as a dispatch error.
pub async fn dispatch(state: &ServerState, name: &str, arguments: Value) -> Option<Value> {
    let result = match name {
        "add_source" | "load_csv" => add_source(state, arguments).await,
        "describe_source" => describe_source(state, arguments).await,
        "list_sources" => list_sources(state, arguments).await,
        "remove_source" => remove_source(state, arguments).await,
        "query_source" => query_source(state, arguments).await,
        "query_dsl" => query_dsl(state, arguments).await,
        "visualize" => visualize(state, arguments).await,
        "visualize_from_source" => visualize_from_source(state, arguments).await,
        "refine_visualization" => refine_visualization(state, arguments).await,
        "transform_data" => transform_data(state, arguments).await,
        "list_transforms" => list_transforms(state, arguments).await,
        "promote_columns" => promote_columns(state, arguments).await,
        "drop_columns" => drop_columns(state, arguments).await,
        "list_patterns" => list_patterns(state, arguments).await,
        "get_cached_result" => get_cached_result(state, arguments).await,
        "clear_cache" => clear_cache(state, arguments).await,
        "server_status" => server_status(state, arguments).await,
        _ => return None,
    };
    Some(match result {
        Ok(body) => success_envelope(body),
        Err(err) => error_envelope(&err),
    })
}

fn success_envelope(body: Value) -> Value {
    let mut envelope = json!({ "content": [{ "type": "text", "text": body.to_string() }] });
    if let Some(spec_id) = body.get("specId") {
        envelope["structuredContent"] = json!({ "specId": spec_id });
    }
    envelope
}

fn error_envelope(err: &DolexError) -> Value {
    let body = err.to_error_body();
    json!({ "content": [{ "type": "text", "text": body.to_string() }], "isError": true })
}

// --- argument helpers -------------------------------------------------

fn field<'a>(args: &'a Value, name: &str) -> Result<&'a Value, DolexError> {
    args.get(name).ok_or_else(|| DolexError::protocol(format!("missing argument: {name}")))
}

fn string_field(args: &Value, name: &str) -> Result<String, DolexError> {
    field(args, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DolexError::protocol(format!("argument \"{name}\" must be a string")))
}

fn optional_string(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(str::to_string)
}

fn optional_usize(args: &Value, name: &str) -> Option<usize> {
    args.get(name).and_then(|v| v.as_u64()).map(|n| n as usize)
}

fn string_array_field(args: &Value, name: &str) -> Result<Vec<String>, DolexError> {
    field(args, name)?
        .as_array()
        .ok_or_else(|| DolexError::protocol(format!("argument \"{name}\" must be an array")))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| DolexError::protocol(format!("argument \"{name}\" must contain only strings")))
        })
        .collect()
}

fn parse_layer(s: &str) -> Result<Layer, DolexError> {
    match s {
        "working" => Ok(Layer::Working),
        "derived" => Ok(Layer::Derived),
        other => Err(DolexError::user_input(format!("unknown layer: {other}"))),
    }
}

async fn resolve_source(state: &ServerState, args: &Value) -> Result<Source, DolexError> {
    let id_or_name = string_field(args, "sourceId")?;
    state
        .source_manager
        .find_entry(&id_or_name)
        .await
        .ok_or_else(|| DolexError::user_input(format!("unknown source: {id_or_name}")))
}

// --- source lifecycle ---------------------------------------------------

async fn add_source(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let name = string_field(&args, "name")?;
    let path = string_field(&args, "path")?;

    let policy = PathPolicy { sandbox_prefixes: state.config.storage.sandbox_prefixes.clone() };
    let resolved = path_utils::resolve_source_path(&path, &policy).map_err(|e| DolexError::user_input(e.to_string()))?;

    if let Some(existing) = state.source_manager.find_entry(&name).await {
        let conn = state.source_manager.get_connection(&existing).await?;
        let schema = conn.get_schema().await.map_err(|e| DolexError::backend(e.to_string()))?;
        state.operation_log.record_ok("add_source", Some(existing.id.as_str().to_string()));
        return Ok(json!({
            "sourceId": existing.id.as_str(),
            "tables": schema.tables.keys().cloned().collect::<Vec<_>>(),
            "message": "Reconnected",
        }));
    }

    let source_type = if resolved.is_dir() {
        path_utils::infer_directory_source_type(&resolved)
            .map_err(|e| DolexError::user_input(e.to_string()))?
            .ok_or_else(|| DolexError::user_input("directory contains no recognizable tabular files (.csv, .sqlite, .db)"))?
    } else {
        match resolved.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") => SourceType::Sqlite,
            _ => SourceType::Csv,
        }
    };
    let config = match source_type {
        SourceType::Csv => SourceConfig::Csv { path: resolved.to_string_lossy().to_string() },
        SourceType::Sqlite => SourceConfig::Sqlite { path: resolved.to_string_lossy().to_string() },
    };

    let result = state.source_manager.add_source(&name, config).await;
    match &result {
        Ok(info) => state.operation_log.record_ok("add_source", Some(info.source_id.as_str().to_string())),
        Err(e) => state.operation_log.record_error("add_source", None, &e.to_string()),
    }
    let info = result?;

    Ok(json!({ "sourceId": info.source_id.as_str(), "tables": info.tables, "message": "Loaded" }))
}

fn column_summary(c: &DataColumn, detail: &str) -> Value {
    let mut v = json!({
        "name": c.name,
        "semanticType": c.semantic_type.to_string(),
        "uniqueCount": c.unique_count,
        "nullCount": c.null_count,
        "totalCount": c.total_count,
    });
    if detail == "full" {
        v["samples"] = json!(c.samples);
        v["numericStats"] = json!(c.numeric_stats);
        v["topValues"] = json!(c.top_values);
    }
    v
}

async fn describe_source(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let detail = optional_string(&args, "detail").unwrap_or_else(|| "compact".to_string());

    let schema = state.source_manager.get_schema(&source).await?;
    let table_schema = schema.tables.get(&table).ok_or_else(|| DolexError::user_input(format!("unknown table: {table}")))?;

    let columns: Vec<Value> = table_schema.columns.iter().map(|c| column_summary(c, &detail)).collect();
    let mut body = json!({ "rowCount": table_schema.row_count, "columns": columns });

    if detail == "full" {
        let conn = state.source_manager.get_connection(&source).await?;
        let sample_rows = conn.get_sample_rows(&table, 10).await.map_err(|e| DolexError::backend(e.to_string()))?;
        body["sampleRows"] = json!(sample_rows);
    }
    Ok(body)
}

async fn list_sources(state: &ServerState, _args: Value) -> Result<Value, DolexError> {
    let sources = state.source_manager.list_sources().await;
    let listed: Vec<Value> = sources
        .iter()
        .map(|s| {
            json!({
                "sourceId": s.id.as_str(),
                "name": s.name,
                "type": s.config.source_type().to_string(),
                "connectedAt": s.connected_at,
            })
        })
        .collect();
    Ok(json!({ "sources": listed }))
}

async fn remove_source(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let id_or_name = string_field(&args, "sourceId")?;
    state.source_manager.remove_source(&id_or_name).await?;
    state.operation_log.record_ok("remove_source", Some(id_or_name));
    Ok(json!({ "ok": true }))
}

// --- query ---------------------------------------------------------------

async fn query_source(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let sql = string_field(&args, "sql")?;
    let max_rows = optional_usize(&args, "maxRows");

    let result = state.source_manager.query_sql(&source, &sql, max_rows).await?;
    let total_rows = result.rows.len();
    let requested = max_rows.unwrap_or(state.config.performance.max_query_rows);
    let truncated = total_rows >= requested.min(state.config.performance.hard_row_cap);
    let result_id = state.result_cache.insert(ResultCacheEntry::from(result.clone()));

    state.operation_log.record_ok("query_source", Some(source.id.as_str().to_string()));
    Ok(json!({
        "rows": result.rows,
        "columns": result.columns,
        "totalRows": total_rows,
        "truncated": truncated,
        "resultId": result_id.as_str(),
    }))
}

async fn query_dsl(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let query: DslQuery =
        serde_json::from_value(field(&args, "query")?.clone()).map_err(|e| DolexError::protocol(format!("invalid DSL query: {e}")))?;

    let join_tables: Vec<&str> = query.join.iter().map(|j| j.table.as_str()).collect();
    let materialized = state.transform_manager.materialized_source_with_joins(&state.source_manager, &source, &table, &join_tables).await?;
    let (result, truncated) = executor::execute(&materialized, &table, &query).await.map_err(|e| DolexError::backend(e.to_string()))?;
    let total_rows = result.rows.len();
    let result_id = state.result_cache.insert(ResultCacheEntry::from(result.clone()));

    state.operation_log.record_ok("query_dsl", Some(format!("{}/{}", source.id.as_str(), table)));
    Ok(json!({
        "rows": result.rows,
        "columns": result.columns,
        "totalRows": total_rows,
        "truncated": truncated,
        "resultId": result_id.as_str(),
    }))
}

// --- visualization ---------------------------------------------------------

fn select_options_from(args: &Value) -> SelectOptions {
    SelectOptions {
        force_pattern: optional_string(args, "pattern"),
        filter_categories: None,
        exclude_patterns: None,
        max_alternatives: optional_usize(args, "maxAlternativeChartTypes").unwrap_or(3),
    }
}

fn extract_color_prefs(args: &Value) -> ColorPreferences {
    ColorPreferences {
        palette: optional_string(args, "palette"),
        highlight: args.get("highlight").cloned(),
        color_field: optional_string(args, "colorField"),
    }
}

async fn visualize_dataset(state: &ServerState, args: &Value) -> Result<(Vec<Row>, Vec<DataColumn>), DolexError> {
    if let Some(data) = args.get("data") {
        let rows: Vec<Row> = serde_json::from_value(data.clone()).map_err(|e| DolexError::protocol(format!("invalid \"data\": {e}")))?;
        let columns = profile_rows(&rows);
        return Ok((rows, columns));
    }
    if let Some(result_id) = args.get("resultId").and_then(|v| v.as_str()) {
        let id = ResultId::parse(result_id).map_err(|e| DolexError::user_input(e.to_string()))?;
        let entry = state.result_cache.get(&id).ok_or_else(|| DolexError::user_input(format!("unknown resultId: {result_id}")))?;
        let columns = profile_rows(&entry.rows);
        return Ok((entry.rows, columns));
    }
    if args.get("sourceId").is_some() {
        let source = resolve_source(state, args).await?;
        let sql = string_field(args, "sql")?;
        let result = state.source_manager.query_sql(&source, &sql, None).await?;
        let columns = profile_rows(&result.rows);
        return Ok((result.rows, columns));
    }
    Err(DolexError::protocol("visualize requires one of \"data\", \"resultId\", or \"sourceId\" + \"sql\""))
}

fn build_visualization_response(state: &ServerState, args: &Value, columns: &[DataColumn], mut outcome: SelectionOutcome) -> Result<Value, DolexError> {
    let prefs = extract_color_prefs(args);
    let mut notes = apply_color_preferences(&mut outcome.recommended.spec, columns, &prefs);
    for alt in &mut outcome.alternatives {
        notes.extend(apply_color_preferences(&mut alt.spec, columns, &prefs));
    }

    let include_data_table = args.get("includeDataTable").and_then(|v| v.as_bool()).unwrap_or(true);
    if !include_data_table {
        outcome.recommended.spec.data.clear();
    }

    let spec_id = state.spec_store.insert(SpecStoreEntry {
        spec: outcome.recommended.spec.clone(),
        alternatives: outcome.alternatives.iter().map(|a| a.spec.clone()).collect(),
        created_at: chrono::Utc::now(),
    });

    state.operation_log.record_ok("visualize", Some(outcome.recommended.pattern_id.clone()));
    Ok(json!({
        "specId": spec_id.as_str(),
        "recommended": recommendation_json(&outcome.recommended),
        "alternatives": outcome.alternatives.iter().map(recommendation_json).collect::<Vec<_>>(),
        "dataShape": {
            "rowCount": outcome.context.row_count,
            "numericColumns": outcome.context.numeric_count,
            "categoricalColumns": outcome.context.categorical_count,
            "dateColumns": outcome.context.date_count,
            "hasTimeSeries": outcome.context.has_time_series,
        },
        "colorNotes": notes,
    }))
}

fn recommendation_json(r: &Recommendation) -> Value {
    json!({ "pattern": r.pattern_id, "title": r.title, "reasoning": r.reasoning })
}

async fn visualize(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let (rows, columns) = visualize_dataset(state, &args).await?;
    let intent = optional_string(&args, "intent").unwrap_or_default();
    let options = select_options_from(&args);
    let outcome = select_pattern(&rows, &columns, &intent, &options)?;
    build_visualization_response(state, &args, &columns, outcome)
}

async fn visualize_from_source(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let query: DslQuery =
        serde_json::from_value(field(&args, "query")?.clone()).map_err(|e| DolexError::protocol(format!("invalid DSL query: {e}")))?;

    let join_tables: Vec<&str> = query.join.iter().map(|j| j.table.as_str()).collect();
    let materialized = state.transform_manager.materialized_source_with_joins(&state.source_manager, &source, &table, &join_tables).await?;
    let (result, _truncated) = executor::execute(&materialized, &table, &query).await.map_err(|e| DolexError::backend(e.to_string()))?;
    let columns = profile_rows(&result.rows);

    let intent = optional_string(&args, "intent").unwrap_or_default();
    let options = select_options_from(&args);
    let outcome = select_pattern(&result.rows, &columns, &intent, &options)?;
    build_visualization_response(state, &args, &columns, outcome)
}

fn compare_json(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.as_str().unwrap_or_default().cmp(b.as_str().unwrap_or_default()),
    }
}

async fn refine_visualization(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let spec_id_raw = string_field(&args, "specId")?;
    let spec_id = SpecId::parse(&spec_id_raw).map_err(|e| DolexError::user_input(e.to_string()))?;
    let mut entry = state.spec_store.get(&spec_id).ok_or_else(|| DolexError::user_input(format!("unknown specId: {spec_id_raw}")))?;

    let columns = profile_rows(&entry.spec.data);
    let mut changes = Vec::new();

    if let Some(pattern_id) = optional_string(&args, "pattern") {
        if pattern_id != entry.spec.pattern_id {
            let pattern = registry::find(&pattern_id).ok_or_else(|| DolexError::user_input(format!("unknown pattern: {pattern_id}")))?;
            let ctx = pattern::build_context(&entry.spec.data, &columns, "");
            entry.spec = (pattern.generate_spec)(&entry.spec.data, &columns, &ctx).map_err(|e| DolexError::backend(e.to_string()))?;
            changes.push(format!("pattern changed to \"{pattern_id}\""));
        }
    }

    if let Some(sort) = args.get("sort") {
        let field = sort.get("field").and_then(|v| v.as_str()).ok_or_else(|| DolexError::protocol("sort.field is required"))?;
        let descending = sort.get("direction").and_then(|v| v.as_str()) == Some("desc");
        entry.spec.data.sort_by(|a, b| {
            let ordering = compare_json(a.get(field).unwrap_or(&Value::Null), b.get(field).unwrap_or(&Value::Null));
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        changes.push(format!("sorted by \"{field}\""));
    }

    if args.get("palette").is_some() || args.get("highlight").is_some() || args.get("colorField").is_some() {
        let prefs = extract_color_prefs(&args);
        changes.extend(apply_color_preferences(&mut entry.spec, &columns, &prefs));
    }

    let new_id = state.spec_store.insert(SpecStoreEntry { spec: entry.spec.clone(), alternatives: entry.alternatives.clone(), created_at: chrono::Utc::now() });
    Ok(json!({ "specId": new_id.as_str(), "changes": changes }))
}

// --- transforms ------------------------------------------------------------

async fn transform_data(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let create = field(&args, "create")?;
    let name = create.get("name").and_then(|v| v.as_str()).ok_or_else(|| DolexError::protocol("create.name is required"))?;
    let expr = create.get("expr").and_then(|v| v.as_str()).ok_or_else(|| DolexError::protocol("create.expr is required"))?;
    let partition_by = create.get("partitionBy").and_then(|v| v.as_str()).map(str::to_string);

    let warnings = state.transform_manager.add_column(&state.source_manager, &source, &table, name, expr, partition_by).await?;
    state.operation_log.record_ok("transform_data", Some(format!("{}/{}", source.id.as_str(), table)));
    Ok(json!({ "column": name, "warnings": warnings }))
}

fn transform_record_json(r: &TransformRecord) -> Value {
    json!({
        "column": r.column,
        "expr": r.expr,
        "layer": r.layer.to_string(),
        "dependsOn": r.depends_on,
        "partitionBy": r.partition_by,
    })
}

async fn list_transforms(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let layer = optional_string(&args, "layer").map(|s| parse_layer(&s)).transpose()?;
    let records = state.transform_manager.list(&state.source_manager, &source, &table, layer).await?;
    Ok(json!({ "transforms": records.iter().map(transform_record_json).collect::<Vec<_>>() }))
}

async fn promote_columns(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let columns = string_array_field(&args, "columns")?;
    let promoted = state.transform_manager.promote_columns(&state.source_manager, &source, &table, &columns).await?;
    state.operation_log.record_ok("promote_columns", Some(format!("{}/{}", source.id.as_str(), table)));
    Ok(json!({ "promoted": promoted }))
}

async fn drop_columns(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let source = resolve_source(state, &args).await?;
    let table = string_field(&args, "table")?;
    let columns = string_array_field(&args, "columns")?;
    // Default to `working` when unspecified: dropping a promoted (derived)
    // column is the more consequential action and should be asked for
    // explicitly rather than inferred.
    let layer = optional_string(&args, "layer").map(|s| parse_layer(&s)).transpose()?.unwrap_or(Layer::Working);

    let outcome = state.transform_manager.drop_columns(&state.source_manager, &source, &table, &columns, layer).await?;
    state.operation_log.record_ok("drop_columns", Some(format!("{}/{}", source.id.as_str(), table)));
    Ok(json!({ "dropped": outcome.dropped, "restored": outcome.restored }))
}

// --- patterns, cache, status -------------------------------------------------

async fn list_patterns(_state: &ServerState, _args: Value) -> Result<Value, DolexError> {
    let patterns: Vec<Value> = pattern::list_patterns()
        .into_iter()
        .map(|(id, category, description)| json!({ "id": id, "category": category, "description": description }))
        .collect();
    Ok(json!({
        "patterns": patterns,
        "colorSystem": {
            "defaultPalette": color::DEFAULT_PALETTE,
            "availablePalettes": color::AVAILABLE_PALETTES,
        },
    }))
}

async fn get_cached_result(state: &ServerState, args: Value) -> Result<Value, DolexError> {
    let result_id = string_field(&args, "resultId")?;
    let id = ResultId::parse(&result_id).map_err(|e| DolexError::user_input(e.to_string()))?;
    Ok(match state.result_cache.get(&id) {
        Some(entry) => json!({ "rows": entry.rows, "columns": entry.columns, "cachedAt": entry.created_at }),
        None => Value::Null,
    })
}

async fn clear_cache(state: &ServerState, _args: Value) -> Result<Value, DolexError> {
    state.result_cache.clear();
    state.spec_store.clear();
    state.operation_log.clear();
    Ok(json!({ "ok": true }))
}

async fn server_status(state: &ServerState, _args: Value) -> Result<Value, DolexError> {
    let sources = state.source_manager.list_sources().await;
    Ok(json!({
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
        "sourceCount": sources.len(),
        "metrics": crate::observability::get_metrics(),
        "recentOperations": state.operation_log.entries(),
    }))
}

// --- tool definitions --------------------------------------------------

fn def(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition { name: name.to_string(), description: description.to_string(), input_schema }
}

/// JSON-Schema-ish descriptions for every tool, surfaced by `tools/list`.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let source_and_path = json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "path": { "type": "string" },
            "detail": { "type": "string", "enum": ["compact", "full"] },
        },
        "required": ["name", "path"],
    });

    vec![
        def("add_source", "Register a local CSV file/directory or SQLite database as a queryable source.", source_and_path.clone()),
        def("load_csv", "Alias of add_source for CSV-first callers.", source_and_path),
        def(
            "describe_source",
            "Report a table's row count, inferred columns, and optionally sample rows.",
            json!({
                "type": "object",
                "properties": {
                    "sourceId": { "type": "string" },
                    "table": { "type": "string" },
                    "detail": { "type": "string", "enum": ["compact", "full"] },
                },
                "required": ["sourceId", "table"],
            }),
        ),
        def("list_sources", "List every registered source.", json!({ "type": "object", "properties": {} })),
        def(
            "remove_source",
            "Unregister a source and close its connection.",
            json!({ "type": "object", "properties": { "sourceId": { "type": "string" } }, "required": ["sourceId"] }),
        ),
        def(
            "query_source",
            "Run a read-only SQL query against a source and cache the result.",
            json!({
                "type": "object",
                "properties": { "sourceId": { "type": "string" }, "sql": { "type": "string" }, "maxRows": { "type": "integer" } },
                "required": ["sourceId", "sql"],
            }),
        ),
        def(
            "query_dsl",
            "Run a structured DSL query (joins, aggregates, window functions) against a table.",
            json!({
                "type": "object",
                "properties": { "sourceId": { "type": "string" }, "table": { "type": "string" }, "query": { "type": "object" } },
                "required": ["sourceId", "table", "query"],
            }),
        ),
        def(
            "visualize",
            "Recommend and build a visualization spec for inline data, a cached result, or a source query.",
            json!({
                "type": "object",
                "properties": {
                    "data": { "type": "array" },
                    "resultId": { "type": "string" },
                    "sourceId": { "type": "string" },
                    "sql": { "type": "string" },
                    "intent": { "type": "string" },
                    "pattern": { "type": "string" },
                    "includeDataTable": { "type": "boolean" },
                    "maxAlternativeChartTypes": { "type": "integer" },
                    "palette": { "type": "string" },
                    "highlight": {},
                    "colorField": { "type": "string" },
                },
            }),
        ),
        def(
            "visualize_from_source",
            "Run a DSL query against a source/table and recommend a visualization for its result.",
            json!({
                "type": "object",
                "properties": {
                    "sourceId": { "type": "string" },
                    "table": { "type": "string" },
                    "query": { "type": "object" },
                    "intent": { "type": "string" },
                    "pattern": { "type": "string" },
                    "includeDataTable": { "type": "boolean" },
                    "maxAlternativeChartTypes": { "type": "integer" },
                },
                "required": ["sourceId", "table", "query"],
            }),
        ),
        def(
            "refine_visualization",
            "Adjust a previously generated spec: change pattern, sort, or color, minting a new specId.",
            json!({
                "type": "object",
                "properties": {
                    "specId": { "type": "string" },
                    "pattern": { "type": "string" },
                    "sort": { "type": "object" },
                    "palette": { "type": "string" },
                    "highlight": {},
                    "colorField": { "type": "string" },
                },
                "required": ["specId"],
            }),
        ),
        def(
            "transform_data",
            "Add a derived column to a table from an expression.",
            json!({
                "type": "object",
                "properties": {
                    "sourceId": { "type": "string" },
                    "table": { "type": "string" },
                    "create": {
                        "type": "object",
                        "properties": { "name": { "type": "string" }, "expr": { "type": "string" }, "partitionBy": { "type": "string" } },
                        "required": ["name", "expr"],
                    },
                },
                "required": ["sourceId", "table", "create"],
            }),
        ),
        def(
            "list_transforms",
            "List a table's working and derived columns.",
            json!({
                "type": "object",
                "properties": { "sourceId": { "type": "string" }, "table": { "type": "string" }, "layer": { "type": "string", "enum": ["working", "derived"] } },
                "required": ["sourceId", "table"],
            }),
        ),
        def(
            "promote_columns",
            "Promote working columns to derived, persisting them to the table's manifest.",
            json!({
                "type": "object",
                "properties": { "sourceId": { "type": "string" }, "table": { "type": "string" }, "columns": { "type": "array", "items": { "type": "string" } } },
                "required": ["sourceId", "table", "columns"],
            }),
        ),
        def(
            "drop_columns",
            "Drop working or derived columns, restoring any shadowed derived column of the same name.",
            json!({
                "type": "object",
                "properties": {
                    "sourceId": { "type": "string" },
                    "table": { "type": "string" },
                    "columns": { "type": "array", "items": { "type": "string" } },
                    "layer": { "type": "string", "enum": ["working", "derived"] },
                },
                "required": ["sourceId", "table", "columns"],
            }),
        ),
        def("list_patterns", "List every registered visualization pattern and the color system.", json!({ "type": "object", "properties": {} })),
        def(
            "get_cached_result",
            "Fetch a previously cached query result by its resultId.",
            json!({ "type": "object", "properties": { "resultId": { "type": "string" } }, "required": ["resultId"] }),
        ),
        def("clear_cache", "Empty the result cache, spec store, and operation log.", json!({ "type": "object", "properties": {} })),
        def("server_status", "Report uptime, process-wide metrics, and recent operations.", json!({ "type": "object", "properties": {} })),
    ]
}
