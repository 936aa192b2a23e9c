//! End-to-end scenarios (spec §8 "Concrete end-to-end scenarios", S1-S6),
//! exercised through the same tool-dispatch path `dolex serve` and the CLI
//! use, against a real temp-directory-backed `ServerState`.

use dolex::mcp::config::DolexConfig;
use dolex::mcp::server::ServerState;
use dolex::mcp::tools;
use serde_json::{json, Value};

fn state(dir: &std::path::Path) -> ServerState {
    let mut config = DolexConfig::default();
    config.storage.data_dir = dir.to_string_lossy().to_string();
    ServerState::new(config).unwrap()
}

async fn call(state: &ServerState, tool: &str, args: Value) -> Value {
    let envelope = tools::dispatch(state, tool, args).await.expect("known tool");
    let text = envelope["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

async fn call_checked(state: &ServerState, tool: &str, args: Value) -> Value {
    let envelope = tools::dispatch(state, tool, args).await.expect("known tool");
    assert!(
        envelope.get("isError").is_none(),
        "{tool} failed: {}",
        envelope["content"][0]["text"]
    );
    serde_json::from_str(envelope["content"][0]["text"].as_str().unwrap()).unwrap()
}

async fn call_failing(state: &ServerState, tool: &str, args: Value) -> Value {
    let envelope = tools::dispatch(state, tool, args).await.expect("known tool");
    assert_eq!(envelope["isError"], true, "{tool} was expected to fail");
    serde_json::from_str(envelope["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn s1_load_and_describe() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("t.csv");
    std::fs::write(&csv_path, "name,value\nAlice,100\nBob,200\nCarol,150\n").unwrap();

    let state = state(dir.path());
    let body = call_checked(
        &state,
        "add_source",
        json!({ "name": "t", "path": csv_path.to_string_lossy(), "detail": "compact" }),
    )
    .await;

    let source_id = body["sourceId"].as_str().unwrap().to_string();
    assert!(source_id.starts_with("src-"));
    assert_eq!(body["message"], "Loaded");
    let tables = body["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0], "t");

    let described = call_checked(&state, "describe_source", json!({ "sourceId": source_id, "table": "t" })).await;
    assert_eq!(described["rowCount"], 3);
    let columns = described["columns"].as_array().unwrap();
    let by_name = |name: &str| columns.iter().find(|c| c["name"] == name).unwrap().clone();
    assert_eq!(by_name("name")["semanticType"], "categorical");
    assert_eq!(by_name("value")["semanticType"], "numeric");

    // Re-adding the same name reconnects rather than erroring or duplicating.
    let reconnected = call_checked(&state, "add_source", json!({ "name": "t", "path": csv_path.to_string_lossy() })).await;
    assert_eq!(reconnected["message"], "Reconnected");
    assert_eq!(reconnected["sourceId"], source_id);
}

#[tokio::test]
async fn s2_safe_sql_and_result_caching() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("t.csv");
    std::fs::write(&csv_path, "name,value\nAlice,100\nBob,200\nCarol,150\n").unwrap();

    let state = state(dir.path());
    let added = call_checked(&state, "add_source", json!({ "name": "t", "path": csv_path.to_string_lossy() })).await;
    let source_id = added["sourceId"].as_str().unwrap().to_string();

    let queried = call_checked(&state, "query_source", json!({ "sourceId": source_id, "sql": "SELECT name, value FROM t" })).await;
    assert_eq!(queried["truncated"], false);
    let rows = queried["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["name"], "Alice");
    assert_eq!(rows[0]["value"], 100);

    let result_id = queried["resultId"].as_str().unwrap().to_string();
    assert!(result_id.starts_with("qr-"));

    let cached = call_checked(&state, "get_cached_result", json!({ "resultId": result_id })).await;
    assert_eq!(cached["rows"], queried["rows"]);

    let rejected = call_failing(
        &state,
        "query_source",
        json!({ "sourceId": source_id, "sql": "SELECT * FROM t; DROP TABLE t" }),
    )
    .await;
    assert!(rejected["error"].as_str().unwrap().to_lowercase().contains("select"));
}

#[tokio::test]
async fn s3_dsl_aggregation_and_join() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("order_items.csv"), "order_id,product_id,price\n1,p1,10\n2,p1,20\n3,p2,5\n4,p2,7\n5,p3,100\n").unwrap();
    std::fs::write(
        dir.path().join("products.csv"),
        "product_id,product_category_name\np1,electronics\np2,toys\np3,furniture\n",
    )
    .unwrap();

    let state = state(dir.path());
    let added = call_checked(&state, "add_source", json!({ "name": "shop", "path": dir.path().to_string_lossy() })).await;
    let source_id = added["sourceId"].as_str().unwrap().to_string();

    let query = json!({
        "join": [{ "table": "products", "on": { "left": "product_id", "right": "products.product_id" } }],
        "select": ["products.product_category_name", { "field": "price", "aggregate": "sum", "as": "revenue" }],
        "groupBy": ["products.product_category_name"],
        "orderBy": [{ "field": "revenue", "direction": "desc" }],
        "limit": 3,
    });
    let result = call_checked(&state, "query_dsl", json!({ "sourceId": source_id, "table": "order_items", "query": query })).await;
    let rows = result["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);

    let revenues: Vec<f64> = rows.iter().map(|r| r["revenue"].as_f64().unwrap()).collect();
    let mut sorted = revenues.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(revenues, sorted, "rows must be sorted descending by revenue");
    assert_eq!(revenues[0], 100.0, "furniture (single 100) should lead");

    for row in rows {
        let keys: Vec<&str> = row.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 2);
    }
}

#[tokio::test]
async fn s4_transform_shadow_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("t.csv"), "id,score\n1,10\n2,20\n").unwrap();

    let state = state(dir.path());
    let added = call_checked(&state, "add_source", json!({ "name": "t", "path": dir.path().join("t.csv").to_string_lossy() })).await;
    let source_id = added["sourceId"].as_str().unwrap().to_string();

    call_checked(
        &state,
        "transform_data",
        json!({ "sourceId": source_id, "table": "t", "create": { "name": "extra", "expr": "score + 1" } }),
    )
    .await;

    call_checked(&state, "promote_columns", json!({ "sourceId": source_id, "table": "t", "columns": ["extra"] })).await;

    call_checked(
        &state,
        "transform_data",
        json!({ "sourceId": source_id, "table": "t", "create": { "name": "extra", "expr": "score + 100" } }),
    )
    .await;

    let dropped = call_checked(
        &state,
        "drop_columns",
        json!({ "sourceId": source_id, "table": "t", "columns": ["extra"], "layer": "working" }),
    )
    .await;
    assert_eq!(dropped["dropped"], json!(["extra"]));
    assert_eq!(dropped["restored"], json!(["extra"]));

    let listed = call_checked(&state, "list_transforms", json!({ "sourceId": source_id, "table": "t", "layer": "derived" })).await;
    let transforms = listed["transforms"].as_array().unwrap();
    assert_eq!(transforms.len(), 1);
    assert_eq!(transforms[0]["expr"], "score + 1");
}

#[tokio::test]
async fn s5_circular_dependency_is_rejected_and_state_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("t.csv"), "id,a\n1,10\n2,20\n").unwrap();

    let state = state(dir.path());
    let added = call_checked(&state, "add_source", json!({ "name": "t", "path": dir.path().join("t.csv").to_string_lossy() })).await;
    let source_id = added["sourceId"].as_str().unwrap().to_string();

    call_checked(&state, "transform_data", json!({ "sourceId": source_id, "table": "t", "create": { "name": "b", "expr": "a + 1" } })).await;
    call_checked(&state, "promote_columns", json!({ "sourceId": source_id, "table": "t", "columns": ["b"] })).await;

    let before = call_checked(&state, "list_transforms", json!({ "sourceId": source_id, "table": "t" })).await;

    let failed = call_failing(&state, "transform_data", json!({ "sourceId": source_id, "table": "t", "create": { "name": "a", "expr": "b + 1" } })).await;
    let message = failed["error"].as_str().unwrap();
    assert!(message.contains("a") && message.contains("b"), "expected cycle path in error, got: {message}");

    let after = call_checked(&state, "list_transforms", json!({ "sourceId": source_id, "table": "t" })).await;
    assert_eq!(before, after, "a failed transform must leave transform metadata unchanged");
}

#[tokio::test]
async fn s6_pattern_selection() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());

    let data = json!([
        { "region": "N", "sales": 100 },
        { "region": "S", "sales": 200 },
        { "region": "E", "sales": 150 },
        { "region": "W", "sales": 180 },
    ]);

    let result = call_checked(&state, "visualize", json!({ "data": data, "intent": "compare sales by region" })).await;
    assert_eq!(result["recommended"]["pattern"], "bar");

    // "team" (unlike "region"/"state") is not recognized as a geo field name,
    // so forcing a geo pattern against it must fall back with a reasoning note.
    let non_geo_data = json!([
        { "team": "N", "sales": 100 },
        { "team": "S", "sales": 200 },
        { "team": "E", "sales": 150 },
        { "team": "W", "sales": 180 },
    ]);
    let forced = call_checked(
        &state,
        "visualize",
        json!({ "data": non_geo_data, "intent": "compare sales by team", "pattern": "choropleth" }),
    )
    .await;
    assert_ne!(forced["recommended"]["pattern"], "choropleth", "non-geo data should fall back from a forced geo pattern");
    assert!(forced["recommended"]["reasoning"].as_str().unwrap().contains("unavailable"));

    let empty = call_checked(&state, "visualize", json!({ "data": Value::Array(vec![]), "intent": "" })).await;
    assert!(empty["recommended"]["pattern"].is_string());
}

#[tokio::test]
async fn cache_fifo_bound_holds_under_many_inserts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("t.csv"), "id\n1\n2\n3\n").unwrap();

    let state = state(dir.path());
    let added = call_checked(&state, "add_source", json!({ "name": "t", "path": dir.path().join("t.csv").to_string_lossy() })).await;
    let source_id = added["sourceId"].as_str().unwrap().to_string();

    let mut ids = Vec::new();
    for _ in 0..25 {
        let queried = call_checked(&state, "query_source", json!({ "sourceId": source_id, "sql": "SELECT * FROM t" })).await;
        ids.push(queried["resultId"].as_str().unwrap().to_string());
    }

    for old_id in &ids[..5] {
        let body = call(&state, "get_cached_result", json!({ "resultId": old_id })).await;
        assert!(body.is_null(), "the first 5 of 25 inserts into a 20-capacity cache must have been evicted");
    }
    for recent_id in &ids[5..] {
        let body = call(&state, "get_cached_result", json!({ "resultId": recent_id })).await;
        assert!(!body.is_null(), "the last 20 of 25 inserts must still resolve");
    }
}
