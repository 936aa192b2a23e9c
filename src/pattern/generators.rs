//! One `generateSpec` function per registered pattern (spec §4.K). Every
//! generator copies its inputs rather than mutating them (testable property
//! #3): the returned spec's `data` is a fresh `Vec<Row>`.

use crate::contracts::Row;
use crate::model::DataColumn;
use crate::pattern::context::PatternMatchContext;
use crate::pattern::registry::{first_of_type, nth_of_type};
use crate::pattern::spec::{Encoding, VisualizationSpec};
use crate::types::SemanticType;
use crate::util::geo::{expand_state_abbreviation, looks_like_state_field};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};

fn spec(id: &str, title: &str, data: Vec<Row>, encoding: Encoding, config: Value) -> VisualizationSpec {
    VisualizationSpec { pattern_id: id.to_string(), title: title.to_string(), data, encoding, config }
}

pub fn bar(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let y = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("bar", "Bar Chart", rows.to_vec(), Encoding { x, y, ..Default::default() }, json!({})))
}

pub fn grouped_bar(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let series = nth_of_type(columns, SemanticType::Categorical, 1).map(|c| c.name.clone());
    let y = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("grouped_bar", "Grouped Bar Chart", rows.to_vec(), Encoding { x, y, series, ..Default::default() }, json!({})))
}

pub fn bullet(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let y = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    let target = nth_of_type(columns, SemanticType::Numeric, 1).map(|c| c.name.clone());
    Ok(spec("bullet", "Bullet Chart", rows.to_vec(), Encoding { x, y, ..Default::default() }, json!({ "target": target })))
}

pub fn histogram(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("histogram", "Histogram", rows.to_vec(), Encoding { x, ..Default::default() }, json!({ "bins": 20 })))
}

pub fn box_plot(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let y = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("box_plot", "Box Plot", rows.to_vec(), Encoding { x, y, ..Default::default() }, json!({})))
}

pub fn violin(rows: &[Row], columns: &[DataColumn], ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let mut out = box_plot(rows, columns, ctx)?;
    out.pattern_id = "violin".to_string();
    out.title = "Violin Plot".to_string();
    Ok(out)
}

pub fn pie(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let color = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let size = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("pie", "Pie Chart", rows.to_vec(), Encoding { color, size, ..Default::default() }, json!({})))
}

pub fn stacked_bar(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let series = nth_of_type(columns, SemanticType::Categorical, 1).map(|c| c.name.clone());
    let y = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("stacked_bar", "Stacked Bar Chart", rows.to_vec(), Encoding { x, y, series, ..Default::default() }, json!({ "stacked": true })))
}

pub fn treemap(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let color = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let size = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("treemap", "Treemap", rows.to_vec(), Encoding { color, size, ..Default::default() }, json!({})))
}

pub fn line(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Date)
        .or_else(|| columns.iter().find(|c| crate::pattern::context::looks_time_like(&c.name)))
        .map(|c| c.name.clone());
    let y = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec("line", "Line Chart", rows.to_vec(), Encoding { x, y, ..Default::default() }, json!({})))
}

pub fn area(rows: &[Row], columns: &[DataColumn], ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let mut out = line(rows, columns, ctx)?;
    out.pattern_id = "area".to_string();
    out.title = "Area Chart".to_string();
    Ok(out)
}

pub fn scatter(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    let y = nth_of_type(columns, SemanticType::Numeric, 1).map(|c| c.name.clone());
    let color = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    Ok(spec("scatter", "Scatter Plot", rows.to_vec(), Encoding { x, y, color, ..Default::default() }, json!({})))
}

pub fn bubble(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let x = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    let y = nth_of_type(columns, SemanticType::Numeric, 1).map(|c| c.name.clone());
    let size = nth_of_type(columns, SemanticType::Numeric, 2).map(|c| c.name.clone());
    let color = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    Ok(spec("bubble", "Bubble Chart", rows.to_vec(), Encoding { x, y, size, color, ..Default::default() }, json!({})))
}

pub fn sankey(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let source = first_of_type(columns, SemanticType::Categorical).map(|c| c.name.clone());
    let target = nth_of_type(columns, SemanticType::Categorical, 1).map(|c| c.name.clone());
    let value = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    Ok(spec(
        "sankey",
        "Sankey Diagram",
        rows.to_vec(),
        Encoding::default(),
        json!({ "source": source, "target": target, "value": value }),
    ))
}

fn geo_field(columns: &[DataColumn]) -> Option<String> {
    columns.iter().find(|c| looks_like_state_field(&c.name)).map(|c| c.name.clone())
}

fn expand_geo_data(rows: &[Row], field: &str) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            let mut copy = row.clone();
            if let Some(Value::String(s)) = copy.get(field).cloned() {
                copy.insert(field.to_string(), Value::String(expand_state_abbreviation(&s)));
            }
            copy
        })
        .collect()
}

pub fn choropleth(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let field = geo_field(columns).ok_or_else(|| anyhow!("no geographic column found for choropleth"))?;
    let color = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    let data = expand_geo_data(rows, &field);
    Ok(spec("choropleth", "Choropleth Map", data, Encoding { x: Some(field), color, ..Default::default() }, json!({})))
}

pub fn dot_map(rows: &[Row], columns: &[DataColumn], _ctx: &PatternMatchContext) -> Result<VisualizationSpec> {
    let field = geo_field(columns).ok_or_else(|| anyhow!("no geographic column found for dot map"))?;
    let size = first_of_type(columns, SemanticType::Numeric).map(|c| c.name.clone());
    let data = expand_geo_data(rows, &field);
    Ok(spec("dot_map", "Dot Map", data, Encoding { x: Some(field), size, ..Default::default() }, json!({})))
}
