//! The value a pattern's `generateSpec` produces and the spec store persists
//! (spec §3 `VisualizationSpec`). Consumed unchanged by external renderers.

use crate::contracts::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Axis/color/size bindings a renderer reads to lay out the chart. Fields are
/// column names (or `None` when the pattern has no use for that channel).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub x: Option<String>,
    pub y: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub series: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationSpec {
    pub pattern_id: String,
    pub title: String,
    pub data: Vec<Row>,
    pub encoding: Encoding,
    /// Pattern-specific configuration (axis formats, stacking mode, palette, …).
    pub config: Value,
}
