//! The structured query shape tool handlers accept for `query_dsl` /
//! `visualize_from_source` — not free-form SQL.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinOn {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub table: String,
    pub on: JoinOn,
    #[serde(default = "default_join_type")]
    pub r#type: JoinType,
}

fn default_join_type() -> JoinType {
    JoinType::Inner
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    Median,
    Stddev,
    P25,
    P75,
    Percentile,
}

impl Aggregate {
    /// Whether SQLite can compute this natively; the rest need in-process
    /// completion (no `percentile_cont`/`stddev_samp` in SQLite).
    pub fn is_pushdown_safe(self) -> bool {
        matches!(self, Aggregate::Sum | Aggregate::Avg | Aggregate::Min | Aggregate::Max | Aggregate::Count | Aggregate::CountDistinct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFn {
    Lag,
    Lead,
    Rank,
    DenseRank,
    RowNumber,
    RunningSum,
    RunningAvg,
    PctOfTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectItem {
    Field(String),
    Aggregate {
        field: String,
        aggregate: Aggregate,
        r#as: String,
        percentile: Option<f64>,
    },
    Window {
        window: WindowFn,
        field: Option<String>,
        r#as: String,
        #[serde(rename = "partitionBy")]
        partition_by: Option<String>,
        #[serde(rename = "orderBy")]
        order_by: Option<String>,
        offset: Option<i64>,
        default: Option<serde_json::Value>,
    },
}

impl SelectItem {
    pub fn output_name(&self) -> &str {
        match self {
            SelectItem::Field(f) => f,
            SelectItem::Aggregate { r#as, .. } => r#as,
            SelectItem::Window { r#as, .. } => r#as,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupByItem {
    Field(String),
    Bucket { field: String, bucket: TimeBucket },
}

impl GroupByItem {
    pub fn field(&self) -> &str {
        match self {
            GroupByItem::Field(f) => f,
            GroupByItem::Bucket { field, .. } => field,
        }
    }
}

pub use crate::expr::evaluator::FilterOp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOpWire,
    pub value: Option<serde_json::Value>,
}

/// The wire-level operator vocabulary (spec §6), separate from the
/// evaluator's internal `FilterOp` so `like` can be accepted here and
/// translated before reaching shared filter-matching code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOpWire {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    In,
    NotIn,
    Between,
    Like,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DslQuery {
    #[serde(default)]
    pub join: Vec<Join>,
    pub select: Vec<SelectItem>,
    #[serde(default, rename = "groupBy")]
    pub group_by: Vec<GroupByItem>,
    #[serde(default)]
    pub filter: Vec<FilterClause>,
    #[serde(default)]
    pub having: Vec<FilterClause>,
    #[serde(default, rename = "orderBy")]
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}
