//! The pattern table (spec §4.K, §9 "Dynamic dispatch of patterns"): each
//! entry is a plain data value holding its requirements, scoring rules, and a
//! function pointer generator, registered by ID and iterated for scoring.
//!
//! The full source registry holds ~43 patterns; this implementation carries
//! a representative pattern per visualization family across all seven
//! categories (documented in the project's design notes) with the complete
//! compatibility/scoring/generation machinery. Adding further patterns is
//! purely additive: push another `Pattern` literal into `all()`.

use crate::contracts::Row;
use crate::model::DataColumn;
use crate::pattern::context::PatternMatchContext;
use crate::pattern::generators;
use crate::pattern::spec::VisualizationSpec;
use crate::types::SemanticType;
use anyhow::Result;
use std::str::FromStr;

/// Deterministic category order, matching spec §2's listing — used both as
/// the tie-break index and as the universe `filterCategories` draws from.
pub const CATEGORY_ORDER: [Category; 7] = [
    Category::Comparison,
    Category::Distribution,
    Category::Composition,
    Category::Time,
    Category::Relationship,
    Category::Flow,
    Category::Geo,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Comparison,
    Distribution,
    Composition,
    Time,
    Relationship,
    Flow,
    Geo,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Comparison => "comparison",
            Category::Distribution => "distribution",
            Category::Composition => "composition",
            Category::Time => "time",
            Category::Relationship => "relationship",
            Category::Flow => "flow",
            Category::Geo => "geo",
        }
    }

    /// Position in the deterministic category order, used as tie-break #2.
    pub fn order_index(&self) -> usize {
        CATEGORY_ORDER.iter().position(|c| c == self).unwrap()
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "comparison" => Ok(Category::Comparison),
            "distribution" => Ok(Category::Distribution),
            "composition" => Ok(Category::Composition),
            "time" => Ok(Category::Time),
            "relationship" => Ok(Category::Relationship),
            "flow" => Ok(Category::Flow),
            "geo" => Ok(Category::Geo),
            other => Err(anyhow::anyhow!("unknown pattern category: {other}")),
        }
    }
}

/// Minimum/maximum shape a pattern tolerates; `compatible` checks a candidate
/// context (and, for geo patterns, the raw columns) against these.
#[derive(Debug, Clone, Copy)]
pub struct DataRequirements {
    pub min_rows: usize,
    pub max_rows: usize,
    pub min_numeric: usize,
    pub min_categorical: usize,
    pub requires_time_series: bool,
    pub requires_geo: bool,
    pub min_categories: usize,
    pub max_categories: usize,
}

impl Default for DataRequirements {
    fn default() -> Self {
        Self {
            min_rows: 0,
            max_rows: usize::MAX,
            min_numeric: 0,
            min_categorical: 0,
            requires_time_series: false,
            requires_geo: false,
            min_categories: 0,
            max_categories: usize::MAX,
        }
    }
}

impl DataRequirements {
    /// Row-count within `[minRows, 2*maxRows]`; required column counts met;
    /// time-series/geo flags satisfied (spec §4.K "Compatibility filter").
    pub fn is_satisfied_by(&self, ctx: &PatternMatchContext, columns: &[DataColumn]) -> bool {
        if ctx.row_count < self.min_rows {
            return false;
        }
        if self.max_rows != usize::MAX && ctx.row_count > self.max_rows.saturating_mul(2) {
            return false;
        }
        if ctx.numeric_count < self.min_numeric || ctx.categorical_count < self.min_categorical {
            return false;
        }
        if self.requires_time_series && !ctx.has_time_series {
            return false;
        }
        if self.requires_geo && !columns.iter().any(|c| crate::util::geo::looks_like_state_field(&c.name)) {
            return false;
        }
        if ctx.category_count > 0 && (ctx.category_count < self.min_categories || ctx.category_count > self.max_categories) {
            return false;
        }
        true
    }
}

pub struct SelectionRule {
    pub description: &'static str,
    pub weight: i32,
    pub matches: fn(&PatternMatchContext) -> bool,
}

pub struct Pattern {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub description: &'static str,
    pub best_for: &'static [&'static str],
    pub not_for: &'static [&'static str],
    pub data_requirements: DataRequirements,
    pub selection_rules: &'static [SelectionRule],
    pub generate_spec: fn(&[Row], &[DataColumn], &PatternMatchContext) -> Result<VisualizationSpec>,
}

impl Pattern {
    pub fn base_score(&self, ctx: &PatternMatchContext) -> i32 {
        self.selection_rules.iter().filter(|r| (r.matches)(ctx)).map(|r| r.weight).sum()
    }
}

macro_rules! rules {
    ($($desc:expr => $weight:expr, $f:expr);* $(;)?) => {
        &[$(SelectionRule { description: $desc, weight: $weight, matches: $f }),*]
    };
}

/// The registered patterns, in a fixed order so scoring ties resolve
/// deterministically before the alphabetical-ID tiebreak is even reached.
pub fn all() -> Vec<Pattern> {
    vec![
        Pattern {
            id: "bar",
            name: "Bar Chart",
            category: Category::Comparison,
            description: "Compares a numeric measure across a modest number of categories.",
            best_for: &["ranking categories", "comparing a handful of groups"],
            not_for: &["time series", "many categories"],
            data_requirements: DataRequirements { min_rows: 1, min_categorical: 1, min_numeric: 1, min_categories: 1, max_categories: 50, ..Default::default() },
            selection_rules: rules!(
                "few categories" => 3, |ctx| (1..=12).contains(&ctx.category_count);
                "no time series" => 1, |ctx| !ctx.has_time_series;
            ),
            generate_spec: generators::bar,
        },
        Pattern {
            id: "grouped_bar",
            name: "Grouped Bar Chart",
            category: Category::Comparison,
            description: "Compares a numeric measure across categories, split further by a series.",
            best_for: &["comparing groups across a second dimension"],
            not_for: &["a single series", "time series"],
            data_requirements: DataRequirements { min_categorical: 2, min_numeric: 1, min_categories: 1, max_categories: 30, ..Default::default() },
            selection_rules: rules!(
                "multiple series" => 3, |ctx| (2..=8).contains(&ctx.series_count);
            ),
            generate_spec: generators::grouped_bar,
        },
        Pattern {
            id: "bullet",
            name: "Bullet Chart",
            category: Category::Comparison,
            description: "Compares a measure against a target/threshold per category.",
            best_for: &["progress against a goal"],
            not_for: &["many categories"],
            data_requirements: DataRequirements { min_categorical: 1, min_numeric: 1, max_categories: 10, ..Default::default() },
            selection_rules: rules!("few categories" => 1, |ctx| ctx.category_count <= 10),
            generate_spec: generators::bullet,
        },
        Pattern {
            id: "histogram",
            name: "Histogram",
            category: Category::Distribution,
            description: "Shows the shape of a single numeric distribution via binned counts.",
            best_for: &["distribution shape", "spotting skew or outliers"],
            not_for: &["categorical comparisons"],
            data_requirements: DataRequirements { min_rows: 5, min_numeric: 1, ..Default::default() },
            selection_rules: rules!(
                "enough rows to bin" => 3, |ctx| ctx.row_count >= 30;
                "distribution intent" => 2, |ctx| ctx.intent == "distribution";
            ),
            generate_spec: generators::histogram,
        },
        Pattern {
            id: "box_plot",
            name: "Box Plot",
            category: Category::Distribution,
            description: "Summarizes a numeric distribution's quartiles and outliers per category.",
            best_for: &["comparing spread across groups"],
            not_for: &["single-value summaries"],
            data_requirements: DataRequirements { min_rows: 10, min_numeric: 1, min_categorical: 1, ..Default::default() },
            selection_rules: rules!("enough rows per group" => 2, |ctx| ctx.row_count >= 20),
            generate_spec: generators::box_plot,
        },
        Pattern {
            id: "violin",
            name: "Violin Plot",
            category: Category::Distribution,
            description: "Shows a smoothed density estimate of a numeric distribution per category.",
            best_for: &["detailed distribution shape per group"],
            not_for: &["small samples"],
            data_requirements: DataRequirements { min_rows: 20, min_numeric: 1, min_categorical: 1, ..Default::default() },
            selection_rules: rules!("plenty of rows" => 2, |ctx| ctx.row_count >= 50),
            generate_spec: generators::violin,
        },
        Pattern {
            id: "pie",
            name: "Pie Chart",
            category: Category::Composition,
            description: "Shows each category's share of a whole.",
            best_for: &["part-to-whole with few slices"],
            not_for: &["many categories", "negative values"],
            data_requirements: DataRequirements { min_categorical: 1, min_numeric: 1, min_categories: 2, max_categories: 8, ..Default::default() },
            selection_rules: rules!(
                "few categories" => 3, |ctx| (2..=6).contains(&ctx.category_count);
                "no negative values" => 1, |ctx| !ctx.has_negative;
                "composition intent" => 2, |ctx| ctx.intent == "composition";
            ),
            generate_spec: generators::pie,
        },
        Pattern {
            id: "stacked_bar",
            name: "Stacked Bar Chart",
            category: Category::Composition,
            description: "Shows composition across categories, stacked by a second dimension.",
            best_for: &["part-to-whole across many categories"],
            not_for: &["a single series"],
            data_requirements: DataRequirements { min_categorical: 2, min_numeric: 1, ..Default::default() },
            selection_rules: rules!("multiple series" => 2, |ctx| ctx.series_count >= 2),
            generate_spec: generators::stacked_bar,
        },
        Pattern {
            id: "treemap",
            name: "Treemap",
            category: Category::Composition,
            description: "Shows composition via nested, size-proportional rectangles.",
            best_for: &["many categories with wide size variance"],
            not_for: &["few categories", "negative values"],
            data_requirements: DataRequirements { min_categorical: 1, min_numeric: 1, min_categories: 3, ..Default::default() },
            selection_rules: rules!(
                "several categories" => 2, |ctx| ctx.category_count >= 3;
                "no negative values" => 1, |ctx| !ctx.has_negative;
            ),
            generate_spec: generators::treemap,
        },
        Pattern {
            id: "line",
            name: "Line Chart",
            category: Category::Time,
            description: "Shows a numeric measure's trend over time.",
            best_for: &["trends", "time series"],
            not_for: &["unordered categories"],
            data_requirements: DataRequirements { requires_time_series: true, min_numeric: 1, ..Default::default() },
            selection_rules: rules!(
                "time series detected" => 4, |ctx| ctx.has_time_series;
                "time intent" => 2, |ctx| ctx.intent == "time";
            ),
            generate_spec: generators::line,
        },
        Pattern {
            id: "area",
            name: "Area Chart",
            category: Category::Time,
            description: "Shows a cumulative or volume trend over time.",
            best_for: &["cumulative trends", "magnitude over time"],
            not_for: &["negative values"],
            data_requirements: DataRequirements { requires_time_series: true, min_numeric: 1, ..Default::default() },
            selection_rules: rules!(
                "time series detected" => 4, |ctx| ctx.has_time_series;
                "non-negative" => 1, |ctx| !ctx.has_negative;
            ),
            generate_spec: generators::area,
        },
        Pattern {
            id: "scatter",
            name: "Scatter Plot",
            category: Category::Relationship,
            description: "Shows the relationship between two numeric measures.",
            best_for: &["correlation", "clusters and outliers"],
            not_for: &["single numeric column"],
            data_requirements: DataRequirements { min_numeric: 2, ..Default::default() },
            selection_rules: rules!(
                "two or more numeric columns" => 3, |ctx| ctx.numeric_count >= 2;
                "relationship intent" => 2, |ctx| ctx.intent == "relationship";
            ),
            generate_spec: generators::scatter,
        },
        Pattern {
            id: "bubble",
            name: "Bubble Chart",
            category: Category::Relationship,
            description: "Shows the relationship between two numeric measures with a third encoded as size.",
            best_for: &["three-variable relationships"],
            not_for: &["fewer than three numeric columns"],
            data_requirements: DataRequirements { min_numeric: 3, ..Default::default() },
            selection_rules: rules!("three or more numeric columns" => 3, |ctx| ctx.numeric_count >= 3),
            generate_spec: generators::bubble,
        },
        Pattern {
            id: "sankey",
            name: "Sankey Diagram",
            category: Category::Flow,
            description: "Shows volume flowing between stages identified by two categorical columns.",
            best_for: &["funnels", "flows between states"],
            not_for: &["no categorical stages"],
            data_requirements: DataRequirements { min_categorical: 2, min_numeric: 1, ..Default::default() },
            selection_rules: rules!("flow intent" => 3, |ctx| ctx.intent == "flow"),
            generate_spec: generators::sankey,
        },
        Pattern {
            id: "choropleth",
            name: "Choropleth Map",
            category: Category::Geo,
            description: "Shades regions by a numeric measure.",
            best_for: &["geographic comparisons"],
            not_for: &["non-geographic data"],
            data_requirements: DataRequirements { requires_geo: true, min_numeric: 1, ..Default::default() },
            selection_rules: rules!("has geo field" => 1, |_ctx| true),
            generate_spec: generators::choropleth,
        },
        Pattern {
            id: "dot_map",
            name: "Dot Map",
            category: Category::Geo,
            description: "Plots individual points by region.",
            best_for: &["geographic point density"],
            not_for: &["non-geographic data"],
            data_requirements: DataRequirements { requires_geo: true, ..Default::default() },
            selection_rules: rules!("has geo field" => 1, |_ctx| true),
            generate_spec: generators::dot_map,
        },
    ]
}

pub fn find(id: &str) -> Option<Pattern> {
    all().into_iter().find(|p| p.id == id)
}

pub fn first_of_type(columns: &[DataColumn], ty: SemanticType) -> Option<&DataColumn> {
    columns.iter().find(|c| c.semantic_type == ty)
}

pub fn nth_of_type(columns: &[DataColumn], ty: SemanticType, n: usize) -> Option<&DataColumn> {
    columns.iter().filter(|c| c.semantic_type == ty).nth(n)
}
