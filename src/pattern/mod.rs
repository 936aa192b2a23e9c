//! Pattern Registry & Selector (spec §4.K): a table of visualization
//! patterns, each scored against a data-shape match context and a
//! natural-language intent, producing a recommendation plus ranked
//! alternatives bundled as fully populated `VisualizationSpec`s.

pub mod context;
pub mod generators;
pub mod intent;
pub mod registry;
pub mod selector;

pub use context::{build_context, PatternMatchContext};
pub use intent::{parse_intent, IntentResult};
pub use registry::{Category, DataRequirements, Pattern};
pub use selector::{select_pattern, Recommendation, SelectOptions, SelectionOutcome};
pub use spec::{Encoding, VisualizationSpec};

pub mod spec;

/// All registered pattern IDs and their category/description, for the
/// `list_patterns` tool.
pub fn list_patterns() -> Vec<(String, String, String)> {
    registry::all().into_iter().map(|p| (p.id.to_string(), p.category.as_str().to_string(), p.description.to_string())).collect()
}
