//! Scores every compatible pattern against a match context and intent, and
//! assembles a recommendation plus ranked alternatives (spec §4.K).

use crate::contracts::Row;
use crate::errors::DolexError;
use crate::model::DataColumn;
use crate::pattern::context::{build_context, PatternMatchContext};
use crate::pattern::intent::parse_intent;
use crate::pattern::registry::{all, find, Category};
use crate::pattern::spec::VisualizationSpec;

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub pattern_id: String,
    pub category: String,
    pub title: String,
    pub reasoning: String,
    pub spec: VisualizationSpec,
}

#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub force_pattern: Option<String>,
    pub filter_categories: Option<Vec<Category>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub max_alternatives: usize,
}

#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub recommended: Recommendation,
    pub alternatives: Vec<Recommendation>,
    pub context: PatternMatchContext,
}

struct Scored {
    id: &'static str,
    category: Category,
    score: i32,
    intent_match: bool,
}

/// Select a visualization pattern for `rows`/`columns` given a natural
/// language `intent` and optional forcing/filtering (spec §4.K). Never
/// fails to produce a recommendation as long as at least one registered
/// pattern is compatible — `bar`'s requirements are permissive enough to
/// always qualify, so this mirrors `quickRecommend`'s "never throws" rule.
pub fn select_pattern(
    rows: &[Row],
    columns: &[DataColumn],
    intent: &str,
    options: &SelectOptions,
) -> Result<SelectionOutcome, DolexError> {
    let ctx = build_context(rows, columns, intent);
    let intent_result = parse_intent(intent);

    let mut candidates: Vec<_> = all()
        .into_iter()
        .filter(|p| options.filter_categories.as_ref().map(|cats| cats.contains(&p.category)).unwrap_or(true))
        .filter(|p| options.exclude_patterns.as_ref().map(|ids| !ids.contains(&p.id.to_string())).unwrap_or(true))
        .filter(|p| p.data_requirements.is_satisfied_by(&ctx, columns))
        .collect();

    if let Some(forced_id) = &options.force_pattern {
        if let Some(pattern) = find(forced_id) {
            if let Ok(forced_spec) = (pattern.generate_spec)(rows, columns, &ctx) {
                let recommended = Recommendation {
                    pattern_id: pattern.id.to_string(),
                    category: pattern.category.as_str().to_string(),
                    title: pattern.name.to_string(),
                    reasoning: format!("forced to \"{}\" by caller request", pattern.id),
                    spec: forced_spec,
                };
                let alternatives = rank_alternatives(&mut candidates, &ctx, &intent_result.primary, &recommended.pattern_id, options.max_alternatives);
                return Ok(SelectionOutcome { recommended, alternatives, context: ctx });
            }
        }
        // Forced pattern missing or its generator failed: fall back to normal
        // scoring but note the fallback in the recommendation's reasoning.
        let mut fallback = recommend(&mut candidates, rows, columns, &ctx, &intent_result.primary)?;
        fallback.reasoning = format!("forced pattern \"{forced_id}\" was unavailable; {}", fallback.reasoning);
        let alternatives = rank_alternatives(&mut candidates, &ctx, &intent_result.primary, &fallback.pattern_id, options.max_alternatives);
        return Ok(SelectionOutcome { recommended: fallback, alternatives, context: ctx });
    }

    let recommended = recommend(&mut candidates, rows, columns, &ctx, &intent_result.primary)?;
    let alternatives = rank_alternatives(&mut candidates, &ctx, &intent_result.primary, &recommended.pattern_id, options.max_alternatives);
    Ok(SelectionOutcome { recommended, alternatives, context: ctx })
}

fn recommend(
    candidates: &mut Vec<crate::pattern::registry::Pattern>,
    rows: &[Row],
    columns: &[DataColumn],
    ctx: &PatternMatchContext,
    primary_intent: &str,
) -> Result<Recommendation, DolexError> {
    let mut ranked = rank(candidates, ctx, primary_intent);
    ranked.sort_by(tie_break);
    let winner = ranked.first().ok_or_else(|| DolexError::backend("no compatible visualization pattern for this data"))?;

    let idx = candidates.iter().position(|p| p.id == winner.id).expect("winner came from candidates");
    let pattern = &candidates[idx];
    let spec = (pattern.generate_spec)(rows, columns, ctx).map_err(|e| DolexError::backend(e.to_string()))?;

    let mut reasons = Vec::new();
    if winner.intent_match {
        reasons.push(format!("matches the detected \"{primary_intent}\" intent"));
    }
    for rule in pattern.selection_rules.iter().filter(|r| (r.matches)(ctx)) {
        reasons.push(rule.description.to_string());
    }
    let reasoning = if reasons.is_empty() {
        format!("best available match for {} rows, {} numeric and {} categorical columns", ctx.row_count, ctx.numeric_count, ctx.categorical_count)
    } else {
        reasons.join("; ")
    };

    Ok(Recommendation {
        pattern_id: pattern.id.to_string(),
        category: pattern.category.as_str().to_string(),
        title: pattern.name.to_string(),
        reasoning,
        spec,
    })
}

fn rank_alternatives(
    candidates: &mut Vec<crate::pattern::registry::Pattern>,
    ctx: &PatternMatchContext,
    primary_intent: &str,
    exclude_id: &str,
    max_alternatives: usize,
) -> Vec<Recommendation> {
    let mut ranked = rank(candidates, ctx, primary_intent);
    ranked.sort_by(tie_break);

    let max_alternatives = if max_alternatives == 0 { 3 } else { max_alternatives };
    let mut alternatives = Vec::new();
    for scored in ranked.into_iter().filter(|s| s.id != exclude_id && s.score > 0) {
        if alternatives.len() >= max_alternatives {
            break;
        }
        let idx = candidates.iter().position(|p| p.id == scored.id).unwrap();
        let pattern = &candidates[idx];
        // Alternatives use placeholder rows (empty) since only the
        // recommendation's spec needs a fully populated data payload; the
        // caller re-requests a full spec via `forcePattern` if they switch.
        if let Ok(spec) = (pattern.generate_spec)(&[], &[], ctx) {
            alternatives.push(Recommendation {
                pattern_id: pattern.id.to_string(),
                category: pattern.category.as_str().to_string(),
                title: pattern.name.to_string(),
                reasoning: format!("score {}", scored.score),
                spec,
            });
        }
    }
    alternatives
}

fn rank(candidates: &[crate::pattern::registry::Pattern], ctx: &PatternMatchContext, primary_intent: &str) -> Vec<Scored> {
    candidates
        .iter()
        .map(|p| {
            let intent_match = p.category.as_str() == primary_intent;
            let bias = if intent_match { 2 } else { 0 };
            Scored { id: p.id, category: p.category, score: p.base_score(ctx) + bias, intent_match }
        })
        .collect()
}

/// (1) higher category-intent match, (2) lower category order index, (3)
/// alphabetical pattern ID — spec §4.K "Ties are broken by".
fn tie_break(a: &Scored, b: &Scored) -> std::cmp::Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.intent_match.cmp(&a.intent_match))
        .then_with(|| a.category.order_index().cmp(&b.category.order_index()))
        .then_with(|| a.id.cmp(b.id))
}
