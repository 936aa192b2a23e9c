//! Scores a natural-language intent string against the six primary chart
//! intents by weighted keyword family (spec §4.K "Intent parser").

use indexmap::IndexMap;

pub const PRIMARY_INTENTS: [&str; 6] =
    ["comparison", "time", "distribution", "composition", "relationship", "flow"];

struct KeywordFamily {
    intent: &'static str,
    weight: i32,
    keywords: &'static [&'static str],
}

const FAMILIES: &[KeywordFamily] = &[
    KeywordFamily { intent: "comparison", weight: 2, keywords: &["compare", "comparison", "versus", " vs ", "rank", "ranking", "highest", "lowest", "top "] },
    KeywordFamily { intent: "comparison", weight: 1, keywords: &["by region", "by category", "each "] },
    KeywordFamily { intent: "time", weight: 2, keywords: &["trend", "over time", "time series", "timeline", "growth"] },
    KeywordFamily { intent: "time", weight: 1, keywords: &["monthly", "yearly", "daily", "weekly", "quarterly", "change"] },
    KeywordFamily { intent: "distribution", weight: 2, keywords: &["distribution", "spread", "histogram", "frequency"] },
    KeywordFamily { intent: "distribution", weight: 1, keywords: &["outlier", "variance", "range"] },
    KeywordFamily { intent: "composition", weight: 2, keywords: &["breakdown", "composition", "proportion", "share", "makeup"] },
    KeywordFamily { intent: "composition", weight: 1, keywords: &["percentage", "part of", "contribution"] },
    KeywordFamily { intent: "relationship", weight: 2, keywords: &["relationship", "correlation", "correlate"] },
    KeywordFamily { intent: "relationship", weight: 1, keywords: &["scatter", "between "] },
    KeywordFamily { intent: "flow", weight: 2, keywords: &["flow", "funnel", "pipeline", "journey"] },
    KeywordFamily { intent: "flow", weight: 1, keywords: &["transition", "conversion"] },
];

#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub primary: String,
    pub scores: IndexMap<String, i32>,
}

/// Lowercase `raw` and score each primary intent by its matching keyword
/// families, returning the top scorer (`"unknown"` if every score is ≤ 0)
/// alongside the full score map.
pub fn parse_intent(raw: &str) -> IntentResult {
    let lower = format!(" {} ", raw.to_lowercase());
    let mut scores: IndexMap<String, i32> = PRIMARY_INTENTS.iter().map(|s| (s.to_string(), 0)).collect();

    for family in FAMILIES {
        for keyword in family.keywords {
            if lower.contains(keyword) {
                *scores.get_mut(family.intent).unwrap() += family.weight;
            }
        }
    }

    let mut primary = "unknown".to_string();
    let mut best = 0;
    for (intent, score) in &scores {
        if *score > best {
            best = *score;
            primary = intent.clone();
        }
    }

    IntentResult { primary, scores }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_comparison_intent_highest_for_comparison_phrasing() {
        let result = parse_intent("compare sales by region");
        assert_eq!(result.primary, "comparison");
        assert!(result.scores["comparison"] > 0);
    }

    #[test]
    fn returns_unknown_when_no_family_matches() {
        let result = parse_intent("show me something neat");
        assert_eq!(result.primary, "unknown");
        assert!(result.scores.values().all(|s| *s == 0));
    }

    #[test]
    fn time_intent_wins_over_composition_for_trend_phrasing() {
        let result = parse_intent("trend over time, monthly growth");
        assert_eq!(result.primary, "time");
    }
}
