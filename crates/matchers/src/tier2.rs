//! Tier 2 — statistical lexical similarity.
//!
//! No external calls: token-set similarity between the utterance and
//! each scenario's example utterances (triggers count as short
//! examples). Negative examples veto a scenario when they resemble the
//! utterance more than the best positive example does.

use introute_core::routing::TierMatch;
use introute_core::scenario::{Scenario, Template};

use crate::text;

/// Triggers are usually terser than examples; give examples more weight.
const TRIGGER_WEIGHT: f32 = 0.85;

/// Lexical-similarity matcher over the template's scenario pool.
#[derive(Debug, Default)]
pub struct Tier2Matcher;

impl Tier2Matcher {
    pub fn new() -> Self {
        Self
    }

    /// Find the most lexically similar scenario, if any scores above zero.
    pub fn matches(&self, utterance: &str, template: &Template) -> Option<TierMatch> {
        let tokens = text::prepare(utterance, &template.synonyms, &template.fillers);
        if tokens.is_empty() {
            return None;
        }

        let mut best: Option<TierMatch> = None;
        for scenario in template.active_scenarios() {
            let Some(candidate) = self.score_scenario(&tokens, scenario, template) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| candidate.confidence > b.confidence) {
                best = Some(candidate);
            }
        }
        best
    }

    fn score_scenario(
        &self,
        tokens: &[String],
        scenario: &Scenario,
        template: &Template,
    ) -> Option<TierMatch> {
        let prep = |s: &str| text::prepare(s, &template.synonyms, &template.fillers);

        let mut best_score = 0.0f32;
        let mut best_example = "";
        for example in &scenario.examples {
            let score = text::jaccard(tokens, &prep(example));
            if score > best_score {
                best_score = score;
                best_example = example;
            }
        }
        for trigger in &scenario.triggers {
            let score = TRIGGER_WEIGHT * text::jaccard(tokens, &prep(trigger));
            if score > best_score {
                best_score = score;
                best_example = trigger;
            }
        }

        if best_score <= 0.0 {
            return None;
        }

        // A closer counter-example outweighs the positive evidence.
        for negative in &scenario.negative_examples {
            if text::jaccard(tokens, &prep(negative)) >= best_score {
                return None;
            }
        }

        if let Some(min) = scenario.min_confidence {
            if best_score < min {
                return None;
            }
        }

        Some(TierMatch {
            scenario_id: scenario.id.clone(),
            confidence: best_score.clamp(0.0, 1.0),
            rationale: format!("lexically similar to '{best_example}'"),
        })
    }
}
