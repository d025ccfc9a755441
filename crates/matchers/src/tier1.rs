//! Tier 1 — deterministic rule/keyword matching.
//!
//! Cheapest and fastest tier: trigger phrase containment with a
//! keyword-overlap fallback, negative-trigger veto, and per-scenario
//! minimum-confidence overrides. Zero marginal cost, so every learned
//! synonym that lets an utterance resolve here is a direct saving.

use introute_core::routing::TierMatch;
use introute_core::scenario::{Scenario, Template};
use tracing::trace;

use crate::text;

/// Deterministic rule matcher over the template's scenario pool.
#[derive(Debug, Default)]
pub struct Tier1Matcher;

impl Tier1Matcher {
    pub fn new() -> Self {
        Self
    }

    /// Find the best rule match, if any scenario scores above zero.
    ///
    /// Threshold comparison against `tier1_threshold` is the
    /// orchestrator's job; this returns the raw best candidate so the
    /// monitor can evaluate near-misses after escalation.
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
        // Negative triggers veto the scenario outright.
        for negative in &scenario.negative_triggers {
            let neg_tokens = text::prepare(negative, &template.synonyms, &template.fillers);
            if !neg_tokens.is_empty() && text::contains_phrase(tokens, &neg_tokens) {
                trace!(scenario = %scenario.id, trigger = %negative, "Negative trigger veto");
                return None;
            }
        }

        let mut best_score = 0.0f32;
        let mut best_trigger = "";
        for trigger in &scenario.triggers {
            let trig_tokens = text::prepare(trigger, &template.synonyms, &template.fillers);
            if trig_tokens.is_empty() {
                continue;
            }
            let score = if text::contains_phrase(tokens, &trig_tokens) {
                // Full phrase hit. Longer triggers are stronger evidence.
                (0.85 + 0.05 * trig_tokens.len() as f32).min(1.0)
            } else {
                // Partial: fraction of trigger tokens present anywhere.
                let hit = trig_tokens.iter().filter(|t| tokens.contains(t)).count();
                0.7 * hit as f32 / trig_tokens.len() as f32
            };
            if score > best_score {
                best_score = score;
                best_trigger = trigger;
            }
        }

        if best_score <= 0.0 {
            return None;
        }
        if let Some(min) = scenario.min_confidence {
            if best_score < min {
                trace!(
                    scenario = %scenario.id,
                    score = best_score,
                    min,
                    "Below per-scenario confidence override"
                );
                return None;
            }
        }

        Some(TierMatch {
            scenario_id: scenario.id.clone(),
            confidence: best_score.clamp(0.0, 1.0),
            rationale: format!("trigger '{best_trigger}' matched"),
        })
    }
}
