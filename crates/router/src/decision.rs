//! Validation of the provider's routing decision.
//!
//! The parsed response is an untrusted, loosely-typed value: every
//! field is coerced and range-checked before it enters the rest of the
//! system. Confidence is clamped, ids are checked against the
//! candidate allow-list, and patterns are dropped individually when
//! malformed.

use introute_core::pattern::Pattern;
use introute_core::scenario::Scenario;
use serde::Deserialize;
use tracing::{debug, warn};

/// Below this confidence a returned id is treated as "no match".
pub const CONFIDENCE_FLOOR: f32 = 0.4;

/// The raw decision shape, tolerant of provider casing quirks.
#[derive(Debug, Deserialize)]
pub struct RawDecision {
    #[serde(default, alias = "scenarioId")]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "rationale")]
    pub reason: String,
    #[serde(default)]
    pub patterns: Vec<serde_json::Value>,
}

/// A decision that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Match { scenario_id: String, confidence: f32 },
    /// The provider declined, returned an unknown id, or fell below the
    /// confidence floor. Still a success.
    NoMatch,
}

/// Outcome of validating one raw decision.
#[derive(Debug)]
pub struct ValidatedDecision {
    pub verdict: Verdict,
    pub reason: String,
    pub patterns: Vec<Pattern>,
    /// Set when the provider returned an id outside the candidate set.
    pub hallucinated_id: Option<String>,
}

/// Strip a wrapping markdown code fence, if present.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse raw provider content into a decision, or None if malformed.
pub fn parse(content: &str) -> Option<RawDecision> {
    serde_json::from_str(strip_fences(content)).ok()
}

/// Validate a raw decision against the candidate allow-list.
pub fn validate(raw: RawDecision, candidates: &[&Scenario]) -> ValidatedDecision {
    let confidence = (raw.confidence as f32).clamp(0.0, 1.0);
    let patterns = parse_patterns(&raw.patterns);

    let mut hallucinated_id = None;
    let verdict = match raw.scenario_id {
        None => Verdict::NoMatch,
        Some(id) => {
            if !candidates.iter().any(|s| s.id == id) {
                warn!(scenario_id = %id, "Provider returned id outside candidate set");
                hallucinated_id = Some(id);
                Verdict::NoMatch
            } else if confidence < CONFIDENCE_FLOOR {
                debug!(
                    scenario_id = %id,
                    confidence,
                    floor = CONFIDENCE_FLOOR,
                    "Decision below confidence floor"
                );
                Verdict::NoMatch
            } else {
                Verdict::Match {
                    scenario_id: id,
                    confidence,
                }
            }
        }
    };

    ValidatedDecision {
        verdict,
        reason: raw.reason,
        patterns,
        hallucinated_id,
    }
}

/// Parse the optional patterns array, dropping invalid entries.
fn parse_patterns(values: &[serde_json::Value]) -> Vec<Pattern> {
    values
        .iter()
        .filter_map(|v| match serde_json::from_value::<Pattern>(v.clone()) {
            Ok(p) => match p.validate() {
                Ok(()) => Some(p),
                Err(reason) => {
                    debug!(%reason, "Dropping invalid extracted pattern");
                    None
                }
            },
            Err(e) => {
                debug!(error = %e, "Dropping unparseable extracted pattern");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use introute_core::pattern::PatternKind;

    fn candidates() -> Vec<Scenario> {
        vec![Scenario::new("sc_42", "Book"), Scenario::new("sc_7", "Cancel")]
    }

    fn validate_content(content: &str) -> ValidatedDecision {
        let owned = candidates();
        let refs: Vec<&Scenario> = owned.iter().collect();
        validate(parse(content).expect("parse"), &refs)
    }

    #[test]
    fn clean_match() {
        let d = validate_content(r#"{"scenario_id":"sc_42","confidence":0.85,"reason":"clear booking intent"}"#);
        assert_eq!(
            d.verdict,
            Verdict::Match {
                scenario_id: "sc_42".into(),
                confidence: 0.85
            }
        );
        assert!(d.hallucinated_id.is_none());
    }

    #[test]
    fn confidence_above_one_is_clamped() {
        let d = validate_content(r#"{"scenario_id":"sc_42","confidence":1.7,"reason":"x"}"#);
        match d.verdict {
            Verdict::Match { confidence, .. } => assert!((confidence - 1.0).abs() < f32::EPSILON),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn null_id_is_successful_no_match() {
        let d = validate_content(r#"{"scenario_id":null,"confidence":0.9,"reason":"out of domain"}"#);
        assert_eq!(d.verdict, Verdict::NoMatch);
        assert!(d.hallucinated_id.is_none());
    }

    #[test]
    fn unknown_id_is_flagged_no_match() {
        let d = validate_content(r#"{"scenario_id":"sc_999","confidence":0.95,"reason":"x"}"#);
        assert_eq!(d.verdict, Verdict::NoMatch);
        assert_eq!(d.hallucinated_id.as_deref(), Some("sc_999"));
    }

    #[test]
    fn below_floor_is_no_match() {
        let d = validate_content(r#"{"scenario_id":"sc_42","confidence":0.3,"reason":"weak"}"#);
        assert_eq!(d.verdict, Verdict::NoMatch);
    }

    #[test]
    fn camel_case_alias_accepted() {
        let d = validate_content(r#"{"scenarioId":"sc_7","confidence":0.8,"reason":"x"}"#);
        assert!(matches!(d.verdict, Verdict::Match { ref scenario_id, .. } if scenario_id == "sc_7"));
    }

    #[test]
    fn code_fence_is_stripped() {
        let content = "```json\n{\"scenario_id\":\"sc_42\",\"confidence\":0.8,\"reason\":\"x\"}\n```";
        let d = validate_content(content);
        assert!(matches!(d.verdict, Verdict::Match { .. }));
    }

    #[test]
    fn malformed_json_returns_none() {
        assert!(parse("not json at all").is_none());
        assert!(parse("{\"scenario_id\": ").is_none());
    }

    #[test]
    fn valid_patterns_survive_invalid_are_dropped() {
        let d = validate_content(
            r#"{"scenario_id":"sc_42","confidence":0.85,"reason":"x","patterns":[
                {"type":"synonym","technical":"gastroscopy","colloquial":"stomach check","confidence":0.9},
                {"type":"synonym","technical":"","colloquial":"bad","confidence":0.9},
                {"type":"unknown_kind","word":"x","confidence":0.9},
                {"type":"filler","word":"um","confidence":0.8}
            ]}"#,
        );
        assert_eq!(d.patterns.len(), 2);
        assert!(matches!(d.patterns[0].kind, PatternKind::Synonym { .. }));
        assert!(matches!(d.patterns[1].kind, PatternKind::Filler { .. }));
    }

    #[test]
    fn missing_fields_default() {
        let d = validate_content(r#"{"scenario_id":"sc_42"}"#);
        // confidence defaults to 0 → below floor → no match.
        assert_eq!(d.verdict, Verdict::NoMatch);
    }
}
