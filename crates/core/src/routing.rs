//! Routing results and per-call context.
//!
//! A `RoutingResult` is produced exactly once per resolve call and is
//! never persisted by the engine itself — it is handed to the monitor
//! and to external logging.

use serde::{Deserialize, Serialize};

/// The matching tier that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Deterministic rule/keyword matching. Zero marginal cost.
    Rule,
    /// Statistical lexical similarity. Local compute only.
    Lexical,
    /// External language-model selection. Costs money.
    Model,
}

impl Tier {
    /// Numeric tier (1/2/3) for logs and alerts.
    pub fn number(self) -> u8 {
        match self {
            Self::Rule => 1,
            Self::Lexical => 2,
            Self::Model => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rule => write!(f, "tier1_rule"),
            Self::Lexical => write!(f, "tier2_lexical"),
            Self::Model => write!(f, "tier3_model"),
        }
    }
}

/// A candidate match reported by Tier 1 or Tier 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMatch {
    pub scenario_id: String,
    pub confidence: f32,
    pub rationale: String,
}

/// Latency and spend breakdown for one resolve call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier1_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier2_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier3_ms: Option<u64>,
    #[serde(default)]
    pub total_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Tier-3 spend in USD; 0.0 for Tier 1/2 resolutions.
    #[serde(default)]
    pub cost_usd: f64,
}

impl Performance {
    /// Latency recorded for a specific tier, if that tier ran.
    pub fn tier_ms(&self, tier: Tier) -> Option<u64> {
        match tier {
            Tier::Rule => self.tier1_ms,
            Tier::Lexical => self.tier2_ms,
            Tier::Model => self.tier3_ms,
        }
    }
}

/// The outcome of one resolve call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResult {
    /// False only for unrecoverable tier-3 failures (timeout, transport,
    /// malformed payload). A provider explicitly declining is a success.
    pub success: bool,

    pub matched: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,

    /// Always within [0, 1].
    pub confidence: f32,

    pub tier: Tier,

    /// Free-text explanation of how the decision was reached.
    pub rationale: String,

    #[serde(default)]
    pub performance: Performance,
}

impl RoutingResult {
    /// A successful match at the given tier.
    pub fn matched(tier: Tier, m: TierMatch) -> Self {
        Self {
            success: true,
            matched: true,
            scenario_id: Some(m.scenario_id),
            confidence: m.confidence.clamp(0.0, 1.0),
            tier,
            rationale: m.rationale,
            performance: Performance::default(),
        }
    }

    /// A successful "no scenario applies" outcome.
    pub fn no_match(tier: Tier, rationale: impl Into<String>) -> Self {
        Self {
            success: true,
            matched: false,
            scenario_id: None,
            confidence: 0.0,
            tier,
            rationale: rationale.into(),
            performance: Performance::default(),
        }
    }

    /// A recoverable failure. The caller-facing effect is "no match";
    /// the failure reason goes to the monitor, never up the call stack.
    pub fn failure(tier: Tier, rationale: impl Into<String>) -> Self {
        Self {
            success: false,
            matched: false,
            scenario_id: None,
            confidence: 0.0,
            tier,
            rationale: rationale.into(),
            performance: Performance::default(),
        }
    }

    /// Attach a performance breakdown.
    pub fn with_performance(mut self, performance: Performance) -> Self {
        self.performance = performance;
        self
    }
}

/// Per-call context threaded through the tiers and the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    pub call_id: String,
    pub template_id: String,

    /// Upstream speech-to-text confidence in percent, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_confidence: Option<f32>,

    /// Reference to the call audio for optional re-transcription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
}

impl CallContext {
    pub fn new(call_id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            template_id: template_id.into(),
            transcription_confidence: None,
            audio_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_numbers_and_display() {
        assert_eq!(Tier::Rule.number(), 1);
        assert_eq!(Tier::Lexical.number(), 2);
        assert_eq!(Tier::Model.number(), 3);
        assert_eq!(Tier::Model.to_string(), "tier3_model");
    }

    #[test]
    fn matched_clamps_confidence() {
        let r = RoutingResult::matched(
            Tier::Model,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 1.7,
                rationale: "provider over-reported".into(),
            },
        );
        assert!((r.confidence - 1.0).abs() < f32::EPSILON);
        assert!(r.matched);
        assert!(r.success);
    }

    #[test]
    fn failure_is_no_match_with_zero_confidence() {
        let r = RoutingResult::failure(Tier::Model, "provider timeout");
        assert!(!r.success);
        assert!(!r.matched);
        assert_eq!(r.scenario_id, None);
        assert!((r.confidence - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn performance_tier_lookup() {
        let perf = Performance {
            tier1_ms: Some(3),
            tier2_ms: Some(40),
            tier3_ms: None,
            total_ms: 43,
            ..Default::default()
        };
        assert_eq!(perf.tier_ms(Tier::Rule), Some(3));
        assert_eq!(perf.tier_ms(Tier::Model), None);
    }

    #[test]
    fn routing_result_serialization_roundtrip() {
        let r = RoutingResult::no_match(Tier::Lexical, "below threshold");
        let json = serde_json::to_string(&r).unwrap();
        let back: RoutingResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tier, Tier::Lexical);
        assert!(!back.matched);
    }
}
