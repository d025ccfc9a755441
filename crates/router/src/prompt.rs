//! Prompt assembly for the Tier-3 selector.
//!
//! Candidate summaries are bounded: a scenario with fifty triggers
//! still contributes a fixed-size block, keeping prompt cost flat as
//! templates grow.

use introute_core::scenario::Scenario;

/// Caps applied to each candidate summary.
const MAX_TRIGGERS: usize = 5;
const MAX_NEGATIVE_TRIGGERS: usize = 3;
const MAX_EXAMPLES: usize = 3;

/// The selection contract sent as the system prompt.
pub const SYSTEM_PROMPT: &str = r#"You classify a caller's utterance against a fixed list of scenarios.

Rules:
- Pick the single best-matching scenario id from the candidate list, or null if none applies.
- Never invent scenario ids. Never write reply text for the caller.
- Respond with strict JSON only, no markdown, matching exactly:
  {"scenario_id": "<id or null>", "confidence": <0.0-1.0>, "reason": "<one sentence>", "patterns": []}
- Optionally include reusable linguistic patterns you noticed, each as one of:
  {"type": "synonym", "technical": "...", "colloquial": "...", "confidence": <0.0-1.0>}
  {"type": "filler", "word": "...", "confidence": <0.0-1.0>}
  {"type": "keyword", "scenario_id": "...", "word": "...", "confidence": <0.0-1.0>}
  {"type": "negative_keyword", "scenario_id": "...", "word": "...", "confidence": <0.0-1.0>}"#;

fn capped_list(label: &str, items: &[String], cap: usize, out: &mut String) {
    if items.is_empty() {
        return;
    }
    out.push_str("  ");
    out.push_str(label);
    out.push_str(": ");
    let shown: Vec<&str> = items.iter().take(cap).map(String::as_str).collect();
    out.push_str(&shown.join(" | "));
    out.push('\n');
}

/// Render one bounded candidate block.
pub fn summarize_scenario(scenario: &Scenario) -> String {
    let mut out = format!("- id: {}\n  name: {}\n", scenario.id, scenario.name);
    capped_list("triggers", &scenario.triggers, MAX_TRIGGERS, &mut out);
    capped_list(
        "not",
        &scenario.negative_triggers,
        MAX_NEGATIVE_TRIGGERS,
        &mut out,
    );
    capped_list("examples", &scenario.examples, MAX_EXAMPLES, &mut out);
    out
}

/// Build the user prompt: utterance plus all candidate summaries.
pub fn build_user_prompt(utterance: &str, candidates: &[&Scenario]) -> String {
    let mut out = String::with_capacity(256 + candidates.len() * 128);
    out.push_str("Caller utterance:\n\"");
    out.push_str(utterance);
    out.push_str("\"\n\nCandidate scenarios:\n");
    for scenario in candidates {
        out.push_str(&summarize_scenario(scenario));
    }
    out
}
