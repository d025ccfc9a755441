//! Scenarios, templates, and their tuning configuration.
//!
//! A `Template` is the unit every tier reads on a call: an ordered set
//! of categorized scenarios plus the learned synonym/filler vocabulary
//! and the thresholds, budget, and caps that govern escalation and
//! learning. Templates are mutated only through the idempotent
//! `add_*` operations so concurrent learners can merge safely.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::pattern::{Pattern, PatternKind};

/// A named trigger/response unit a caller's intent can be matched to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier within the template (e.g. "sc_42").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Free-form type tag (e.g. "booking", "faq", "handoff").
    #[serde(default)]
    pub scenario_type: String,

    /// Phrases that should trigger this scenario.
    #[serde(default)]
    pub triggers: Vec<String>,

    /// Phrases that veto this scenario even when a trigger hits.
    #[serde(default)]
    pub negative_triggers: Vec<String>,

    /// Example caller utterances for lexical matching.
    #[serde(default)]
    pub examples: Vec<String>,

    /// Counter-example utterances that should NOT match.
    #[serde(default)]
    pub negative_examples: Vec<String>,

    /// Per-scenario minimum-confidence override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f32>,

    /// Which response strategy the surrounding system should use.
    #[serde(default)]
    pub response_strategy: String,

    /// Inactive scenarios are skipped by every tier.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Scenario {
    /// Create a minimal active scenario.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scenario_type: String::new(),
            triggers: Vec::new(),
            negative_triggers: Vec::new(),
            examples: Vec::new(),
            negative_examples: Vec::new(),
            min_confidence: None,
            response_strategy: String::new(),
            active: true,
        }
    }

    /// Builder-style trigger addition.
    pub fn with_triggers(mut self, triggers: &[&str]) -> Self {
        self.triggers = triggers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder-style example addition.
    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// An ordered, named group of scenarios inside a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCategory {
    pub name: String,
    pub scenarios: Vec<Scenario>,
}

/// Per-template tuning configuration read by the engine on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// Tier 1 accepts a match at or above this confidence.
    #[serde(default = "default_tier1_threshold")]
    pub tier1_threshold: f32,

    /// Tier 2 accepts at or above this confidence. Must be < tier1.
    #[serde(default = "default_tier2_threshold")]
    pub tier2_threshold: f32,

    /// Patterns at or above this confidence are applied automatically.
    #[serde(default = "default_auto_apply_floor")]
    pub auto_apply_floor: f32,

    /// Patterns at or above this (but below auto-apply) become suggestions.
    #[serde(default = "default_suggestion_floor")]
    pub suggestion_floor: f32,

    /// Suggestion dedup window in seconds (default 24h).
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Latency ceilings per tier in milliseconds: [tier1, tier2, tier3].
    #[serde(default = "default_latency_ceilings")]
    pub tier_latency_ceilings_ms: [u64; 3],

    /// A single Tier-3 call costing more than this raises a warning.
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling_per_call_usd: f64,

    /// Cooldown between repeats of the same alert key, in seconds.
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,

    /// At most this many extracted patterns are processed per call.
    #[serde(default = "default_max_patterns_per_call")]
    pub max_patterns_per_call: usize,

    /// At most this many auto-applications per rolling hour.
    #[serde(default = "default_max_auto_apply_per_hour")]
    pub max_auto_apply_per_hour: usize,
}

fn default_tier1_threshold() -> f32 {
    0.80
}
fn default_tier2_threshold() -> f32 {
    0.60
}
fn default_auto_apply_floor() -> f32 {
    0.75
}
fn default_suggestion_floor() -> f32 {
    0.60
}
fn default_dedup_window_secs() -> u64 {
    24 * 3600
}
fn default_latency_ceilings() -> [u64; 3] {
    [500, 2_000, 10_000]
}
fn default_cost_ceiling() -> f64 {
    0.05
}
fn default_alert_cooldown_secs() -> u64 {
    5 * 60
}
fn default_max_patterns_per_call() -> usize {
    5
}
fn default_max_auto_apply_per_hour() -> usize {
    10
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            tier1_threshold: default_tier1_threshold(),
            tier2_threshold: default_tier2_threshold(),
            auto_apply_floor: default_auto_apply_floor(),
            suggestion_floor: default_suggestion_floor(),
            dedup_window_secs: default_dedup_window_secs(),
            tier_latency_ceilings_ms: default_latency_ceilings(),
            cost_ceiling_per_call_usd: default_cost_ceiling(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            max_patterns_per_call: default_max_patterns_per_call(),
            max_auto_apply_per_hour: default_max_auto_apply_per_hour(),
        }
    }
}

/// Monthly Tier-3 spend tracking for one template.
///
/// Spend resets lazily: the first operation observed in a new month
/// zeroes the accumulator before applying.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BudgetState {
    /// Monthly budget in USD. 0.0 means unlimited.
    #[serde(default)]
    pub monthly_budget_usd: f64,

    /// Spend accumulated in the current accounting month.
    #[serde(default)]
    pub current_spend_usd: f64,

    /// Accounting month as (year * 100 + month), e.g. 202608.
    #[serde(default)]
    pub month: u32,
}

impl BudgetState {
    /// Create a budget with a monthly cap.
    pub fn with_monthly(budget_usd: f64) -> Self {
        Self {
            monthly_budget_usd: budget_usd,
            current_spend_usd: 0.0,
            month: 0,
        }
    }

    fn month_key(now: DateTime<Utc>) -> u32 {
        now.year() as u32 * 100 + now.month()
    }

    /// Reset spend if the accounting month has rolled over.
    pub fn roll_if_new_month(&mut self, now: DateTime<Utc>) {
        let key = Self::month_key(now);
        if self.month != key {
            self.month = key;
            self.current_spend_usd = 0.0;
        }
    }

    /// Add spend for the current month.
    pub fn record_spend(&mut self, cost_usd: f64, now: DateTime<Utc>) {
        self.roll_if_new_month(now);
        self.current_spend_usd += cost_usd;
    }

    /// Fraction of budget spent, or 0.0 when unlimited.
    pub fn utilization(&self) -> f64 {
        if self.monthly_budget_usd <= 0.0 {
            return 0.0;
        }
        self.current_spend_usd / self.monthly_budget_usd
    }

    /// Whether Tier 3 should be short-circuited.
    pub fn exhausted(&self) -> bool {
        self.monthly_budget_usd > 0.0 && self.current_spend_usd >= self.monthly_budget_usd
    }
}

/// Cumulative learning statistics for one template.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LearningStats {
    #[serde(default)]
    pub synonyms_learned: u64,
    #[serde(default)]
    pub fillers_learned: u64,
    #[serde(default)]
    pub keywords_learned: u64,
    #[serde(default)]
    pub negative_keywords_learned: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_learned_at: Option<DateTime<Utc>>,
}

impl LearningStats {
    /// Total patterns learned across all kinds.
    pub fn total(&self) -> u64 {
        self.synonyms_learned
            + self.fillers_learned
            + self.keywords_learned
            + self.negative_keywords_learned
    }

    /// Bump the counter for the given pattern kind.
    pub fn record(&mut self, kind: &PatternKind, now: DateTime<Utc>) {
        match kind {
            PatternKind::Synonym { .. } => self.synonyms_learned += 1,
            PatternKind::Filler { .. } => self.fillers_learned += 1,
            PatternKind::Keyword { .. } => self.keywords_learned += 1,
            PatternKind::NegativeKeyword { .. } => self.negative_keywords_learned += 1,
        }
        self.last_learned_at = Some(now);
    }
}

/// Severity of a template configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Critical,
}

/// A problem found by `Template::validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

/// A named collection of categorized scenarios plus tuning configuration.
///
/// This is the "scenario pool" every tier reads and the learning
/// promoter writes back into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,

    /// Ordered categories of scenarios.
    #[serde(default)]
    pub categories: Vec<ScenarioCategory>,

    /// Technical term → learned colloquial aliases.
    ///
    /// BTree containers keep serialization stable and make the union
    /// merge order-independent.
    #[serde(default)]
    pub synonyms: BTreeMap<String, BTreeSet<String>>,

    /// Words stripped from utterances before matching.
    #[serde(default)]
    pub fillers: BTreeSet<String>,

    #[serde(default)]
    pub settings: TemplateSettings,

    #[serde(default)]
    pub budget: BudgetState,

    #[serde(default)]
    pub stats: LearningStats,

    /// Optimistic-concurrency token; bumped on every save.
    #[serde(default)]
    pub revision: u64,
}

impl Template {
    /// Create an empty template with default settings.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            categories: Vec::new(),
            synonyms: BTreeMap::new(),
            fillers: BTreeSet::new(),
            settings: TemplateSettings::default(),
            budget: BudgetState::default(),
            stats: LearningStats::default(),
            revision: 0,
        }
    }

    /// All scenarios in category order.
    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.categories.iter().flat_map(|c| c.scenarios.iter())
    }

    /// Active scenarios only — the candidate set every tier matches against.
    pub fn active_scenarios(&self) -> Vec<&Scenario> {
        self.scenarios().filter(|s| s.active).collect()
    }

    /// Look up a scenario by id.
    pub fn find_scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios().find(|s| s.id == id)
    }

    fn find_scenario_mut(&mut self, id: &str) -> Option<&mut Scenario> {
        self.categories
            .iter_mut()
            .flat_map(|c| c.scenarios.iter_mut())
            .find(|s| s.id == id)
    }

    /// Add a colloquial alias for a technical term.
    ///
    /// Set-union semantics: returns `true` only if the alias was new.
    pub fn add_synonym(&mut self, technical: &str, colloquial: &str) -> bool {
        self.synonyms
            .entry(technical.trim().to_lowercase())
            .or_default()
            .insert(colloquial.trim().to_lowercase())
    }

    /// Add a filler word. Returns `true` only if the word was new.
    pub fn add_filler(&mut self, word: &str) -> bool {
        self.fillers.insert(word.trim().to_lowercase())
    }

    /// Add a trigger keyword to a scenario. Returns `true` if added.
    pub fn add_keyword(&mut self, scenario_id: &str, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        match self.find_scenario_mut(scenario_id) {
            Some(s) if !s.triggers.iter().any(|t| t.eq_ignore_ascii_case(&word)) => {
                s.triggers.push(word);
                true
            }
            _ => false,
        }
    }

    /// Add a negative trigger keyword to a scenario. Returns `true` if added.
    pub fn add_negative_keyword(&mut self, scenario_id: &str, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        match self.find_scenario_mut(scenario_id) {
            Some(s)
                if !s
                    .negative_triggers
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&word)) =>
            {
                s.negative_triggers.push(word);
                true
            }
            _ => false,
        }
    }

    /// Apply a learned pattern with idempotent union semantics.
    ///
    /// Returns `true` only if the template actually changed.
    pub fn apply_pattern(&mut self, pattern: &Pattern) -> bool {
        match &pattern.kind {
            PatternKind::Synonym {
                technical,
                colloquial,
            } => self.add_synonym(technical, colloquial),
            PatternKind::Filler { word } => self.add_filler(word),
            PatternKind::Keyword { scenario_id, word } => self.add_keyword(scenario_id, word),
            PatternKind::NegativeKeyword { scenario_id, word } => {
                self.add_negative_keyword(scenario_id, word)
            }
        }
    }

    /// Check the template for configuration problems.
    ///
    /// Routing still runs best-effort when issues exist; callers route
    /// the issues to the monitor instead of failing.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.scenarios().next().is_none() {
            issues.push(ConfigIssue {
                severity: IssueSeverity::Critical,
                message: format!("Template '{}' has no scenarios", self.id),
            });
        } else if self.active_scenarios().is_empty() {
            issues.push(ConfigIssue {
                severity: IssueSeverity::Critical,
                message: format!("Template '{}' has no active scenarios", self.id),
            });
        }

        if self.settings.tier2_threshold >= self.settings.tier1_threshold {
            issues.push(ConfigIssue {
                severity: IssueSeverity::Warning,
                message: format!(
                    "tier2_threshold ({}) must be below tier1_threshold ({})",
                    self.settings.tier2_threshold, self.settings.tier1_threshold
                ),
            });
        }

        issues
    }
}
