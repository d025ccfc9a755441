//! Pattern classification and promotion.
//!
//! Policy per pattern, by confidence `c` (floors come from the
//! template's settings):
//! - `c >= auto_apply_floor` — merge immediately into the template with
//!   idempotent union semantics;
//! - `suggestion_floor <= c < auto_apply_floor` — create or bump a
//!   deduplicated suggestion;
//! - below — discard.
//!
//! Two caps bound the blast radius of a bad extraction: a per-call
//! pattern limit, and a rolling-hour ceiling on auto-applications per
//! template (overflow is downgraded to a suggestion, not lost).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use introute_core::alert::{Alert, AlertSeverity, Notifier};
use introute_core::pattern::Pattern;
use introute_core::scenario::Template;
use introute_core::store::{ScenarioStore, SuggestionStore};
use introute_core::suggestion::Suggestion;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::window::RollingWindow;

/// What one learning batch did.
#[derive(Debug, Default)]
pub struct LearningOutcome {
    /// Patterns merged into the template.
    pub applied: Vec<Pattern>,
    /// Patterns queued (or re-counted) for human review.
    pub queued: Vec<Pattern>,
    /// Invalid, low-confidence, over-cap, or already-known patterns.
    pub discarded: u32,
}

/// Classifies extracted patterns and writes the survivors back.
pub struct LearningPromoter {
    scenarios: Arc<dyn ScenarioStore>,
    suggestions: Arc<dyn SuggestionStore>,
    notifier: Arc<dyn Notifier>,
    /// Per-template rolling-hour auto-apply windows.
    windows: Mutex<HashMap<String, RollingWindow>>,
}

impl LearningPromoter {
    pub fn new(
        scenarios: Arc<dyn ScenarioStore>,
        suggestions: Arc<dyn SuggestionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            scenarios,
            suggestions,
            notifier,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Process one batch of extracted patterns for a template.
    ///
    /// A malformed pattern or a store failure on one pattern never
    /// aborts processing of its siblings.
    pub async fn learn(
        &self,
        patterns: Vec<Pattern>,
        template: &Template,
        call_id: &str,
    ) -> LearningOutcome {
        let mut outcome = LearningOutcome::default();
        let now = Utc::now();
        let settings = &template.settings;

        let over_cap = patterns.len().saturating_sub(settings.max_patterns_per_call);
        if over_cap > 0 {
            warn!(
                template_id = %template.id,
                call_id,
                dropped = over_cap,
                cap = settings.max_patterns_per_call,
                "Pattern batch over per-call cap, dropping excess"
            );
            outcome.discarded += over_cap as u32;
        }

        for pattern in patterns.into_iter().take(settings.max_patterns_per_call) {
            if let Err(reason) = pattern.validate() {
                debug!(template_id = %template.id, call_id, %reason, "Skipping invalid pattern");
                outcome.discarded += 1;
                continue;
            }

            if pattern.confidence >= settings.auto_apply_floor {
                let at_cap = self
                    .windows
                    .lock()
                    .await
                    .entry(template.id.clone())
                    .or_default()
                    .at_capacity(now, settings.max_auto_apply_per_hour);

                if !at_cap {
                    let applied = self
                        .auto_apply(pattern, template, call_id, now, &mut outcome)
                        .await;
                    // A no-op union keeps its slot for a novel pattern.
                    if applied {
                        if let Some(window) = self.windows.lock().await.get_mut(&template.id) {
                            window.record(now);
                        }
                    }
                } else {
                    debug!(
                        template_id = %template.id,
                        call_id,
                        "Hourly auto-apply cap reached, queueing as suggestion"
                    );
                    self.queue_suggestion(pattern, template, call_id, now, &mut outcome)
                        .await;
                }
            } else if pattern.confidence >= settings.suggestion_floor {
                self.queue_suggestion(pattern, template, call_id, now, &mut outcome)
                    .await;
            } else {
                debug!(
                    template_id = %template.id,
                    call_id,
                    confidence = pattern.confidence,
                    "Discarding low-confidence pattern"
                );
                outcome.discarded += 1;
            }
        }

        info!(
            template_id = %template.id,
            call_id,
            applied = outcome.applied.len(),
            queued = outcome.queued.len(),
            discarded = outcome.discarded,
            "Learning batch processed"
        );
        outcome
    }

    /// Returns whether the merge actually changed the template.
    async fn auto_apply(
        &self,
        pattern: Pattern,
        template: &Template,
        call_id: &str,
        now: DateTime<Utc>,
        outcome: &mut LearningOutcome,
    ) -> bool {
        match self
            .scenarios
            .merge_learned(&template.id, &pattern, now)
            .await
        {
            Ok(true) => {
                info!(
                    template_id = %template.id,
                    call_id,
                    kind = pattern.kind.tag(),
                    confidence = pattern.confidence,
                    "Auto-applied learned pattern"
                );
                self.notifier
                    .send_alert(
                        Alert::new(
                            "pattern_auto_applied",
                            AlertSeverity::Info,
                            "Pattern learned",
                            format!(
                                "Auto-applied a {} pattern to template '{}'",
                                pattern.kind.tag(),
                                template.name
                            ),
                        )
                        .with_details(serde_json::json!({
                            "template_id": template.id,
                            "call_id": call_id,
                            "pattern": pattern,
                        })),
                    )
                    .await;
                outcome.applied.push(pattern);
                true
            }
            Ok(false) => {
                // Already known — the union was a no-op.
                debug!(template_id = %template.id, call_id, "Pattern already present");
                outcome.discarded += 1;
                false
            }
            Err(e) => {
                warn!(template_id = %template.id, call_id, error = %e, "Auto-apply failed");
                outcome.discarded += 1;
                false
            }
        }
    }

    async fn queue_suggestion(
        &self,
        pattern: Pattern,
        template: &Template,
        call_id: &str,
        now: DateTime<Utc>,
        outcome: &mut LearningOutcome,
    ) {
        let window = Duration::seconds(template.settings.dedup_window_secs as i64);
        let dedup_key = pattern.dedup_key();

        let existing = match self
            .suggestions
            .find_pending(&template.id, &dedup_key, window, now)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                warn!(template_id = %template.id, call_id, error = %e, "Suggestion lookup failed");
                outcome.discarded += 1;
                return;
            }
        };

        let write = match existing {
            Some(found) => {
                self.suggestions
                    .increment_frequency(&found.id, now)
                    .await
                    .map(|()| {
                        debug!(
                            template_id = %template.id,
                            suggestion_id = %found.id,
                            frequency = found.frequency + 1,
                            "Bumped existing suggestion"
                        );
                    })
            }
            None => {
                let suggestion = Suggestion::new(&template.id, pattern.clone(), call_id, now);
                self.suggestions.create(&suggestion).await
            }
        };

        match write {
            Ok(()) => outcome.queued.push(pattern),
            Err(e) => {
                warn!(template_id = %template.id, call_id, error = %e, "Suggestion write failed");
                outcome.discarded += 1;
            }
        }
    }
}
