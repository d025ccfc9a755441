//! Escalation pipeline: rules, then lexical similarity, then the model.
//!
//! Each call reads one template snapshot and walks the tiers in cost
//! order, stopping at the first tier that clears its threshold. The
//! model tier is gated by the monthly budget; its spend is persisted
//! and its extracted patterns are handed to the learning promoter off
//! the call path. The monitor sees every outcome.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use introute_core::error::{Error, Result, StoreError};
use introute_core::routing::{CallContext, Performance, RoutingResult, Tier};
use introute_core::scenario::Template;
use introute_core::store::ScenarioStore;
use introute_learning::LearningPromoter;
use introute_matchers::{Tier1Matcher, Tier2Matcher};
use introute_monitor::{CallObservation, CostAndHealthMonitor};
use introute_router::Tier3Router;
use tracing::{debug, info, warn};

/// How many times a conflicted spend write is retried.
const SPEND_RETRIES: u32 = 3;

/// The tiered intent-resolution engine.
pub struct Engine {
    scenarios: Arc<dyn ScenarioStore>,
    tier1: Tier1Matcher,
    tier2: Tier2Matcher,
    tier3: Option<Arc<Tier3Router>>,
    promoter: Option<Arc<LearningPromoter>>,
    monitor: Arc<CostAndHealthMonitor>,
}

impl Engine {
    pub fn new(scenarios: Arc<dyn ScenarioStore>, monitor: Arc<CostAndHealthMonitor>) -> Self {
        Self {
            scenarios,
            tier1: Tier1Matcher::new(),
            tier2: Tier2Matcher::new(),
            tier3: None,
            promoter: None,
            monitor,
        }
    }

    /// Attach the model tier. Without it the engine runs offline on
    /// tiers 1 and 2 only.
    pub fn with_tier3(mut self, router: Arc<Tier3Router>) -> Self {
        self.tier3 = Some(router);
        self
    }

    /// Attach the learning promoter.
    pub fn with_promoter(mut self, promoter: Arc<LearningPromoter>) -> Self {
        self.promoter = Some(promoter);
        self
    }

    /// Resolve one utterance against the caller's template.
    ///
    /// Errors only when the template cannot be loaded; every matching
    /// or provider problem surfaces as a `RoutingResult` instead.
    pub async fn resolve(&self, utterance: &str, ctx: &CallContext) -> Result<RoutingResult> {
        let template = self
            .scenarios
            .find(&ctx.template_id)
            .await
            .map_err(Error::from)?;

        let issues = template.validate();
        if !issues.is_empty() {
            self.monitor.report_config_issues(&issues, &template).await;
        }

        // Tier 1 — rules.
        let t1_started = Instant::now();
        let tier1_hit = self.tier1.matches(utterance, &template);
        let tier1_ms = t1_started.elapsed().as_millis() as u64;
        let tier1_confidence = tier1_hit.as_ref().map(|h| h.confidence);

        if let Some(hit) = tier1_hit {
            if hit.confidence >= template.settings.tier1_threshold {
                info!(
                    call_id = %ctx.call_id,
                    scenario_id = %hit.scenario_id,
                    confidence = hit.confidence,
                    "Resolved at tier 1"
                );
                let result = RoutingResult::matched(Tier::Rule, hit).with_performance(Performance {
                    tier1_ms: Some(tier1_ms),
                    total_ms: tier1_ms,
                    ..Default::default()
                });
                self.observe(&result, ctx, &template, tier1_confidence, None, 0)
                    .await;
                return Ok(result);
            }
            debug!(
                call_id = %ctx.call_id,
                confidence = hit.confidence,
                threshold = template.settings.tier1_threshold,
                "Tier 1 below threshold, escalating"
            );
        }

        // Tier 2 — lexical similarity.
        let t2_started = Instant::now();
        let tier2_hit = self.tier2.matches(utterance, &template);
        let tier2_ms = t2_started.elapsed().as_millis() as u64;
        let tier2_confidence = tier2_hit.as_ref().map(|h| h.confidence);

        if let Some(hit) = tier2_hit {
            if hit.confidence >= template.settings.tier2_threshold {
                info!(
                    call_id = %ctx.call_id,
                    scenario_id = %hit.scenario_id,
                    confidence = hit.confidence,
                    "Resolved at tier 2"
                );
                let result =
                    RoutingResult::matched(Tier::Lexical, hit).with_performance(Performance {
                        tier1_ms: Some(tier1_ms),
                        tier2_ms: Some(tier2_ms),
                        total_ms: tier1_ms + tier2_ms,
                        ..Default::default()
                    });
                self.observe(&result, ctx, &template, tier1_confidence, tier2_confidence, 0)
                    .await;
                return Ok(result);
            }
        }

        // Tier 3 — the model, gated by the monthly budget.
        let now = Utc::now();
        let mut budget = template.budget.clone();
        budget.roll_if_new_month(now);

        let Some(tier3) = self.tier3.as_ref().filter(|_| !budget.exhausted()) else {
            let rationale = if self.tier3.is_none() {
                "below lexical threshold; model tier unavailable"
            } else {
                warn!(
                    call_id = %ctx.call_id,
                    template_id = %template.id,
                    spend_usd = budget.current_spend_usd,
                    "Monthly budget exhausted, skipping model tier"
                );
                "monthly model budget exhausted"
            };
            let result = RoutingResult::no_match(Tier::Lexical, rationale).with_performance(
                Performance {
                    tier1_ms: Some(tier1_ms),
                    tier2_ms: Some(tier2_ms),
                    total_ms: tier1_ms + tier2_ms,
                    ..Default::default()
                },
            );
            self.observe(&result, ctx, &template, tier1_confidence, tier2_confidence, 0)
                .await;
            return Ok(result);
        };

        // The model call runs detached so an abandoned upstream call
        // cannot cancel it mid-flight: its tokens are billed either
        // way, so spend accounting and learning must still run. Only
        // routing the result back is lost on cancellation.
        let task = tokio::spawn({
            let tier3 = Arc::clone(tier3);
            let scenarios = Arc::clone(&self.scenarios);
            let promoter = self.promoter.clone();
            let utterance = utterance.to_string();
            let template = template.clone();
            let ctx = ctx.clone();
            async move {
                let outcome = tier3.route(&utterance, &template, &ctx).await;

                // Spend is persisted even for failed calls; tokens were burned.
                let cost_usd = outcome.result.performance.cost_usd;
                let observed_template = if cost_usd > 0.0 {
                    Self::record_spend(&scenarios, &template, cost_usd, now).await
                } else {
                    template
                };

                if let (Some(promoter), false) = (promoter, outcome.patterns.is_empty()) {
                    let patterns = outcome.patterns.clone();
                    let snapshot = observed_template.clone();
                    let call_id = ctx.call_id.clone();
                    tokio::spawn(async move {
                        let learned = promoter.learn(patterns, &snapshot, &call_id).await;
                        debug!(
                            call_id,
                            applied = learned.applied.len(),
                            queued = learned.queued.len(),
                            discarded = learned.discarded,
                            "Learning batch processed"
                        );
                    });
                }

                (outcome, observed_template)
            }
        });

        let (outcome, observed_template) = match task.await {
            Ok(done) => done,
            Err(e) => {
                warn!(call_id = %ctx.call_id, error = %e, "Model tier task aborted");
                let result = RoutingResult::failure(Tier::Model, "model tier task aborted")
                    .with_performance(Performance {
                        tier1_ms: Some(tier1_ms),
                        tier2_ms: Some(tier2_ms),
                        total_ms: tier1_ms + tier2_ms,
                        ..Default::default()
                    });
                self.observe(&result, ctx, &template, tier1_confidence, tier2_confidence, 0)
                    .await;
                return Ok(result);
            }
        };

        let mut result = outcome.result;
        result.performance.tier1_ms = Some(tier1_ms);
        result.performance.tier2_ms = Some(tier2_ms);
        result.performance.total_ms += tier1_ms + tier2_ms;

        self.observe(
            &result,
            ctx,
            &observed_template,
            tier1_confidence,
            tier2_confidence,
            outcome.patterns.len(),
        )
        .await;
        Ok(result)
    }

    /// Persist model spend with a revision-checked retry loop. Returns
    /// the freshest snapshot available for observation.
    ///
    /// Associated rather than `&self` so the detached model-tier task
    /// can run it without borrowing the engine.
    async fn record_spend(
        scenarios: &Arc<dyn ScenarioStore>,
        template: &Template,
        cost_usd: f64,
        now: DateTime<Utc>,
    ) -> Template {
        for attempt in 0..SPEND_RETRIES {
            let mut fresh = match scenarios.find(&template.id).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(template_id = %template.id, error = %e, "Spend write lost: reload failed");
                    return template.clone();
                }
            };
            fresh.budget.record_spend(cost_usd, now);
            match scenarios.save(&fresh).await {
                Ok(()) => {
                    fresh.revision += 1;
                    return fresh;
                }
                Err(StoreError::Conflict { .. }) if attempt + 1 < SPEND_RETRIES => {
                    debug!(template_id = %template.id, attempt, "Spend write conflict, retrying");
                }
                Err(e) => {
                    warn!(template_id = %template.id, error = %e, "Spend write lost");
                    return template.clone();
                }
            }
        }
        warn!(template_id = %template.id, "Spend write lost after retries");
        template.clone()
    }

    async fn observe(
        &self,
        result: &RoutingResult,
        ctx: &CallContext,
        template: &Template,
        tier1_confidence: Option<f32>,
        tier2_confidence: Option<f32>,
        patterns_extracted: usize,
    ) {
        self.monitor
            .observe(CallObservation {
                result,
                ctx,
                template,
                tier1_confidence,
                tier2_confidence,
                patterns_extracted,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use introute_core::alert::{Alert, Notifier};
    use introute_core::error::ProviderError;
    use introute_core::provider::{
        CompletionRequest, CompletionResponse, LanguageModelProvider, Usage,
    };
    use introute_core::scenario::{Scenario, ScenarioCategory};
    use introute_store::{InMemoryScenarioStore, InMemorySuggestionStore};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: StdMutex<Vec<Alert>>,
    }

    impl RecordingNotifier {
        fn codes(&self) -> Vec<String> {
            self.alerts.lock().unwrap().iter().map(|a| a.code.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_alert(&self, alert: Alert) {
            self.alerts.lock().unwrap().push(alert);
        }
    }

    struct ScriptedProvider {
        content: String,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(content: &str) -> Self {
            Self {
                content: content.into(),
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl LanguageModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: self.content.clone(),
                usage: Usage {
                    prompt_tokens: 1000,
                    completion_tokens: 100,
                },
                model: "openai/gpt-4o-mini".into(),
            })
        }
    }

    fn current_month_key() -> u32 {
        use chrono::Datelike;
        let now = Utc::now();
        now.year() as u32 * 100 + now.month()
    }

    fn template() -> Template {
        let mut t = Template::new("tpl_1", "Clinic");
        t.categories.push(ScenarioCategory {
            name: "booking".into(),
            scenarios: vec![
                Scenario::new("sc_book", "Book appointment")
                    .with_triggers(&["book an appointment"])
                    .with_examples(&["i would like to book an appointment"]),
                Scenario::new("sc_hours", "Opening hours")
                    .with_triggers(&["opening hours"])
                    .with_examples(&["what are your opening hours"]),
            ],
        });
        t
    }

    struct Harness {
        engine: Engine,
        scenarios: Arc<InMemoryScenarioStore>,
        notifier: Arc<RecordingNotifier>,
        provider: Arc<ScriptedProvider>,
    }

    async fn harness(template: Template, decision_json: &str) -> Harness {
        harness_with_provider(template, Arc::new(ScriptedProvider::new(decision_json))).await
    }

    async fn harness_with_provider(template: Template, provider: Arc<ScriptedProvider>) -> Harness {
        let scenarios = Arc::new(InMemoryScenarioStore::new());
        scenarios.insert(template).await;
        let suggestions = Arc::new(InMemorySuggestionStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let monitor = Arc::new(CostAndHealthMonitor::new(notifier.clone()));
        let promoter = Arc::new(LearningPromoter::new(
            scenarios.clone(),
            suggestions.clone(),
            notifier.clone(),
        ));
        let tier3 = Arc::new(Tier3Router::new(provider.clone(), "openai/gpt-4o-mini"));

        let engine = Engine::new(scenarios.clone(), monitor)
            .with_tier3(tier3)
            .with_promoter(promoter);
        Harness {
            engine,
            scenarios,
            notifier,
            provider,
        }
    }

    #[tokio::test]
    async fn clear_trigger_resolves_at_tier1_without_model_call() {
        let h = harness(template(), "{}").await;
        let ctx = CallContext::new("call_1", "tpl_1");

        let result = h
            .engine
            .resolve("i want to book an appointment", &ctx)
            .await
            .unwrap();

        assert!(result.matched);
        assert_eq!(result.tier, Tier::Rule);
        assert_eq!(result.scenario_id.as_deref(), Some("sc_book"));
        assert!((result.performance.cost_usd - 0.0).abs() < f64::EPSILON);
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn paraphrase_resolves_at_tier2() {
        let h = harness(template(), "{}").await;
        let ctx = CallContext::new("call_1", "tpl_1");

        let result = h
            .engine
            .resolve("when are your opening hours on saturday", &ctx)
            .await
            .unwrap();

        assert!(result.matched);
        assert_eq!(result.tier, Tier::Lexical);
        assert_eq!(result.scenario_id.as_deref(), Some("sc_hours"));
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn novel_phrasing_escalates_to_model_and_records_spend() {
        let h = harness(
            template(),
            r#"{"scenario_id":"sc_book","confidence":0.85,"reason":"booking intent"}"#,
        )
        .await;
        let ctx = CallContext::new("call_1", "tpl_1");

        let result = h
            .engine
            .resolve("gotta get myself seen by the doc soon", &ctx)
            .await
            .unwrap();

        assert!(result.matched);
        assert_eq!(result.tier, Tier::Model);
        assert_eq!(result.scenario_id.as_deref(), Some("sc_book"));
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
        assert!(result.performance.cost_usd > 0.0);

        let stored = h.scenarios.find("tpl_1").await.unwrap();
        assert!(
            (stored.budget.current_spend_usd - result.performance.cost_usd).abs() < 1e-12,
            "model spend must be persisted on the template"
        );
    }

    #[tokio::test]
    async fn extracted_synonym_is_learned_and_then_hits_tier1() {
        let mut t = template();
        t.categories[0].scenarios[0].triggers = vec!["gastroscopy".into()];
        let h = harness(
            t,
            r#"{"scenario_id":"sc_book","confidence":0.9,"reason":"colloquial booking","patterns":[
                {"type":"synonym","technical":"gastroscopy","colloquial":"stomach check","confidence":0.9}
            ]}"#,
        )
        .await;
        let ctx = CallContext::new("call_1", "tpl_1");

        let first = h.engine.resolve("i need a stomach check", &ctx).await.unwrap();
        assert_eq!(first.tier, Tier::Model);

        // Learning runs off the call path; wait for the merge to land.
        let mut learned = false;
        for _ in 0..100 {
            let stored = h.scenarios.find("tpl_1").await.unwrap();
            if stored.synonyms.get("gastroscopy").is_some_and(|s| s.contains("stomach check")) {
                learned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(learned, "auto-apply pattern never landed");

        let second = h
            .engine
            .resolve("i need a stomach check", &CallContext::new("call_2", "tpl_1"))
            .await
            .unwrap();
        assert_eq!(second.tier, Tier::Rule, "learned synonym should resolve at tier 1");
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_call_still_records_spend_and_learns() {
        let provider = Arc::new(
            ScriptedProvider::new(
                r#"{"scenario_id":"sc_book","confidence":0.9,"reason":"booking","patterns":[
                    {"type":"synonym","technical":"gastroscopy","colloquial":"stomach check","confidence":0.9}
                ]}"#,
            )
            .with_delay(Duration::from_millis(50)),
        );
        let h = harness_with_provider(template(), provider).await;

        // The caller hangs up mid-flight: the resolve future is dropped
        // while the model call is still running.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            h.engine.resolve("gotta get myself seen soon", &CallContext::new("call_1", "tpl_1")),
        )
        .await;
        assert!(abandoned.is_err(), "resolve must still be in flight");

        // The detached model work completes anyway: spend lands on the
        // template and the extracted synonym is learned.
        let mut spend_recorded = false;
        let mut learned = false;
        for _ in 0..100 {
            let stored = h.scenarios.find("tpl_1").await.unwrap();
            spend_recorded = stored.budget.current_spend_usd > 0.0;
            learned = stored
                .synonyms
                .get("gastroscopy")
                .is_some_and(|s| s.contains("stomach check"));
            if spend_recorded && learned {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
        assert!(spend_recorded, "abandoned call must still persist model spend");
        assert!(learned, "abandoned call must still feed the learning loop");
    }

    #[tokio::test]
    async fn exhausted_budget_short_circuits_the_model_tier() {
        let mut t = template();
        t.budget.monthly_budget_usd = 10.0;
        t.budget.current_spend_usd = 10.0;
        t.budget.month = current_month_key(); // spend belongs to this month
        let h = harness(t, "{}").await;
        let ctx = CallContext::new("call_1", "tpl_1");

        let result = h
            .engine
            .resolve("completely novel phrasing here", &ctx)
            .await
            .unwrap();

        assert!(!result.matched);
        assert!(result.rationale.contains("budget"));
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
        assert!(h.notifier.codes().contains(&"budget_exceeded".to_string()));
    }

    #[tokio::test]
    async fn crossing_the_warning_line_alerts_once() {
        let mut t = template();
        t.budget.monthly_budget_usd = 0.0002; // one cheap call crosses 80%
        let h = harness(
            t,
            r#"{"scenario_id":null,"confidence":0.0,"reason":"nothing fits"}"#,
        )
        .await;

        h.engine
            .resolve("novel utterance one", &CallContext::new("call_1", "tpl_1"))
            .await
            .unwrap();

        let codes = h.notifier.codes();
        assert!(
            codes.contains(&"budget_warning".to_string())
                || codes.contains(&"budget_exceeded".to_string()),
            "crossing the 80% line must alert, got {codes:?}"
        );
    }

    #[tokio::test]
    async fn offline_engine_stops_at_tier2() {
        let scenarios = Arc::new(InMemoryScenarioStore::new());
        scenarios.insert(template()).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = Arc::new(CostAndHealthMonitor::new(notifier.clone()));
        let engine = Engine::new(scenarios, monitor);

        let result = engine
            .resolve("completely unrelated words", &CallContext::new("call_1", "tpl_1"))
            .await
            .unwrap();

        assert!(!result.matched);
        assert!(result.success);
        assert!(result.rationale.contains("unavailable"));
    }

    #[tokio::test]
    async fn unknown_template_is_an_error() {
        let scenarios = Arc::new(InMemoryScenarioStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = Arc::new(CostAndHealthMonitor::new(notifier.clone()));
        let engine = Engine::new(scenarios, monitor);

        let err = engine
            .resolve("hello", &CallContext::new("call_1", "tpl_missing"))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn empty_template_reports_config_issue_and_declines() {
        let scenarios = Arc::new(InMemoryScenarioStore::new());
        scenarios.insert(Template::new("tpl_empty", "Empty")).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = Arc::new(CostAndHealthMonitor::new(notifier.clone()));
        let engine = Engine::new(scenarios, monitor);

        let result = engine
            .resolve("hello", &CallContext::new("call_1", "tpl_empty"))
            .await
            .unwrap();

        assert!(!result.matched);
        assert!(notifier.codes().contains(&"template_config".to_string()));
    }
}
