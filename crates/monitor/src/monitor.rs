//! The cost-and-health rule set.
//!
//! Each rule produces at most one throttled alert per alert key per
//! cooldown window; keys combine the alert category with the template
//! id so noisy templates cannot drown out quiet ones.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use introute_core::alert::{Alert, AlertSeverity, Notifier};
use introute_core::routing::{CallContext, RoutingResult, Tier};
use introute_core::scenario::{ConfigIssue, IssueSeverity, Template};
use tokio::sync::Mutex;
use tracing::debug;

use crate::throttle::AlertThrottle;

/// Below this highest-observed confidence a total miss is likely just
/// out-of-domain input rather than a tuning problem.
const OUT_OF_DOMAIN_FLOOR: f32 = 0.3;

/// Tier-1 confidence within this margin below the threshold counts as
/// a near-miss when a higher tier ended up resolving the call.
const NEAR_MISS_MARGIN: f32 = 0.1;

/// Budget utilization that triggers the early warning.
const BUDGET_WARN_AT: f64 = 0.8;

/// Everything the monitor needs to know about one resolved call.
pub struct CallObservation<'a> {
    pub result: &'a RoutingResult,
    pub ctx: &'a CallContext,
    /// Template snapshot with spend already recorded.
    pub template: &'a Template,
    /// Best Tier-1 confidence, when Tier 1 ran.
    pub tier1_confidence: Option<f32>,
    /// Best Tier-2 confidence, when Tier 2 ran.
    pub tier2_confidence: Option<f32>,
    /// Patterns extracted by Tier 3 for this call.
    pub patterns_extracted: usize,
}

/// Observes every routing attempt and raises throttled alerts.
pub struct CostAndHealthMonitor {
    notifier: Arc<dyn Notifier>,
    throttle: Mutex<AlertThrottle>,
}

impl CostAndHealthMonitor {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            throttle: Mutex::new(AlertThrottle::new()),
        }
    }

    /// Observe one resolved call. Never errors back into the pipeline.
    pub async fn observe(&self, obs: CallObservation<'_>) {
        let cooldown = Duration::from_secs(obs.template.settings.alert_cooldown_secs);

        self.check_failure(&obs, cooldown).await;
        self.check_total_miss(&obs, cooldown).await;
        self.check_slow_tiers(&obs, cooldown).await;
        self.check_expensive_call(&obs, cooldown).await;
        self.check_learning_stall(&obs, cooldown).await;
        self.check_near_miss(&obs, cooldown).await;
        self.check_budget(&obs, cooldown).await;
    }

    /// Report template configuration problems found before routing.
    pub async fn report_config_issues(&self, issues: &[ConfigIssue], template: &Template) {
        let cooldown = Duration::from_secs(template.settings.alert_cooldown_secs);
        for issue in issues {
            let severity = match issue.severity {
                IssueSeverity::Critical => AlertSeverity::Critical,
                IssueSeverity::Warning => AlertSeverity::Warning,
            };
            self.maybe_alert(
                "template_config",
                &template.id,
                cooldown,
                Alert::new(
                    "template_config",
                    severity,
                    "Template configuration problem",
                    issue.message.clone(),
                )
                .with_details(serde_json::json!({ "template_id": template.id })),
            )
            .await;
        }
    }

    // --- Rules ---

    /// Only condition with no confidence-based softening.
    async fn check_failure(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        if obs.result.success {
            return;
        }
        self.maybe_alert(
            "routing_failure",
            &obs.template.id,
            cooldown,
            Alert::new(
                "routing_failure",
                AlertSeverity::Critical,
                "Routing failure",
                format!(
                    "Call {} failed at {}: {}",
                    obs.ctx.call_id, obs.result.tier, obs.result.rationale
                ),
            )
            .with_details(serde_json::json!({
                "template_id": obs.template.id,
                "call_id": obs.ctx.call_id,
                "tier": obs.result.tier,
            })),
        )
        .await;
    }

    /// No tier matched. Severity scales with the best confidence seen.
    async fn check_total_miss(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        if obs.result.matched || !obs.result.success {
            return;
        }
        let highest = [
            obs.tier1_confidence,
            obs.tier2_confidence,
            Some(obs.result.confidence),
        ]
        .into_iter()
        .flatten()
        .fold(0.0f32, f32::max);

        let (severity, title) = if highest < OUT_OF_DOMAIN_FLOOR {
            (AlertSeverity::Info, "Unmatched utterance (likely out of domain)")
        } else {
            (AlertSeverity::Warning, "Unmatched utterance near threshold")
        };
        self.maybe_alert(
            "no_match",
            &obs.template.id,
            cooldown,
            Alert::new(
                "no_match",
                severity,
                title,
                format!(
                    "Call {} matched no scenario; highest confidence {highest:.2}",
                    obs.ctx.call_id
                ),
            )
            .with_details(serde_json::json!({
                "template_id": obs.template.id,
                "call_id": obs.ctx.call_id,
                "highest_confidence": highest,
            })),
        )
        .await;
    }

    /// Each tier has an independent latency ceiling.
    async fn check_slow_tiers(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        let ceilings = obs.template.settings.tier_latency_ceilings_ms;
        let perf = &obs.result.performance;
        for (tier, ceiling) in [
            (Tier::Rule, ceilings[0]),
            (Tier::Lexical, ceilings[1]),
            (Tier::Model, ceilings[2]),
        ] {
            let Some(measured) = perf.tier_ms(tier) else {
                continue;
            };
            if measured <= ceiling {
                continue;
            }
            self.maybe_alert(
                &format!("slow_tier_{}", tier.number()),
                &obs.template.id,
                cooldown,
                Alert::new(
                    "slow_tier",
                    AlertSeverity::Warning,
                    format!("{tier} exceeded its latency ceiling"),
                    format!("{tier} took {measured}ms (ceiling {ceiling}ms)"),
                )
                .with_details(serde_json::json!({
                    "template_id": obs.template.id,
                    "tier": tier,
                    "measured_ms": measured,
                    "ceiling_ms": ceiling,
                    "breakdown": perf,
                })),
            )
            .await;
        }
    }

    /// A single Tier-3 call above the per-call cost ceiling.
    async fn check_expensive_call(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        let cost = obs.result.performance.cost_usd;
        let ceiling = obs.template.settings.cost_ceiling_per_call_usd;
        if cost <= ceiling {
            return;
        }
        self.maybe_alert(
            "expensive_call",
            &obs.template.id,
            cooldown,
            Alert::new(
                "expensive_call",
                AlertSeverity::Warning,
                "Expensive model call",
                format!("Call {} cost ${cost:.4} (ceiling ${ceiling:.4})", obs.ctx.call_id),
            )
            .with_details(serde_json::json!({
                "template_id": obs.template.id,
                "call_id": obs.ctx.call_id,
                "cost_usd": cost,
            })),
        )
        .await;
    }

    /// A Tier-3 match that taught us nothing: the loop is not converging
    /// for this input class.
    async fn check_learning_stall(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        if obs.result.tier != Tier::Model || !obs.result.matched || obs.patterns_extracted > 0 {
            return;
        }
        self.maybe_alert(
            "learning_stall",
            &obs.template.id,
            cooldown,
            Alert::new(
                "learning_stall",
                AlertSeverity::Info,
                "Model match produced no patterns",
                format!(
                    "Call {} resolved at tier 3 but yielded nothing to learn",
                    obs.ctx.call_id
                ),
            )
            .with_details(serde_json::json!({
                "template_id": obs.template.id,
                "call_id": obs.ctx.call_id,
            })),
        )
        .await;
    }

    /// Tier 1 just missed while a higher tier resolved the call —
    /// the threshold may be set too conservatively.
    async fn check_near_miss(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        if obs.result.tier == Tier::Rule {
            return;
        }
        let Some(tier1) = obs.tier1_confidence else {
            return;
        };
        let threshold = obs.template.settings.tier1_threshold;
        if tier1 >= threshold || tier1 < threshold - NEAR_MISS_MARGIN {
            return;
        }
        self.maybe_alert(
            "tier1_near_miss",
            &obs.template.id,
            cooldown,
            Alert::new(
                "tier1_near_miss",
                AlertSeverity::Info,
                "Tier 1 near-miss",
                format!(
                    "Tier 1 scored {tier1:.2}, just below threshold {threshold:.2}; \
                     resolved at {}",
                    obs.result.tier
                ),
            )
            .with_details(serde_json::json!({
                "template_id": obs.template.id,
                "tier1_confidence": tier1,
                "tier1_threshold": threshold,
            })),
        )
        .await;
    }

    /// Budget utilization crossings: warn at 80 %, critical at 100 %.
    ///
    /// The stored budget may still carry last month's spend; roll a
    /// copy forward first so a new month never alerts on stale spend.
    async fn check_budget(&self, obs: &CallObservation<'_>, cooldown: Duration) {
        let mut budget = obs.template.budget.clone();
        budget.roll_if_new_month(Utc::now());
        if budget.monthly_budget_usd <= 0.0 {
            return;
        }
        let utilization = budget.utilization();

        if budget.exhausted() {
            self.maybe_alert(
                "budget_exceeded",
                &obs.template.id,
                cooldown,
                Alert::new(
                    "budget_exceeded",
                    AlertSeverity::Critical,
                    "Monthly model budget exceeded",
                    format!(
                        "Template '{}' spent ${:.2} of ${:.2}; tier 3 is disabled until reset",
                        obs.template.name, budget.current_spend_usd, budget.monthly_budget_usd
                    ),
                )
                .with_details(serde_json::json!({
                    "template_id": obs.template.id,
                    "spend_usd": budget.current_spend_usd,
                    "budget_usd": budget.monthly_budget_usd,
                })),
            )
            .await;
        } else if utilization >= BUDGET_WARN_AT {
            self.maybe_alert(
                "budget_warning",
                &obs.template.id,
                cooldown,
                Alert::new(
                    "budget_warning",
                    AlertSeverity::Warning,
                    "Monthly model budget nearly exhausted",
                    format!(
                        "Template '{}' is at {:.0}% of its monthly budget",
                        obs.template.name,
                        utilization * 100.0
                    ),
                )
                .with_details(serde_json::json!({
                    "template_id": obs.template.id,
                    "utilization": utilization,
                })),
            )
            .await;
        }
    }

    async fn maybe_alert(
        &self,
        category: &str,
        template_id: &str,
        cooldown: Duration,
        alert: Alert,
    ) {
        let key = format!("{category}:{template_id}");
        let send = self.throttle.lock().await.should_send(&key, cooldown);
        if !send {
            debug!(%key, "Alert suppressed by cooldown");
            return;
        }
        self.notifier.send_alert(alert).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use introute_core::routing::{Performance, TierMatch};
    use introute_core::scenario::{Scenario, ScenarioCategory};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingNotifier {
        alerts: StdMutex<Vec<Alert>>,
    }

    impl CountingNotifier {
        fn codes(&self) -> Vec<String> {
            self.alerts.lock().unwrap().iter().map(|a| a.code.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_alert(&self, alert: Alert) {
            self.alerts.lock().unwrap().push(alert);
        }
    }

    fn template() -> Template {
        let mut t = Template::new("tpl_1", "Clinic");
        t.categories.push(ScenarioCategory {
            name: "booking".into(),
            scenarios: vec![Scenario::new("sc_1", "Book")],
        });
        t
    }

    fn monitor() -> (CostAndHealthMonitor, Arc<CountingNotifier>) {
        let notifier = Arc::new(CountingNotifier::default());
        (CostAndHealthMonitor::new(notifier.clone()), notifier)
    }

    fn obs<'a>(
        result: &'a RoutingResult,
        ctx: &'a CallContext,
        template: &'a Template,
    ) -> CallObservation<'a> {
        CallObservation {
            result,
            ctx,
            template,
            tier1_confidence: None,
            tier2_confidence: None,
            patterns_extracted: 0,
        }
    }

    #[tokio::test]
    async fn failure_raises_critical_once_per_cooldown() {
        let (monitor, notifier) = monitor();
        let t = template();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::failure(Tier::Model, "provider timeout");

        monitor.observe(obs(&result, &ctx, &t)).await;
        monitor.observe(obs(&result, &ctx, &t)).await;

        let codes = notifier.codes();
        assert_eq!(
            codes.iter().filter(|c| *c == "routing_failure").count(),
            1,
            "second identical failure within cooldown must be suppressed"
        );
        let alerts = notifier.alerts.lock().unwrap();
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn total_miss_severity_scales_with_confidence() {
        let (monitor, notifier) = monitor();
        let mut t_low = template();
        t_low.id = "tpl_low".into();
        let ctx_low = CallContext::new("call_1", "tpl_low");
        let result = RoutingResult::no_match(Tier::Model, "nothing fit");

        let mut observation = obs(&result, &ctx_low, &t_low);
        observation.tier1_confidence = Some(0.1);
        monitor.observe(observation).await;

        let mut t_high = template();
        t_high.id = "tpl_high".into();
        let ctx_high = CallContext::new("call_2", "tpl_high");
        let mut observation = obs(&result, &ctx_high, &t_high);
        observation.tier1_confidence = Some(0.7);
        monitor.observe(observation).await;

        let alerts = notifier.alerts.lock().unwrap();
        let miss_alerts: Vec<_> = alerts.iter().filter(|a| a.code == "no_match").collect();
        assert_eq!(miss_alerts.len(), 2);
        assert_eq!(miss_alerts[0].severity, AlertSeverity::Info);
        assert_eq!(miss_alerts[1].severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn slow_tier_names_the_offender() {
        let (monitor, notifier) = monitor();
        let t = template();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::matched(
            Tier::Lexical,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 0.7,
                rationale: "ok".into(),
            },
        )
        .with_performance(Performance {
            tier1_ms: Some(3),
            tier2_ms: Some(5_000), // ceiling is 2_000
            total_ms: 5_003,
            ..Default::default()
        });

        monitor.observe(obs(&result, &ctx, &t)).await;

        let alerts = notifier.alerts.lock().unwrap();
        let slow: Vec<_> = alerts.iter().filter(|a| a.code == "slow_tier").collect();
        assert_eq!(slow.len(), 1);
        assert!(slow[0].message.contains("tier2_lexical"));
        assert!(slow[0].message.contains("5000ms"));
    }

    #[tokio::test]
    async fn expensive_call_warns() {
        let (monitor, notifier) = monitor();
        let t = template();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::matched(
            Tier::Model,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 0.9,
                rationale: "ok".into(),
            },
        )
        .with_performance(Performance {
            tier3_ms: Some(900),
            total_ms: 900,
            cost_usd: 0.12, // ceiling is 0.05
            ..Default::default()
        });

        let mut observation = obs(&result, &ctx, &t);
        observation.patterns_extracted = 1; // quiet the learning-stall rule
        monitor.observe(observation).await;
        assert!(notifier.codes().contains(&"expensive_call".to_string()));
    }

    #[tokio::test]
    async fn tier3_match_without_patterns_is_informational() {
        let (monitor, notifier) = monitor();
        let t = template();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::matched(
            Tier::Model,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 0.9,
                rationale: "ok".into(),
            },
        );

        monitor.observe(obs(&result, &ctx, &t)).await;
        assert!(notifier.codes().contains(&"learning_stall".to_string()));
    }

    #[tokio::test]
    async fn near_miss_fires_only_inside_margin() {
        let (monitor, notifier) = monitor();
        let t = template(); // tier1_threshold 0.80
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::matched(
            Tier::Lexical,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 0.7,
                rationale: "ok".into(),
            },
        );

        let mut observation = obs(&result, &ctx, &t);
        observation.tier1_confidence = Some(0.75); // within 0.1 of 0.80
        monitor.observe(observation).await;
        assert!(notifier.codes().contains(&"tier1_near_miss".to_string()));

        let mut t2 = template();
        t2.id = "tpl_2".into();
        let ctx2 = CallContext::new("call_2", "tpl_2");
        let mut observation = obs(&result, &ctx2, &t2);
        observation.tier1_confidence = Some(0.4); // far below
        monitor.observe(observation).await;
        let near: Vec<_> = notifier
            .codes()
            .into_iter()
            .filter(|c| c == "tier1_near_miss")
            .collect();
        assert_eq!(near.len(), 1);
    }

    fn current_month_key() -> u32 {
        use chrono::Datelike;
        let now = Utc::now();
        now.year() as u32 * 100 + now.month()
    }

    #[tokio::test]
    async fn budget_warning_then_critical() {
        let (monitor, notifier) = monitor();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::no_match(Tier::Model, "x");

        let mut t = template();
        t.budget.monthly_budget_usd = 10.0;
        t.budget.current_spend_usd = 8.2; // 82%
        t.budget.month = current_month_key();
        let mut observation = obs(&result, &ctx, &t);
        observation.tier1_confidence = Some(0.1);
        monitor.observe(observation).await;
        assert!(notifier.codes().contains(&"budget_warning".to_string()));
        assert!(!notifier.codes().contains(&"budget_exceeded".to_string()));

        t.budget.current_spend_usd = 10.1; // 101%
        let mut observation = obs(&result, &ctx, &t);
        observation.tier1_confidence = Some(0.1);
        monitor.observe(observation).await;
        assert!(notifier.codes().contains(&"budget_exceeded".to_string()));
    }

    #[tokio::test]
    async fn stale_month_spend_does_not_alert() {
        let (monitor, notifier) = monitor();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::matched(
            Tier::Rule,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 0.9,
                rationale: "trigger hit".into(),
            },
        );

        // Budget fully spent, but in a long-gone accounting month.
        let mut t = template();
        t.budget.monthly_budget_usd = 10.0;
        t.budget.current_spend_usd = 10.0;
        t.budget.month = 202501;
        monitor.observe(obs(&result, &ctx, &t)).await;

        let codes = notifier.codes();
        assert!(
            !codes.contains(&"budget_exceeded".to_string())
                && !codes.contains(&"budget_warning".to_string()),
            "last month's spend must not alert after rollover, got {codes:?}"
        );
    }

    #[tokio::test]
    async fn config_issues_are_reported_with_mapped_severity() {
        let (monitor, notifier) = monitor();
        let t = Template::new("tpl_empty", "Empty");
        let issues = t.validate();
        monitor.report_config_issues(&issues, &t).await;

        let alerts = notifier.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].code, "template_config");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn healthy_call_raises_nothing() {
        let (monitor, notifier) = monitor();
        let t = template();
        let ctx = CallContext::new("call_1", "tpl_1");
        let result = RoutingResult::matched(
            Tier::Rule,
            TierMatch {
                scenario_id: "sc_1".into(),
                confidence: 0.92,
                rationale: "trigger hit".into(),
            },
        )
        .with_performance(Performance {
            tier1_ms: Some(2),
            total_ms: 2,
            ..Default::default()
        });

        monitor.observe(obs(&result, &ctx, &t)).await;
        assert!(notifier.alerts.lock().unwrap().is_empty());
    }
}
