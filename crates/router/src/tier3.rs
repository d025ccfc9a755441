//! The Tier-3 router itself.
//!
//! One provider call per invocation, bounded by an explicit timeout.
//! Malformed JSON, provider timeouts, and transport failures are
//! recoverable: the caller always gets a RoutingResult, never an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use introute_core::pattern::Pattern;
use introute_core::provider::{CompletionRequest, LanguageModelProvider, TranscriptionProvider};
use introute_core::routing::{CallContext, Performance, RoutingResult, Tier, TierMatch};
use introute_core::scenario::Template;
use tracing::{debug, info, warn};

use crate::decision::{self, Verdict};
use crate::pricing::PricingTable;
use crate::prompt;

/// STT confidence band (percent) where a re-transcription is worth one
/// attempt before spending the language-model call.
const UNCERTAIN_BAND: (f32, f32) = (45.0, 75.0);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const RETRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What one Tier-3 invocation produced.
#[derive(Debug)]
pub struct Tier3Outcome {
    pub result: RoutingResult,
    /// Extracted linguistic patterns for the learning promoter.
    pub patterns: Vec<Pattern>,
    /// Set when the provider returned an id outside the candidate set.
    pub hallucinated_id: Option<String>,
}

/// The language-model-backed last-resort matcher.
pub struct Tier3Router {
    provider: Arc<dyn LanguageModelProvider>,
    transcriber: Option<Arc<dyn TranscriptionProvider>>,
    pricing: PricingTable,
    model: String,
    timeout: Duration,
    retranscribe_timeout: Duration,
}

impl Tier3Router {
    pub fn new(provider: Arc<dyn LanguageModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            transcriber: None,
            pricing: PricingTable::with_defaults(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            retranscribe_timeout: RETRANSCRIBE_TIMEOUT,
        }
    }

    /// Attach an optional re-transcription provider.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn TranscriptionProvider>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Override the provider timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the pricing table.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Route an utterance through the language model.
    pub async fn route(
        &self,
        utterance: &str,
        template: &Template,
        ctx: &CallContext,
    ) -> Tier3Outcome {
        let started = Instant::now();

        let candidates = template.active_scenarios();
        if candidates.is_empty() {
            return Tier3Outcome {
                result: RoutingResult::no_match(Tier::Model, "no active scenarios")
                    .with_performance(elapsed_perf(started)),
                patterns: Vec::new(),
                hallucinated_id: None,
            };
        }

        // Fails open: on any trouble we keep the original transcript.
        let text = self.maybe_retranscribe(utterance, ctx).await;

        let request = CompletionRequest::json(
            &self.model,
            prompt::SYSTEM_PROMPT,
            prompt::build_user_prompt(&text, &candidates),
        );

        let response =
            match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(call_id = %ctx.call_id, error = %e, "Tier 3 provider failed");
                    return self.failure(started, format!("provider failure: {e}"));
                }
                Err(_) => {
                    warn!(
                        call_id = %ctx.call_id,
                        timeout_secs = self.timeout.as_secs(),
                        "Tier 3 provider timed out"
                    );
                    return self.failure(
                        started,
                        format!("provider timed out after {}s", self.timeout.as_secs()),
                    );
                }
            };

        let cost = self.pricing.cost_of(&response.model, response.usage);
        let mut performance = elapsed_perf(started);
        performance.prompt_tokens = Some(response.usage.prompt_tokens);
        performance.completion_tokens = Some(response.usage.completion_tokens);
        performance.cost_usd = cost;

        let Some(raw) = decision::parse(&response.content) else {
            warn!(call_id = %ctx.call_id, "Tier 3 returned malformed JSON");
            return Tier3Outcome {
                result: RoutingResult::failure(Tier::Model, "malformed provider response")
                    .with_performance(performance),
                patterns: Vec::new(),
                hallucinated_id: None,
            };
        };

        let validated = decision::validate(raw, &candidates);
        let result = match validated.verdict {
            Verdict::Match {
                scenario_id,
                confidence,
            } => {
                info!(
                    call_id = %ctx.call_id,
                    scenario_id = %scenario_id,
                    confidence,
                    cost_usd = cost,
                    "Tier 3 matched"
                );
                RoutingResult::matched(
                    Tier::Model,
                    TierMatch {
                        scenario_id,
                        confidence,
                        rationale: validated.reason,
                    },
                )
                .with_performance(performance)
            }
            Verdict::NoMatch => {
                debug!(call_id = %ctx.call_id, reason = %validated.reason, "Tier 3 declined");
                RoutingResult::no_match(
                    Tier::Model,
                    if validated.reason.is_empty() {
                        "provider declined".to_string()
                    } else {
                        validated.reason
                    },
                )
                .with_performance(performance)
            }
        };

        Tier3Outcome {
            result,
            patterns: validated.patterns,
            hallucinated_id: validated.hallucinated_id,
        }
    }

    fn failure(&self, started: Instant, rationale: String) -> Tier3Outcome {
        Tier3Outcome {
            result: RoutingResult::failure(Tier::Model, rationale)
                .with_performance(elapsed_perf(started)),
            patterns: Vec::new(),
            hallucinated_id: None,
        }
    }

    /// One-time re-transcription when the STT confidence is uncertain.
    ///
    /// The improved transcript substitutes only when its confidence is
    /// strictly higher; failure or timeout falls back to the original.
    async fn maybe_retranscribe(&self, utterance: &str, ctx: &CallContext) -> String {
        let (Some(transcriber), Some(stt_confidence), Some(audio_ref)) = (
            self.transcriber.as_ref(),
            ctx.transcription_confidence,
            ctx.audio_ref.as_deref(),
        ) else {
            return utterance.to_string();
        };

        if !(UNCERTAIN_BAND.0..=UNCERTAIN_BAND.1).contains(&stt_confidence) {
            return utterance.to_string();
        }

        match tokio::time::timeout(self.retranscribe_timeout, transcriber.retranscribe(audio_ref))
            .await
        {
            Ok(Ok(better)) if better.confidence_percent > stt_confidence => {
                info!(
                    call_id = %ctx.call_id,
                    old_confidence = stt_confidence,
                    new_confidence = better.confidence_percent,
                    "Using higher-fidelity re-transcription"
                );
                better.transcript
            }
            Ok(Ok(_)) => {
                debug!(call_id = %ctx.call_id, "Re-transcription no better, keeping original");
                utterance.to_string()
            }
            Ok(Err(e)) => {
                warn!(call_id = %ctx.call_id, error = %e, "Re-transcription failed, keeping original");
                utterance.to_string()
            }
            Err(_) => {
                warn!(call_id = %ctx.call_id, "Re-transcription timed out, keeping original");
                utterance.to_string()
            }
        }
    }
}

fn elapsed_perf(started: Instant) -> Performance {
    let ms = started.elapsed().as_millis() as u64;
    Performance {
        tier3_ms: Some(ms),
        total_ms: ms,
        ..Default::default()
    }
}
