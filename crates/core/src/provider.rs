//! Provider traits — the abstraction over the language-model backend
//! and the optional re-transcription service.
//!
//! The language model is used purely as a *selector*: it is asked to
//! pick a scenario id and justify it, never to author caller-facing
//! text. Implementations live in the router crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g. "openai/gpt-4o-mini").
    pub model: String,

    /// System prompt — the selection contract.
    pub system_prompt: String,

    /// User prompt — the caller utterance plus candidate summaries.
    pub user_prompt: String,

    /// Temperature (low for deterministic selection).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the provider for strict JSON output.
    #[serde(default)]
    pub json_mode: bool,
}

fn default_temperature() -> f32 {
    0.1
}

impl CompletionRequest {
    pub fn json(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: default_temperature(),
            max_tokens: Some(1024),
            json_mode: true,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Raw content — treated as untrusted by the router.
    pub content: String,

    /// Token usage for cost accounting.
    pub usage: Usage,

    /// Which model actually responded (may differ from requested).
    pub model: String,
}

/// The language-model seam used by Tier 3.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g. "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;
}

/// Result of a one-time higher-fidelity re-transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retranscription {
    pub transcript: String,
    /// Confidence in percent (0–100).
    pub confidence_percent: f32,
}

/// Optional speech re-transcription seam.
///
/// Used once per call at most, when the upstream transcript confidence
/// falls in the uncertain band, and always bounded by a timeout.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn retranscribe(
        &self,
        audio_ref: &str,
    ) -> std::result::Result<Retranscription, ProviderError>;
}
