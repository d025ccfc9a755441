//! Error types for the introute domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all introute operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Language-model provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Learning errors ---
    #[error("Learning error: {0}")]
    Learning(#[from] LearningError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures from the external language-model or transcription providers.
///
/// Variants are distinguishable so the router can decide what is
/// retryable and the monitor can name the failure class in alerts.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Failures from the scenario/suggestion persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Write conflict on template {template_id} (revision {expected})")]
    Conflict { template_id: String, expected: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures from the learning pipeline.
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Store error during learning: {0}")]
    Store(#[from] StoreError),
}
