//! # introute Core
//!
//! Domain types, traits, and error definitions for the introute
//! tiered intent-resolution engine. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (scenario store, suggestion queue,
//! language-model provider, notifier, transcription service) is defined
//! as a trait here. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod alert;
pub mod error;
pub mod pattern;
pub mod provider;
pub mod routing;
pub mod scenario;
pub mod store;
pub mod suggestion;

// Re-export key types at crate root for ergonomics
pub use alert::{Alert, AlertSeverity, Notifier};
pub use error::{Error, LearningError, ProviderError, Result, StoreError};
pub use pattern::{Pattern, PatternKind};
pub use provider::{
    CompletionRequest, CompletionResponse, LanguageModelProvider, Retranscription,
    TranscriptionProvider, Usage,
};
pub use routing::{CallContext, Performance, RoutingResult, Tier, TierMatch};
pub use scenario::{
    BudgetState, ConfigIssue, IssueSeverity, LearningStats, Scenario, ScenarioCategory, Template,
    TemplateSettings,
};
pub use store::{ScenarioStore, SuggestionStore};
pub use suggestion::{Suggestion, SuggestionStatus};
