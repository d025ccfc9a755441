//! Tier 3 — language-model-backed scenario selection.
//!
//! The router sends the caller utterance plus compact candidate
//! summaries to an external provider and validates the strict-JSON
//! decision it gets back. It is a pure selector: it never authors
//! caller-facing reply text, and every provider failure degrades to a
//! "no match" routing result instead of an error on the call path.

pub mod decision;
pub mod openai;
pub mod pricing;
pub mod prompt;
pub mod tier3;

pub use openai::OpenAiCompatProvider;
pub use pricing::PricingTable;
pub use tier3::{Tier3Outcome, Tier3Router};
