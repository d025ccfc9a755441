//! Local matching tiers.
//!
//! Tier 1 is a deterministic rule/keyword matcher; Tier 2 is a
//! statistical lexical-similarity matcher. Neither makes a network
//! call, and both take snapshot reads of the template — no shared
//! mutable state during matching.

pub mod text;
pub mod tier1;
pub mod tier2;

pub use tier1::Tier1Matcher;
pub use tier2::Tier2Matcher;
