//! The resolution orchestrator.
//!
//! Wires the three matching tiers, the budget gate, the learning
//! promoter, and the monitor into one `resolve` call per utterance.

pub mod orchestrator;

pub use orchestrator::Engine;
