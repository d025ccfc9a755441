//! The self-improving half of the engine.
//!
//! Patterns extracted by Tier 3 are classified by confidence and either
//! merged straight into the template, queued for human review, or
//! discarded. Promotion runs off the call path: the caller-facing
//! result has already been returned by the time learning happens.

pub mod promoter;
pub mod window;

pub use promoter::{LearningOutcome, LearningPromoter};
pub use window::RollingWindow;
