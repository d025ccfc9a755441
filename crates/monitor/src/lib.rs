//! Observability for the resolution pipeline.
//!
//! The monitor watches every routing attempt — tier used, latency,
//! confidence, spend — and raises throttled alerts through the
//! Notifier. Observation is fire-and-forget: nothing in this crate can
//! error back into the call path.

pub mod monitor;
pub mod throttle;

pub use monitor::{CallObservation, CostAndHealthMonitor};
pub use throttle::AlertThrottle;
