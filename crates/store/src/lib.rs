//! Persistence backends for the scenario pool and suggestion queue.
//!
//! Two implementations of the core store traits:
//! - `memory` — in-process maps behind an RwLock, for tests and
//!   single-shot CLI runs
//! - `sqlite` — durable SQLite file (or `sqlite::memory:`) via sqlx,
//!   with revision-checked template writes

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryScenarioStore, InMemorySuggestionStore};
pub use sqlite::SqliteStore;
