//! Persistence seams for templates and suggestions.
//!
//! The scenario pool is the only shared mutable state in the system;
//! concurrent learners merge into it with commutative set-union
//! semantics. Stores that cannot express an atomic union surface
//! `StoreError::Conflict` from `save` so the default `merge_learned`
//! can retry the read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::StoreError;
use crate::pattern::Pattern;
use crate::scenario::Template;
use crate::suggestion::Suggestion;

/// How many times a conflicted merge is retried before giving up.
const MERGE_RETRIES: u32 = 3;

/// Persistence of the scenario pool.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    /// Load a template snapshot.
    async fn find(&self, template_id: &str) -> Result<Template, StoreError>;

    /// Persist a template.
    ///
    /// Must compare the template's `revision` against the stored one
    /// and return `StoreError::Conflict` on mismatch; on success the
    /// stored revision is bumped.
    async fn save(&self, template: &Template) -> Result<(), StoreError>;

    /// Atomically merge a learned pattern into a template.
    ///
    /// Returns whether the template actually changed (idempotent union:
    /// re-applying a known pattern is `Ok(false)`). Learning statistics
    /// are bumped in the same write when a change lands.
    ///
    /// The default implementation is a retrying read-modify-write over
    /// `find`/`save`; backends with native atomic updates may override.
    async fn merge_learned(
        &self,
        template_id: &str,
        pattern: &Pattern,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        for attempt in 0..MERGE_RETRIES {
            let mut template = self.find(template_id).await?;
            if !template.apply_pattern(pattern) {
                return Ok(false);
            }
            template.stats.record(&pattern.kind, now);
            match self.save(&template).await {
                Ok(()) => return Ok(true),
                Err(StoreError::Conflict { .. }) if attempt + 1 < MERGE_RETRIES => {
                    debug!(
                        template_id,
                        attempt, "Merge conflict, retrying with fresh snapshot"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Conflict {
            template_id: template_id.to_string(),
            expected: 0,
        })
    }
}

/// Persistence of the human-review suggestion queue.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Find a pending suggestion with the given dedup key whose
    /// `last_seen` falls within the window ending at `now`.
    async fn find_pending(
        &self,
        template_id: &str,
        dedup_key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Suggestion>, StoreError>;

    /// Insert a new suggestion row.
    async fn create(&self, suggestion: &Suggestion) -> Result<(), StoreError>;

    /// Bump the frequency counter and refresh `last_seen`.
    async fn increment_frequency(
        &self,
        suggestion_id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
