//! Human-review queue entries for medium-confidence patterns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pattern::Pattern;

/// Review state of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A durable, deduplicated queue entry awaiting human approval.
///
/// Within the dedup window, a repeat occurrence of the same pattern for
/// the same template bumps `frequency` on the existing row instead of
/// inserting a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub template_id: String,
    pub pattern: Pattern,
    /// Stable identity key; see `Pattern::dedup_key`.
    pub dedup_key: String,
    /// How many times this pattern has been observed.
    pub frequency: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: SuggestionStatus,
    /// The call that first produced this suggestion.
    pub source_call_id: String,
}

impl Suggestion {
    /// Create a fresh pending suggestion with frequency 1.
    pub fn new(
        template_id: impl Into<String>,
        pattern: Pattern,
        source_call_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let dedup_key = pattern.dedup_key();
        Self {
            id: Uuid::new_v4().to_string(),
            template_id: template_id.into(),
            pattern,
            dedup_key,
            frequency: 1,
            first_seen: now,
            last_seen: now,
            status: SuggestionStatus::Pending,
            source_call_id: source_call_id.into(),
        }
    }
}
