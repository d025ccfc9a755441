//! In-memory store backends.
//!
//! Templates live in a map behind a single RwLock, so the scenario
//! store can override `merge_learned` with a lock-held union instead of
//! the retrying read-modify-write the trait defaults to.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use introute_core::error::StoreError;
use introute_core::pattern::Pattern;
use introute_core::scenario::Template;
use introute_core::store::{ScenarioStore, SuggestionStore};
use introute_core::suggestion::{Suggestion, SuggestionStatus};

/// Scenario pool held in process memory.
#[derive(Default)]
pub struct InMemoryScenarioStore {
    templates: RwLock<HashMap<String, Template>>,
}

impl InMemoryScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a template, overwriting any existing one with the same id.
    pub async fn insert(&self, template: Template) {
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template);
    }
}

#[async_trait]
impl ScenarioStore for InMemoryScenarioStore {
    async fn find(&self, template_id: &str) -> Result<Template, StoreError> {
        self.templates
            .read()
            .await
            .get(template_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(template_id.to_string()))
    }

    async fn save(&self, template: &Template) -> Result<(), StoreError> {
        let mut templates = self.templates.write().await;
        match templates.get(&template.id) {
            Some(stored) if stored.revision != template.revision => Err(StoreError::Conflict {
                template_id: template.id.clone(),
                expected: template.revision,
            }),
            _ => {
                let mut next = template.clone();
                next.revision += 1;
                templates.insert(next.id.clone(), next);
                Ok(())
            }
        }
    }

    /// Lock-held union: no revision dance needed when the whole pool
    /// sits behind one RwLock.
    async fn merge_learned(
        &self,
        template_id: &str,
        pattern: &Pattern,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut templates = self.templates.write().await;
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| StoreError::NotFound(template_id.to_string()))?;
        if !template.apply_pattern(pattern) {
            return Ok(false);
        }
        template.stats.record(&pattern.kind, now);
        template.revision += 1;
        Ok(true)
    }
}

/// Suggestion queue held in process memory.
#[derive(Default)]
pub struct InMemorySuggestionStore {
    suggestions: RwLock<HashMap<String, Suggestion>>,
}

impl InMemorySuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All suggestions for a template, unordered.
    pub async fn all_for_template(&self, template_id: &str) -> Vec<Suggestion> {
        self.suggestions
            .read()
            .await
            .values()
            .filter(|s| s.template_id == template_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SuggestionStore for InMemorySuggestionStore {
    async fn find_pending(
        &self,
        template_id: &str,
        dedup_key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Suggestion>, StoreError> {
        let cutoff = now - window;
        Ok(self
            .suggestions
            .read()
            .await
            .values()
            .find(|s| {
                s.template_id == template_id
                    && s.dedup_key == dedup_key
                    && s.status == SuggestionStatus::Pending
                    && s.last_seen >= cutoff
            })
            .cloned())
    }

    async fn create(&self, suggestion: &Suggestion) -> Result<(), StoreError> {
        self.suggestions
            .write()
            .await
            .insert(suggestion.id.clone(), suggestion.clone());
        Ok(())
    }

    async fn increment_frequency(
        &self,
        suggestion_id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut suggestions = self.suggestions.write().await;
        let suggestion = suggestions
            .get_mut(suggestion_id)
            .ok_or_else(|| StoreError::NotFound(suggestion_id.to_string()))?;
        suggestion.frequency += 1;
        suggestion.last_seen = last_seen;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use introute_core::pattern::PatternKind;
    use introute_core::scenario::{Scenario, ScenarioCategory};

    fn template() -> Template {
        let mut t = Template::new("tpl_1", "Clinic");
        t.categories.push(ScenarioCategory {
            name: "booking".into(),
            scenarios: vec![Scenario::new("sc_1", "Book appointment")],
        });
        t
    }

    #[tokio::test]
    async fn find_missing_template_is_not_found() {
        let store = InMemoryScenarioStore::new();
        assert!(matches!(
            store.find("tpl_missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_bumps_revision() {
        let store = InMemoryScenarioStore::new();
        store.insert(template()).await;

        let t = store.find("tpl_1").await.unwrap();
        assert_eq!(t.revision, 0);
        store.save(&t).await.unwrap();
        assert_eq!(store.find("tpl_1").await.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let store = InMemoryScenarioStore::new();
        store.insert(template()).await;

        let stale = store.find("tpl_1").await.unwrap();
        let fresh = store.find("tpl_1").await.unwrap();
        store.save(&fresh).await.unwrap();

        assert!(matches!(
            store.save(&stale).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn merge_learned_is_idempotent() {
        let store = InMemoryScenarioStore::new();
        store.insert(template()).await;
        let now = Utc::now();
        let pattern = Pattern::new(
            PatternKind::Synonym {
                technical: "gastroscopy".into(),
                colloquial: "stomach check".into(),
            },
            0.9,
        );

        assert!(store.merge_learned("tpl_1", &pattern, now).await.unwrap());
        assert!(!store.merge_learned("tpl_1", &pattern, now).await.unwrap());

        let t = store.find("tpl_1").await.unwrap();
        assert!(t.synonyms["gastroscopy"].contains("stomach check"));
        assert_eq!(t.stats.synonyms_learned, 1, "no-op merge must not bump stats");
    }

    #[tokio::test]
    async fn find_pending_respects_window_and_status() {
        let store = InMemorySuggestionStore::new();
        let now = Utc::now();
        let pattern = Pattern::new(PatternKind::Filler { word: "um".into() }, 0.65);
        let key = pattern.dedup_key();

        let mut old = Suggestion::new("tpl_1", pattern.clone(), "call_1", now - Duration::hours(30));
        old.last_seen = now - Duration::hours(30);
        store.create(&old).await.unwrap();

        // Outside the 24h window.
        assert!(
            store
                .find_pending("tpl_1", &key, Duration::hours(24), now)
                .await
                .unwrap()
                .is_none()
        );

        let fresh = Suggestion::new("tpl_1", pattern.clone(), "call_2", now);
        store.create(&fresh).await.unwrap();
        let found = store
            .find_pending("tpl_1", &key, Duration::hours(24), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, fresh.id);

        // Approved rows never dedup.
        let mut approved = found.clone();
        approved.status = SuggestionStatus::Approved;
        store.create(&approved).await.unwrap();
        assert!(
            store
                .find_pending("tpl_1", &key, Duration::hours(24), now)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn increment_frequency_refreshes_last_seen() {
        let store = InMemorySuggestionStore::new();
        let now = Utc::now();
        let pattern = Pattern::new(PatternKind::Filler { word: "um".into() }, 0.65);
        let s = Suggestion::new("tpl_1", pattern, "call_1", now);
        store.create(&s).await.unwrap();

        let later = now + Duration::hours(2);
        store.increment_frequency(&s.id, later).await.unwrap();

        let all = store.all_for_template("tpl_1").await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].frequency, 2);
        assert_eq!(all[0].last_seen, later);
    }
}
