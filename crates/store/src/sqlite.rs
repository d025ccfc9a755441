//! SQLite backend for templates and suggestions.
//!
//! Uses a single database file with two tables:
//! - `templates` — template documents as JSON plus a revision counter
//! - `suggestions` — one row per deduplicated pending pattern
//!
//! Template writes are revision-checked: `save` only lands when the
//! stored revision still matches the snapshot the caller read, which is
//! what lets the default `merge_learned` retry loop work across
//! processes sharing one database file.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use introute_core::error::StoreError;
use introute_core::pattern::Pattern;
use introute_core::scenario::Template;
use introute_core::store::{ScenarioStore, SuggestionStore};
use introute_core::suggestion::{Suggestion, SuggestionStatus};

/// Durable SQLite store implementing both persistence traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                id       TEXT PRIMARY KEY,
                doc      TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("templates table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS suggestions (
                id             TEXT PRIMARY KEY,
                template_id    TEXT NOT NULL,
                pattern        TEXT NOT NULL,
                dedup_key      TEXT NOT NULL,
                frequency      INTEGER NOT NULL DEFAULT 1,
                first_seen     TEXT NOT NULL,
                last_seen      TEXT NOT NULL,
                status         TEXT NOT NULL DEFAULT 'pending',
                source_call_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("suggestions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_suggestions_dedup
             ON suggestions(template_id, dedup_key, status)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("dedup index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_suggestion(row: &sqlx::sqlite::SqliteRow) -> Result<Suggestion, StoreError> {
        let pattern_json: String = row
            .try_get("pattern")
            .map_err(|e| StoreError::Storage(format!("pattern column: {e}")))?;
        let pattern: Pattern = serde_json::from_str(&pattern_json)
            .map_err(|e| StoreError::Serialization(format!("pattern document: {e}")))?;

        let status_str: String = row
            .try_get("status")
            .map_err(|e| StoreError::Storage(format!("status column: {e}")))?;
        let status = match status_str.as_str() {
            "approved" => SuggestionStatus::Approved,
            "rejected" => SuggestionStatus::Rejected,
            _ => SuggestionStatus::Pending,
        };

        let first_seen = Self::parse_timestamp(row, "first_seen")?;
        let last_seen = Self::parse_timestamp(row, "last_seen")?;
        let frequency: i64 = row
            .try_get("frequency")
            .map_err(|e| StoreError::Storage(format!("frequency column: {e}")))?;

        Ok(Suggestion {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::Storage(format!("id column: {e}")))?,
            template_id: row
                .try_get("template_id")
                .map_err(|e| StoreError::Storage(format!("template_id column: {e}")))?,
            pattern,
            dedup_key: row
                .try_get("dedup_key")
                .map_err(|e| StoreError::Storage(format!("dedup_key column: {e}")))?,
            frequency: frequency as u32,
            first_seen,
            last_seen,
            status,
            source_call_id: row
                .try_get("source_call_id")
                .map_err(|e| StoreError::Storage(format!("source_call_id column: {e}")))?,
        })
    }

    fn parse_timestamp(
        row: &sqlx::sqlite::SqliteRow,
        column: &str,
    ) -> Result<DateTime<Utc>, StoreError> {
        let raw: String = row
            .try_get(column)
            .map_err(|e| StoreError::Storage(format!("{column} column: {e}")))?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Serialization(format!("{column} timestamp: {e}")))
    }
}

#[async_trait]
impl ScenarioStore for SqliteStore {
    async fn find(&self, template_id: &str) -> Result<Template, StoreError> {
        let row = sqlx::query("SELECT doc, revision FROM templates WHERE id = ?1")
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT template: {e}")))?
            .ok_or_else(|| StoreError::NotFound(template_id.to_string()))?;

        let doc: String = row
            .try_get("doc")
            .map_err(|e| StoreError::Storage(format!("doc column: {e}")))?;
        let revision: i64 = row
            .try_get("revision")
            .map_err(|e| StoreError::Storage(format!("revision column: {e}")))?;

        let mut template: Template = serde_json::from_str(&doc)
            .map_err(|e| StoreError::Serialization(format!("template document: {e}")))?;
        // The revision column is authoritative.
        template.revision = revision as u64;
        Ok(template)
    }

    async fn save(&self, template: &Template) -> Result<(), StoreError> {
        let next_revision = template.revision + 1;
        let mut doc = template.clone();
        doc.revision = next_revision;
        let json = serde_json::to_string(&doc)
            .map_err(|e| StoreError::Serialization(format!("template document: {e}")))?;

        let updated = sqlx::query(
            "UPDATE templates SET doc = ?1, revision = ?2 WHERE id = ?3 AND revision = ?4",
        )
        .bind(&json)
        .bind(next_revision as i64)
        .bind(&template.id)
        .bind(template.revision as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE template: {e}")))?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        // Either the row does not exist yet or another writer got there
        // first. Try the insert path; a unique violation means conflict.
        let inserted = sqlx::query(
            "INSERT INTO templates (id, doc, revision) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&template.id)
        .bind(&json)
        .bind(next_revision as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT template: {e}")))?;

        if inserted.rows_affected() > 0 {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                template_id: template.id.clone(),
                expected: template.revision,
            })
        }
    }
}

#[async_trait]
impl SuggestionStore for SqliteStore {
    async fn find_pending(
        &self,
        template_id: &str,
        dedup_key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Suggestion>, StoreError> {
        let cutoff = (now - window).to_rfc3339();
        let row = sqlx::query(
            r#"
            SELECT * FROM suggestions
            WHERE template_id = ?1 AND dedup_key = ?2
              AND status = 'pending' AND last_seen >= ?3
            ORDER BY last_seen DESC
            LIMIT 1
            "#,
        )
        .bind(template_id)
        .bind(dedup_key)
        .bind(&cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SELECT suggestion: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_suggestion(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, suggestion: &Suggestion) -> Result<(), StoreError> {
        let pattern_json = serde_json::to_string(&suggestion.pattern)
            .map_err(|e| StoreError::Serialization(format!("pattern document: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO suggestions
                (id, template_id, pattern, dedup_key, frequency,
                 first_seen, last_seen, status, source_call_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&suggestion.id)
        .bind(&suggestion.template_id)
        .bind(&pattern_json)
        .bind(&suggestion.dedup_key)
        .bind(suggestion.frequency as i64)
        .bind(suggestion.first_seen.to_rfc3339())
        .bind(suggestion.last_seen.to_rfc3339())
        .bind(suggestion.status.to_string())
        .bind(&suggestion.source_call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT suggestion: {e}")))?;

        debug!(suggestion_id = %suggestion.id, "Suggestion created");
        Ok(())
    }

    async fn increment_frequency(
        &self,
        suggestion_id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE suggestions SET frequency = frequency + 1, last_seen = ?1 WHERE id = ?2",
        )
        .bind(last_seen.to_rfc3339())
        .bind(suggestion_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE suggestion: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(suggestion_id.to_string()));
        }
        Ok(())
    }
}
