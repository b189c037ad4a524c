//! Document store: persistence for documents and their relation graph.
//!
//! All pipeline mutations go through [`StoreTx`], a transaction handle with
//! natural-key upserts and guarded state transitions. The guards (`WHERE
//! state = ...`) are what make document state monotonically forward: a retry
//! can re-run any phase and never regress or skip a state.
//!
//! Reads used for work selection live on [`DocumentStore`] and are
//! deterministic (ordered by natural key), which keeps repeated phase runs
//! resumable.

mod document;
mod error;

pub use document::{Document, DocumentState, NaturalKey, Relation, RelationKind};
pub use error::StoreError;

use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, instrument};

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a discovery stub upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubUpsert {
    /// A new document row was created.
    Inserted,
    /// An existing row was refreshed (`last_seen_at`, missing fields).
    Updated,
    /// The row already carries a different category; nothing was written.
    /// Category is immutable once set, so the caller treats this as a
    /// validation failure rather than overwriting.
    CategoryMismatch {
        /// The category already stored.
        existing: String,
    },
}

/// Store facade over the database.
///
/// Cheap to clone; mutations require a transaction from [`DocumentStore::begin`].
#[derive(Debug, Clone)]
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    /// Creates a store over the given database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens a transaction for a run of mutations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<StoreTx<'static>> {
        Ok(StoreTx {
            tx: self.db.pool().begin().await?,
        })
    }

    /// Returns all documents in `state`, ordered by natural key.
    ///
    /// This is the resumable work query: after a partial run, re-invoking a
    /// phase selects exactly the documents that did not advance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn documents_in_state(&self, state: DocumentState) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE state = ? ORDER BY natural_key",
        )
        .bind(state.as_str())
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Looks up a single document by natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get_document(&self, key: &NaturalKey) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE natural_key = ?")
            .bind(key.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row)
    }

    /// Returns all outgoing relations of a document, ordered for stable
    /// inspection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn relations_from(&self, key: &NaturalKey) -> Result<Vec<Relation>> {
        let rows = sqlx::query_as::<_, Relation>(
            "SELECT * FROM relations WHERE source_key = ? ORDER BY target_key, relation_kind",
        )
        .bind(key.to_string())
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Counts documents, total and per the given state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn count_documents(&self, state: Option<DocumentState>) -> Result<i64> {
        let count: (i64,) = match state {
            Some(state) => {
                sqlx::query_as("SELECT COUNT(*) FROM documents WHERE state = ?")
                    .bind(state.as_str())
                    .fetch_one(self.db.pool())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM documents")
                    .fetch_one(self.db.pool())
                    .await?
            }
        };
        Ok(count.0)
    }

    /// Counts relation edges.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn count_relations(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM relations")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count.0)
    }
}

/// An open transaction (or savepoint) over the document store.
///
/// Dropping without [`StoreTx::commit`] rolls back, which the batch executor
/// relies on to discard partial writes of a failed item.
#[derive(Debug)]
pub struct StoreTx<'c> {
    tx: Transaction<'c, Sqlite>,
}

impl StoreTx<'_> {
    /// Opens a nested savepoint; committing or dropping it affects only the
    /// writes made through it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the savepoint cannot be opened.
    pub async fn savepoint(&mut self) -> Result<StoreTx<'_>> {
        Ok(StoreTx {
            tx: sqlx::Connection::begin(&mut *self.tx).await?,
        })
    }

    /// Commits this transaction or savepoint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the commit fails; uncommitted
    /// writes are rolled back by the driver.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Explicitly rolls back. Equivalent to dropping, kept for clarity at
    /// call sites.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the rollback statement fails.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    /// Upserts a discovery stub by natural key.
    ///
    /// A colliding key is refreshed, never duplicated: `last_seen_at` is
    /// bumped, an empty `source_url` or missing title/category is filled in,
    /// and `state` is left untouched so retries never regress progress.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    #[instrument(skip(self, title), fields(key = %key))]
    pub async fn upsert_stub(
        &mut self,
        key: &NaturalKey,
        category: Option<&str>,
        title: Option<&str>,
        source_url: &str,
    ) -> Result<StubUpsert> {
        let existing = sqlx::query("SELECT category FROM documents WHERE natural_key = ?")
            .bind(key.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = existing else {
            sqlx::query(
                "INSERT INTO documents
                     (natural_key, jurisdiction, source_id, category, title, source_url,
                      state, last_seen_at)
                 VALUES (?, ?, ?, ?, ?, ?, 'discovered', datetime('now'))",
            )
            .bind(key.to_string())
            .bind(&key.jurisdiction)
            .bind(&key.source_id)
            .bind(category)
            .bind(title)
            .bind(source_url)
            .execute(&mut *self.tx)
            .await?;
            debug!("inserted document stub");
            return Ok(StubUpsert::Inserted);
        };

        let stored: Option<String> = row.get("category");
        if let (Some(stored), Some(provided)) = (stored.as_deref(), category) {
            if stored != provided {
                return Ok(StubUpsert::CategoryMismatch {
                    existing: stored.to_string(),
                });
            }
        }

        sqlx::query(
            "UPDATE documents
             SET last_seen_at = datetime('now'),
                 source_url = CASE WHEN source_url = '' THEN ?1 ELSE source_url END,
                 title = COALESCE(title, ?2),
                 category = COALESCE(category, ?3)
             WHERE natural_key = ?4",
        )
        .bind(source_url)
        .bind(title)
        .bind(category)
        .bind(key.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(StubUpsert::Updated)
    }

    /// Creates a bare placeholder document so a relation edge has a row to
    /// point at. No-op if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn ensure_placeholder(
        &mut self,
        key: &NaturalKey,
        source_url: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO documents (natural_key, jurisdiction, source_id, source_url, state)
             VALUES (?, ?, ?, ?, 'discovered')
             ON CONFLICT (natural_key) DO NOTHING",
        )
        .bind(key.to_string())
        .bind(&key.jurisdiction)
        .bind(&key.source_id)
        .bind(source_url.unwrap_or(""))
        .execute(&mut *self.tx)
        .await?;
        let created = result.rows_affected() > 0;
        if created {
            debug!("created placeholder document");
        }
        Ok(created)
    }

    /// Promotes a document to `detailed`, storing its content.
    ///
    /// Guarded on `state = 'discovered'`: returns `false` without writing if
    /// the document already advanced (idempotent re-run) or is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if the key has no row,
    /// or [`StoreError::Database`] on query failure.
    #[instrument(skip(self, content_blob, content_text), fields(key = %key))]
    pub async fn mark_detailed(
        &mut self,
        key: &NaturalKey,
        content_blob: &[u8],
        content_text: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents
             SET state = 'detailed',
                 content_blob = ?,
                 content_text = ?,
                 error_count = 0,
                 detailed_at = datetime('now')
             WHERE natural_key = ? AND state = 'discovered'",
        )
        .bind(content_blob)
        .bind(content_text)
        .bind(key.to_string())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.require_exists(key).await?;
        Ok(false)
    }

    /// Promotes a document to `related`. Guarded on `state = 'detailed'`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if the key has no row,
    /// or [`StoreError::Database`] on query failure.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn mark_related(&mut self, key: &NaturalKey) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents
             SET state = 'related', error_count = 0
             WHERE natural_key = ? AND state = 'detailed'",
        )
        .bind(key.to_string())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.require_exists(key).await?;
        Ok(false)
    }

    /// Records a detail failure: increments the document's consecutive error
    /// count and, once it reaches `ceiling`, marks the document terminally
    /// `detail_failed`. Returns the resulting state.
    ///
    /// The failed attempt itself never changes a non-`discovered` state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if the key has no row,
    /// or [`StoreError::Database`] on query failure.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn record_detail_error(
        &mut self,
        key: &NaturalKey,
        ceiling: i64,
    ) -> Result<DocumentState> {
        sqlx::query(
            "UPDATE documents
             SET error_count = error_count + 1
             WHERE natural_key = ? AND state = 'discovered'",
        )
        .bind(key.to_string())
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            "UPDATE documents
             SET state = 'detail_failed'
             WHERE natural_key = ? AND state = 'discovered' AND error_count >= ?",
        )
        .bind(key.to_string())
        .bind(ceiling)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query("SELECT state FROM documents WHERE natural_key = ?")
            .bind(key.to_string())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| StoreError::DocumentNotFound(key.to_string()))?;
        let state: String = row.get("state");
        state.parse().map_err(|reason| StoreError::CorruptRow {
            key: key.to_string(),
            reason,
        })
    }

    /// Inserts a relation edge; the composite uniqueness of
    /// `(source, target, kind)` makes re-extraction a no-op.
    ///
    /// Returns `true` if a new edge was created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure (including a
    /// missing endpoint row, rejected by the foreign key).
    #[instrument(skip(self, snippet), fields(source = %source, target = %target, kind = %kind))]
    pub async fn upsert_relation(
        &mut self,
        source: &NaturalKey,
        target: &NaturalKey,
        kind: RelationKind,
        snippet: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO relations (source_key, target_key, relation_kind, snippet)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (source_key, target_key, relation_kind) DO NOTHING",
        )
        .bind(source.to_string())
        .bind(target.to_string())
        .bind(kind.as_str())
        .bind(snippet)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Errors with [`StoreError::DocumentNotFound`] unless the key exists.
    async fn require_exists(&mut self, key: &NaturalKey) -> Result<()> {
        let exists = sqlx::query("SELECT 1 FROM documents WHERE natural_key = ?")
            .bind(key.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::DocumentNotFound(key.to_string()));
        }
        Ok(())
    }
}
