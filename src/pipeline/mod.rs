//! Pipeline phases and the batch executor that drives them.
//!
//! Each phase implements [`PhaseProcessor`]: a deterministic work query plus
//! a per-item handler. The [`executor::BatchExecutor`] owns everything else
//! that is common to all phases (transactions, commit cadence, savepoints,
//! progress logging, the consecutive-failure circuit breaker, server-delay
//! pacing), so the processors stay small.

pub mod detail;
pub mod discovery;
pub mod executor;
pub mod relations;

pub use detail::DetailProcessor;
pub use discovery::DiscoveryProcessor;
pub use executor::{BatchExecutor, ExecutorError, PhaseStats};
pub use relations::RelationsProcessor;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::extract::ExtractError;
use crate::fetch::FetchError;
use crate::store::{DocumentStore, StoreError, StoreTx};

/// Content or data that is well-formed transport-wise but wrong for the
/// pipeline. Never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A fetched document body was empty.
    #[error("{key}: fetched body is empty")]
    EmptyBody {
        /// Natural key of the document.
        key: String,
    },

    /// A fetched body matches no recognised signature (PDF magic, UTF-8).
    #[error("{key}: unrecognized content signature")]
    UnrecognizedSignature {
        /// Natural key of the document.
        key: String,
    },

    /// Discovery listed a document under a category differing from the one
    /// already stored. Category is immutable once set.
    #[error("{key}: category mismatch, stored {existing:?}, listed {listed:?}")]
    CategoryMismatch {
        /// Natural key of the document.
        key: String,
        /// Category already stored.
        existing: String,
        /// Category the listing claimed.
        listed: String,
    },
}

/// Umbrella error at the processor boundary.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Remote fetch failed (after retries, or permanently).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A catalog page could not be parsed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Content failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Text extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PhaseError {
    /// Wraps a stored-field parse failure (state or key drift) as a corrupt
    /// row error.
    #[must_use]
    pub fn corrupt_row(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store(StoreError::CorruptRow {
            key: key.into(),
            reason: reason.into(),
        })
    }
}

/// Result of processing one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item's work was done and persisted.
    Succeeded,
    /// The item needed no work (already advanced, or not actionable yet).
    Skipped,
}

/// One pipeline phase.
///
/// `select_work` must be deterministic and state-filtered so that re-running
/// a phase after an interruption touches only the unfinished items.
#[async_trait]
pub trait PhaseProcessor: Send + Sync {
    /// Unit of work for this phase.
    type Item: Send + Sync;

    /// Phase name, used in logs and stats lines.
    fn name(&self) -> &'static str;

    /// Whether processing an item contacts the remote catalog. The executor
    /// paces remote-touching phases with the configured server delay.
    fn touches_remote(&self) -> bool;

    /// Short identity of an item for log lines.
    fn item_label(&self, item: &Self::Item) -> String;

    /// Selects the items this run should process, in a stable order.
    async fn select_work(&self, store: &DocumentStore) -> Result<Vec<Self::Item>, PhaseError>;

    /// Processes one item inside the given savepoint. On `Err` the executor
    /// rolls the savepoint back, discarding all of this item's writes.
    async fn process_one(
        &self,
        tx: &mut StoreTx<'_>,
        item: &Self::Item,
    ) -> Result<ItemOutcome, PhaseError>;

    /// Records a failed item's accounting (e.g. per-document error counters)
    /// in the outer transaction, after the item's savepoint was rolled back.
    ///
    /// The default records nothing.
    async fn record_failure(
        &self,
        tx: &mut StoreTx<'_>,
        item: &Self::Item,
        error: &PhaseError,
    ) -> Result<(), PhaseError> {
        let _ = (tx, item, error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages_name_the_document() {
        let error = ValidationError::CategoryMismatch {
            key: "ks:2003/25".to_string(),
            existing: "laws".to_string(),
            listed: "decrees".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("ks:2003/25"));
        assert!(msg.contains("laws"));
        assert!(msg.contains("decrees"));
    }

    #[test]
    fn test_phase_error_is_transparent_over_validation() {
        let error = PhaseError::from(ValidationError::EmptyBody {
            key: "ks:1".to_string(),
        });
        assert_eq!(error.to_string(), "ks:1: fetched body is empty");
    }
}
