//! Batch executor: transactional, resumable driver for a phase run.
//!
//! Items run sequentially. Each item executes inside a savepoint so a failure
//! rolls back only that item's writes; the outer transaction is committed
//! every `commit_frequency` items, so an interrupted run leaves a valid
//! committed prefix that the next run's `select_work` simply skips.
//!
//! A streak of `max_consecutive_errors` item failures trips the circuit
//! breaker: the in-flight item's accounting is committed, then the run aborts
//! with partial statistics.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{ItemOutcome, PhaseError, PhaseProcessor};
use crate::config::{BatchConfig, PipelineConfig};
use crate::store::{DocumentStore, StoreError};

/// Counters for one phase run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStats {
    /// Items attempted.
    pub processed: u64,
    /// Items whose work was done and persisted.
    pub succeeded: u64,
    /// Items that failed (their writes rolled back).
    pub failed: u64,
    /// Items that needed no work.
    pub skipped: u64,
}

/// Errors that abort a phase run.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Too many consecutive item failures; the source is likely down or the
    /// pipeline misconfigured, so continuing would only burn the retry budget.
    #[error(
        "circuit breaker tripped after {consecutive} consecutive failures ({} items processed)",
        stats.processed
    )]
    CircuitBreaker {
        /// Length of the failure streak that tripped the breaker.
        consecutive: u32,
        /// Statistics up to and including the tripping item.
        stats: PhaseStats,
    },

    /// A transaction boundary (begin/commit) failed. Item-level store errors
    /// are counted per item instead.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Work selection or failure accounting failed outside any item's
    /// savepoint.
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Drives a [`PhaseProcessor`] over its selected work.
#[derive(Debug)]
pub struct BatchExecutor {
    batch: BatchConfig,
    server_delay: Duration,
    max_consecutive_errors: u32,
}

impl BatchExecutor {
    /// Creates an executor with the given cadence and circuit-breaker
    /// threshold.
    #[must_use]
    pub fn new(batch: BatchConfig, server_delay: Duration, max_consecutive_errors: u32) -> Self {
        Self {
            batch,
            server_delay,
            max_consecutive_errors,
        }
    }

    /// Creates an executor for one phase out of the pipeline configuration.
    #[must_use]
    pub fn for_phase(config: &PipelineConfig, batch: &BatchConfig) -> Self {
        Self::new(
            batch.clone(),
            config.server_delay(),
            config.max_consecutive_errors,
        )
    }

    /// Runs the phase to completion (or circuit-breaker abort).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::CircuitBreaker`] on a failure streak,
    /// [`ExecutorError::Phase`] if work selection or failure accounting
    /// fails, or [`ExecutorError::Store`] if a transaction boundary fails.
    #[instrument(skip(self, processor, store), fields(phase = processor.name()))]
    pub async fn run<P: PhaseProcessor>(
        &self,
        processor: &P,
        store: &DocumentStore,
    ) -> Result<PhaseStats, ExecutorError> {
        let items = processor.select_work(store).await?;
        info!(items = items.len(), "phase starting");

        let mut stats = PhaseStats::default();
        let mut consecutive = 0u32;
        let mut uncommitted = 0usize;
        let mut tx = store.begin().await?;

        for (index, item) in items.iter().enumerate() {
            // Pace remote-touching phases; independent of retry backoff.
            if index > 0 && processor.touches_remote() && !self.server_delay.is_zero() {
                tokio::time::sleep(self.server_delay).await;
            }

            stats.processed += 1;
            let label = processor.item_label(item);

            let result = {
                let mut savepoint = tx.savepoint().await?;
                match processor.process_one(&mut savepoint, item).await {
                    Ok(outcome) => {
                        savepoint.commit().await?;
                        Ok(outcome)
                    }
                    Err(error) => {
                        savepoint.rollback().await?;
                        Err(error)
                    }
                }
            };

            match result {
                Ok(ItemOutcome::Succeeded) => {
                    stats.succeeded += 1;
                    consecutive = 0;
                }
                Ok(ItemOutcome::Skipped) => {
                    stats.skipped += 1;
                }
                Err(error) => {
                    stats.failed += 1;
                    consecutive += 1;
                    warn!(item = %label, %error, consecutive, "item failed");
                    processor.record_failure(&mut tx, item, &error).await?;
                }
            }

            uncommitted += 1;
            if uncommitted >= self.batch.commit_frequency {
                tx.commit().await?;
                tx = store.begin().await?;
                uncommitted = 0;
            }

            if self.batch.progress_log_frequency > 0
                && (index + 1) % self.batch.progress_log_frequency == 0
            {
                info!(
                    processed = stats.processed,
                    total = items.len(),
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "phase progress"
                );
            }

            if consecutive >= self.max_consecutive_errors {
                tx.commit().await?;
                warn!(
                    consecutive,
                    processed = stats.processed,
                    "aborting phase run"
                );
                return Err(ExecutorError::CircuitBreaker { consecutive, stats });
            }
        }

        tx.commit().await?;
        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "phase complete"
        );
        Ok(stats)
    }
}
