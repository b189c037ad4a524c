//! Detail phase: fetch document bodies and extract their text.
//!
//! Work is every `discovered` document with a known source URL; placeholders
//! created by the relations phase have no URL yet and are skipped until a
//! later discovery enriches them. A failed item keeps `state = discovered`
//! and bumps its consecutive error counter; at the per-document ceiling the
//! document is parked as terminal `detail_failed` so one rotten document
//! cannot stall the phase forever.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ItemOutcome, PhaseError, PhaseProcessor, ValidationError};
use crate::config::PipelineConfig;
use crate::extract::TextExtractor;
use crate::fetch::Fetcher;
use crate::store::{Document, DocumentState, DocumentStore, NaturalKey, StoreTx};

/// Fetches and extracts content for discovered documents.
pub struct DetailProcessor {
    fetcher: Fetcher,
    extractor: Arc<dyn TextExtractor>,
    max_document_errors: i64,
}

impl DetailProcessor {
    /// Creates the processor from pipeline configuration and a text
    /// extractor.
    ///
    /// # Errors
    ///
    /// Returns a `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(
        config: &PipelineConfig,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            fetcher: Fetcher::new(&config.detail_retry, &config.user_agent)?,
            extractor,
            max_document_errors: config.max_document_errors,
        })
    }
}

/// Accepts a body that is either PDF (by magic) or decodable text.
fn validate_body(key: &NaturalKey, body: &[u8]) -> Result<(), ValidationError> {
    if body.is_empty() {
        return Err(ValidationError::EmptyBody {
            key: key.to_string(),
        });
    }
    if body.starts_with(b"%PDF") || std::str::from_utf8(body).is_ok() {
        return Ok(());
    }
    Err(ValidationError::UnrecognizedSignature {
        key: key.to_string(),
    })
}

#[async_trait]
impl PhaseProcessor for DetailProcessor {
    type Item = Document;

    fn name(&self) -> &'static str {
        "detail"
    }

    fn touches_remote(&self) -> bool {
        true
    }

    fn item_label(&self, item: &Self::Item) -> String {
        item.natural_key.clone()
    }

    async fn select_work(&self, store: &DocumentStore) -> Result<Vec<Self::Item>, PhaseError> {
        Ok(store.documents_in_state(DocumentState::Discovered).await?)
    }

    async fn process_one(
        &self,
        tx: &mut StoreTx<'_>,
        item: &Self::Item,
    ) -> Result<ItemOutcome, PhaseError> {
        let key = item
            .key()
            .map_err(|reason| PhaseError::corrupt_row(&item.natural_key, reason))?;

        if item.source_url.is_empty() {
            debug!(key = %key, "placeholder without source url, skipping");
            return Ok(ItemOutcome::Skipped);
        }

        let response = self.fetcher.get(&item.source_url).await?;
        validate_body(&key, &response.body)?;
        let text = self.extractor.extract_text(&response.body)?;

        let advanced = tx.mark_detailed(&key, &response.body, &text).await?;
        if !advanced {
            debug!(key = %key, "document already advanced, skipping");
            return Ok(ItemOutcome::Skipped);
        }

        info!(key = %key, bytes = response.body.len(), chars = text.len(), "document detailed");
        Ok(ItemOutcome::Succeeded)
    }

    async fn record_failure(
        &self,
        tx: &mut StoreTx<'_>,
        item: &Self::Item,
        error: &PhaseError,
    ) -> Result<(), PhaseError> {
        let key = item
            .key()
            .map_err(|reason| PhaseError::corrupt_row(&item.natural_key, reason))?;

        let state = tx.record_detail_error(&key, self.max_document_errors).await?;
        if state == DocumentState::DetailFailed {
            warn!(key = %key, %error, "document error ceiling reached, parking as detail_failed");
        }
        Ok(())
    }
}
