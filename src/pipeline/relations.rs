//! Relations phase: materialize the cross-reference graph.
//!
//! Work is every `detailed` document. The citation scanner yields candidate
//! edges from the extracted text; each target is ensured as a placeholder
//! row first so no edge ever dangles, then the edge is inserted with
//! conflict-free semantics. Re-running the phase over the same text yields
//! zero new edges.
//!
//! This phase never touches the network, so the executor applies no server
//! delay.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ItemOutcome, PhaseError, PhaseProcessor};
use crate::citation::CitationScanner;
use crate::store::{Document, DocumentState, DocumentStore, StoreTx};

/// Extracts citation edges from detailed documents.
#[derive(Debug, Default)]
pub struct RelationsProcessor {
    scanner: CitationScanner,
}

impl RelationsProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scanner: CitationScanner::new(),
        }
    }
}

#[async_trait]
impl PhaseProcessor for RelationsProcessor {
    type Item = Document;

    fn name(&self) -> &'static str {
        "relations"
    }

    fn touches_remote(&self) -> bool {
        false
    }

    fn item_label(&self, item: &Self::Item) -> String {
        item.natural_key.clone()
    }

    async fn select_work(&self, store: &DocumentStore) -> Result<Vec<Self::Item>, PhaseError> {
        Ok(store.documents_in_state(DocumentState::Detailed).await?)
    }

    async fn process_one(
        &self,
        tx: &mut StoreTx<'_>,
        item: &Self::Item,
    ) -> Result<ItemOutcome, PhaseError> {
        let key = item
            .key()
            .map_err(|reason| PhaseError::corrupt_row(&item.natural_key, reason))?;

        let text = item.content_text.as_deref().unwrap_or("");
        let citations = self.scanner.scan(&key, text);

        let mut new_edges = 0usize;
        for citation in &citations {
            tx.ensure_placeholder(&citation.target, None).await?;
            let inserted = tx
                .upsert_relation(&key, &citation.target, citation.kind, Some(citation.snippet.as_str()))
                .await?;
            if inserted {
                new_edges += 1;
            } else {
                debug!(
                    source = %key,
                    target = %citation.target,
                    kind = %citation.kind,
                    "edge already present"
                );
            }
        }

        let advanced = tx.mark_related(&key).await?;
        if !advanced {
            debug!(key = %key, "document already advanced, skipping");
            return Ok(ItemOutcome::Skipped);
        }

        info!(
            key = %key,
            citations = citations.len(),
            new_edges,
            "document related"
        );
        Ok(ItemOutcome::Succeeded)
    }
}
