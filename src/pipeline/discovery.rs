//! Discovery phase: paginate category listings into document stubs.
//!
//! One work item is one configured category. Pages are fetched through the
//! retrying fetcher, parsed by the [`CatalogParser`] seam, and every listed
//! entry is upserted by natural key. Pagination stops at the catalog's own
//! "no next page" signal, at a page that yields nothing new, or at the
//! configured page ceiling (a guard against catalogs that advertise a next
//! page forever).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::{ItemOutcome, PhaseError, PhaseProcessor, ValidationError};
use crate::catalog::CatalogParser;
use crate::config::{Category, PipelineConfig};
use crate::fetch::{FetchError, Fetcher};
use crate::store::{DocumentStore, NaturalKey, StoreTx, StubUpsert};

use async_trait::async_trait;

/// Query parameter used to request a specific listing page.
const PAGE_PARAM: &str = "page";

/// Populates document stubs from configured category listings.
pub struct DiscoveryProcessor {
    fetcher: Fetcher,
    parser: Arc<dyn CatalogParser>,
    categories: Vec<Category>,
    max_pages_per_category: u32,
}

impl DiscoveryProcessor {
    /// Creates the processor from pipeline configuration and a catalog
    /// parser.
    ///
    /// # Errors
    ///
    /// Returns a `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(
        config: &PipelineConfig,
        parser: Arc<dyn CatalogParser>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            fetcher: Fetcher::new(&config.discovery_retry, &config.user_agent)?,
            parser,
            categories: config.categories.clone(),
            max_pages_per_category: config.max_pages_per_category,
        })
    }

    /// Fetches and upserts one listing page. Returns how many entries were
    /// new to this category run.
    async fn process_page(
        &self,
        tx: &mut StoreTx<'_>,
        category: &Category,
        page_number: u32,
        seen: &mut HashSet<NaturalKey>,
    ) -> Result<PageOutcome, PhaseError> {
        let url = page_url(&category.listing_url, page_number)?;
        let response = self.fetcher.get(&url).await?;
        let page = self.parser.parse_page(&response.body)?;

        let mut new_keys = 0usize;
        for entry in &page.entries {
            let key = NaturalKey::new(&category.jurisdiction, &entry.source_id);
            if !seen.insert(key.clone()) {
                continue;
            }
            new_keys += 1;

            let outcome = tx
                .upsert_stub(
                    &key,
                    Some(&category.name),
                    entry.title.as_deref(),
                    &entry.document_url,
                )
                .await?;
            if let StubUpsert::CategoryMismatch { existing } = outcome {
                // Category is immutable; keep the stored row and move on.
                let error = ValidationError::CategoryMismatch {
                    key: key.to_string(),
                    existing,
                    listed: category.name.clone(),
                };
                warn!(%error, "skipping listing entry");
            }
        }

        debug!(
            category = %category.name,
            page = page_number,
            entries = page.entries.len(),
            new_keys,
            has_next = page.has_next,
            "listing page processed"
        );
        Ok(PageOutcome {
            new_keys,
            has_next: page.has_next,
        })
    }
}

struct PageOutcome {
    new_keys: usize,
    has_next: bool,
}

#[async_trait]
impl PhaseProcessor for DiscoveryProcessor {
    type Item = Category;

    fn name(&self) -> &'static str {
        "discovery"
    }

    fn touches_remote(&self) -> bool {
        true
    }

    fn item_label(&self, item: &Self::Item) -> String {
        item.name.clone()
    }

    async fn select_work(&self, _store: &DocumentStore) -> Result<Vec<Self::Item>, PhaseError> {
        Ok(self.categories.clone())
    }

    async fn process_one(
        &self,
        tx: &mut StoreTx<'_>,
        category: &Self::Item,
    ) -> Result<ItemOutcome, PhaseError> {
        let mut seen: HashSet<NaturalKey> = HashSet::new();
        let mut pages_ok = 0u32;
        let mut first_error: Option<PhaseError> = None;

        for page_number in 1..=self.max_pages_per_category {
            match self.process_page(tx, category, page_number, &mut seen).await {
                Ok(outcome) => {
                    pages_ok += 1;
                    if outcome.new_keys == 0 || !outcome.has_next {
                        break;
                    }
                    if page_number == self.max_pages_per_category {
                        warn!(
                            category = %category.name,
                            ceiling = self.max_pages_per_category,
                            "page ceiling reached while catalog still advertises more"
                        );
                    }
                }
                Err(error) => {
                    // A later-page failure keeps the pages already ingested;
                    // the category only fails when nothing succeeded.
                    warn!(
                        category = %category.name,
                        page = page_number,
                        %error,
                        "stopping pagination"
                    );
                    first_error = Some(error);
                    break;
                }
            }
        }

        if pages_ok == 0 {
            return match first_error {
                Some(error) => Err(error),
                None => Ok(ItemOutcome::Skipped),
            };
        }

        info!(
            category = %category.name,
            pages = pages_ok,
            documents = seen.len(),
            "category discovered"
        );
        Ok(ItemOutcome::Succeeded)
    }
}

/// Injects the page number into a listing URL's query string.
fn page_url(listing_url: &str, page: u32) -> Result<String, PhaseError> {
    let mut url =
        Url::parse(listing_url).map_err(|_| FetchError::invalid_url(listing_url))?;
    url.query_pairs_mut()
        .append_pair(PAGE_PARAM, &page.to_string());
    Ok(url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_appends_page_parameter() {
        let url = page_url("https://example.com/laws", 3).unwrap();
        assert_eq!(url, "https://example.com/laws?page=3");
    }

    #[test]
    fn test_page_url_preserves_existing_query() {
        let url = page_url("https://example.com/laws?lang=en", 1).unwrap();
        assert_eq!(url, "https://example.com/laws?lang=en&page=1");
    }

    #[test]
    fn test_page_url_rejects_invalid_listing_url() {
        let result = page_url("not a url", 1);
        assert!(matches!(
            result,
            Err(PhaseError::Fetch(FetchError::InvalidUrl { .. }))
        ));
    }
}
