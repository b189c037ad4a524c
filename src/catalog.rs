//! Catalog page parsing seam.
//!
//! Discovery never looks at remote markup directly; it hands each fetched
//! listing page to a [`CatalogParser`] and works with the structured
//! [`CatalogPage`] it gets back. Site-specific scraping lives behind this
//! trait; [`JsonCatalogParser`] is the shipped default for catalogs that
//! expose a JSON listing endpoint.

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while parsing a catalog listing page.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The page body is not in the format this parser expects.
    #[error("malformed catalog page: {reason}")]
    Malformed {
        /// What failed to parse.
        reason: String,
    },

    /// An entry is missing a field discovery cannot proceed without.
    #[error("catalog entry missing {field}")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },
}

impl CatalogError {
    /// Creates a [`CatalogError::Malformed`].
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// One document as listed on a catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Identifier assigned by the source registry. Never empty.
    pub source_id: String,
    /// Listing title, when the catalog provides one.
    pub title: Option<String>,
    /// Where the document body can be fetched.
    pub document_url: String,
}

/// A parsed listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// Entries in listing order.
    pub entries: Vec<CatalogEntry>,
    /// Whether the catalog advertises a further page.
    pub has_next: bool,
}

/// Parses raw listing-page bytes into a [`CatalogPage`].
pub trait CatalogParser: Send + Sync {
    /// Parses one fetched page.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the body is not a valid page.
    fn parse_page(&self, body: &[u8]) -> Result<CatalogPage, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    source_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    document_url: String,
}

#[derive(Debug, Deserialize)]
struct JsonPage {
    entries: Vec<JsonEntry>,
    #[serde(default)]
    has_next: bool,
}

/// Default parser for JSON listing endpoints:
/// `{ "entries": [{ "source_id", "title", "document_url" }], "has_next" }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCatalogParser;

impl CatalogParser for JsonCatalogParser {
    fn parse_page(&self, body: &[u8]) -> Result<CatalogPage, CatalogError> {
        let page: JsonPage =
            serde_json::from_slice(body).map_err(|e| CatalogError::malformed(e.to_string()))?;

        let mut entries = Vec::with_capacity(page.entries.len());
        for entry in page.entries {
            if entry.source_id.trim().is_empty() {
                return Err(CatalogError::MissingField {
                    field: "source_id",
                });
            }
            entries.push(CatalogEntry {
                source_id: entry.source_id,
                title: entry.title.filter(|t| !t.trim().is_empty()),
                document_url: entry.document_url,
            });
        }

        Ok(CatalogPage {
            entries,
            has_next: page.has_next,
        })
    }
}
