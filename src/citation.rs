//! Citation scanning: finds cross-reference markers in extracted text.
//!
//! The relations phase feeds each document's `content_text` through
//! [`CitationScanner::scan`] and gets back `(kind, target key)` candidates.
//! The scanner recognises an action verb followed by an instrument number,
//! e.g. `amends Law No. 2003/25` or `repeals Regulation 04/L-123`. Targets
//! inherit the citing document's jurisdiction; explicit cross-jurisdiction
//! citations are out of scope for the default grammar.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::store::{NaturalKey, RelationKind};

/// Citation pattern: verb, optional instrument noun, optional `No.`, then an
/// identifier like `2003/25` or `04/L-123`. The identifier must end on an
/// alphanumeric so sentence punctuation after a citation never leaks into
/// the key.
#[allow(clippy::expect_used)]
static CITATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(amends|amending|supplements|supplementing|repeals|repealing|annuls|annulling|references|referencing|cites|citing|pursuant\s+to)\s+(?:the\s+)?(?:law|act|regulation|decree|decision|directive)?\s*(?:no\.?\s*)?([0-9]{2,4}/[0-9A-Za-z](?:[0-9A-Za-z/.-]*[0-9A-Za-z])?)",
    )
    .expect("citation regex is valid") // Static pattern, safe to panic
});

/// One detected citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// Edge classification derived from the verb.
    pub kind: RelationKind,
    /// Natural key of the cited document.
    pub target: NaturalKey,
    /// The text span that matched, kept for audit.
    pub snippet: String,
}

/// Scans extracted document text for citations.
#[derive(Debug, Default, Clone, Copy)]
pub struct CitationScanner;

impl CitationScanner {
    /// Creates a scanner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Finds citations in `text`, attributing targets to the source's
    /// jurisdiction. Duplicate candidates and self-references are dropped.
    #[tracing::instrument(skip(self, text), fields(source = %source, text_len = text.len()))]
    #[must_use]
    pub fn scan(&self, source: &NaturalKey, text: &str) -> Vec<Citation> {
        let mut citations = Vec::new();
        let mut seen: HashSet<(RelationKind, String)> = HashSet::new();

        for cap in CITATION_PATTERN.captures_iter(text) {
            let (Some(full), Some(verb), Some(identifier)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };

            let kind = kind_of_verb(verb.as_str());
            let target = NaturalKey::new(&source.jurisdiction, identifier.as_str());

            if target == *source {
                trace!(snippet = full.as_str(), "dropping self-reference");
                continue;
            }
            if !seen.insert((kind, target.to_string())) {
                continue;
            }

            trace!(kind = %kind, target = %target, "found citation");
            citations.push(Citation {
                kind,
                target,
                snippet: full.as_str().to_string(),
            });
        }

        debug!(count = citations.len(), "citation scan complete");
        citations
    }
}

/// Maps a matched verb onto its edge classification.
fn kind_of_verb(verb: &str) -> RelationKind {
    let verb = verb.to_ascii_lowercase();
    if verb.starts_with("amend") || verb.starts_with("supplement") {
        RelationKind::Amends
    } else if verb.starts_with("repeal") || verb.starts_with("annul") {
        RelationKind::Repeals
    } else {
        RelationKind::References
    }
}
