//! Document and relation types, plus lifecycle state definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a document.
///
/// Transitions move strictly forward and are enforced by guarded UPDATEs in
/// the store:
///
/// ```text
/// discovered --detail ok--> detailed --relations ok--> related
/// discovered --error ceiling--> detail_failed   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// Known by natural key only; content not yet fetched.
    Discovered,
    /// Content fetched and text extracted.
    Detailed,
    /// Cross-references extracted into the relation graph.
    Related,
    /// Detail extraction failed past the per-document ceiling. Terminal.
    DetailFailed,
}

impl DocumentState {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Detailed => "detailed",
            Self::Related => "related",
            Self::DetailFailed => "detail_failed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "detailed" => Ok(Self::Detailed),
            "related" => Ok(Self::Related),
            "detail_failed" => Ok(Self::DetailFailed),
            _ => Err(format!("invalid document state: {s}")),
        }
    }
}

/// Globally unique, immutable identity of a document across runs:
/// jurisdiction code plus the source registry's own identifier.
///
/// Stored as `jurisdiction:source_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Jurisdiction code, e.g. `ks` or `eu`.
    pub jurisdiction: String,
    /// Identifier assigned by the source registry.
    pub source_id: String,
}

impl NaturalKey {
    /// Creates a key from its two halves.
    #[must_use]
    pub fn new(jurisdiction: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.jurisdiction, self.source_id)
    }
}

impl FromStr for NaturalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((jurisdiction, source_id))
                if !jurisdiction.is_empty() && !source_id.is_empty() =>
            {
                Ok(Self::new(jurisdiction, source_id))
            }
            _ => Err(format!("invalid natural key: {s}")),
        }
    }
}

/// Directed edge classification between two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Source modifies the target.
    Amends,
    /// Source invalidates the target.
    Repeals,
    /// Source cites the target without changing it.
    References,
}

impl RelationKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amends => "amends",
            Self::Repeals => "repeals",
            Self::References => "references",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amends" => Ok(Self::Amends),
            "repeals" => Ok(Self::Repeals),
            "references" => Ok(Self::References),
            _ => Err(format!("invalid relation kind: {s}")),
        }
    }
}

/// One legal instrument, as stored.
#[derive(Debug, Clone, FromRow)]
pub struct Document {
    /// Row identifier.
    pub id: i64,
    /// `jurisdiction:source_id`, unique (parsed via `key()`).
    pub natural_key: String,
    /// Jurisdiction half of the key.
    pub jurisdiction: String,
    /// Source-registry identifier half of the key.
    pub source_id: String,
    /// Classification assigned at discovery; NULL for placeholders.
    pub category: Option<String>,
    /// Listing title when known.
    pub title: Option<String>,
    /// Where the document body lives; empty for bare placeholders.
    pub source_url: String,
    /// Lifecycle state (stored as text, parsed via `state()`).
    #[sqlx(rename = "state")]
    pub state_str: String,
    /// Raw fetched body; populated by the detail phase.
    pub content_blob: Option<Vec<u8>>,
    /// Extracted text; populated by the detail phase.
    pub content_text: Option<String>,
    /// Consecutive failures for this document; reset on success.
    pub error_count: i64,
    /// Last time discovery observed this document.
    pub last_seen_at: Option<String>,
    /// When the detail phase completed.
    pub detailed_at: Option<String>,
    /// Row creation time.
    pub created_at: String,
}

impl Document {
    /// Parses the stored state string.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored value is not a known state, which
    /// indicates schema drift.
    pub fn state(&self) -> Result<DocumentState, String> {
        self.state_str.parse()
    }

    /// Parses the stored natural key.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored value is not `jurisdiction:source_id`.
    pub fn key(&self) -> Result<NaturalKey, String> {
        self.natural_key.parse()
    }
}

/// A directed edge in the cross-reference graph.
#[derive(Debug, Clone, FromRow)]
pub struct Relation {
    /// Row identifier.
    pub id: i64,
    /// Natural key of the citing document.
    pub source_key: String,
    /// Natural key of the cited document.
    pub target_key: String,
    /// Edge classification (stored as text).
    #[sqlx(rename = "relation_kind")]
    pub kind_str: String,
    /// The citation text that produced this edge.
    pub snippet: Option<String>,
    /// Row creation time.
    pub created_at: String,
}

impl Relation {
    /// Parses the stored relation kind.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored value is not a known kind.
    pub fn kind(&self) -> Result<RelationKind, String> {
        self.kind_str.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_state_round_trips_through_strings() {
        for state in [
            DocumentState::Discovered,
            DocumentState::Detailed,
            DocumentState::Related,
            DocumentState::DetailFailed,
        ] {
            assert_eq!(state.as_str().parse::<DocumentState>().unwrap(), state);
        }
    }

    #[test]
    fn test_document_state_rejects_unknown() {
        assert!("pending".parse::<DocumentState>().is_err());
    }

    #[test]
    fn test_natural_key_display_and_parse() {
        let key = NaturalKey::new("ks", "2016-05");
        assert_eq!(key.to_string(), "ks:2016-05");
        assert_eq!("ks:2016-05".parse::<NaturalKey>().unwrap(), key);
    }

    #[test]
    fn test_natural_key_rejects_missing_halves() {
        assert!("no-separator".parse::<NaturalKey>().is_err());
        assert!(":id".parse::<NaturalKey>().is_err());
        assert!("ks:".parse::<NaturalKey>().is_err());
    }

    #[test]
    fn test_natural_key_source_id_may_contain_colon() {
        let key = "eu:CELEX:32016R0679".parse::<NaturalKey>().unwrap();
        assert_eq!(key.jurisdiction, "eu");
        assert_eq!(key.source_id, "CELEX:32016R0679");
    }

    #[test]
    fn test_relation_kind_round_trips() {
        for kind in [
            RelationKind::Amends,
            RelationKind::Repeals,
            RelationKind::References,
        ] {
            assert_eq!(kind.as_str().parse::<RelationKind>().unwrap(), kind);
        }
    }
}
