//! Text extraction seam.
//!
//! Turning fetched bytes into searchable text is a capability concern, not a
//! pipeline concern: the detail phase talks to a [`TextExtractor`] trait
//! object and treats any failure as one more strike against the document.
//! [`Utf8TextExtractor`] is the shipped default; richer extractors (PDF and
//! friends) plug in behind the same trait.

use thiserror::Error;

/// Errors raised while extracting text from a document body.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The body's format is recognised but this extractor cannot handle it.
    #[error("unsupported format: {format}")]
    UnsupportedFormat {
        /// Short format label, e.g. `pdf`.
        format: String,
    },

    /// The body could not be decoded.
    #[error("decode failed: {reason}")]
    Decode {
        /// What went wrong.
        reason: String,
    },
}

impl ExtractError {
    /// Creates an [`ExtractError::UnsupportedFormat`].
    #[must_use]
    pub fn unsupported(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an [`ExtractError::Decode`].
    #[must_use]
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}

/// Extracts plain text from a fetched document body.
pub trait TextExtractor: Send + Sync {
    /// Returns the text content of `body`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the body cannot be decoded or the
    /// format is outside this extractor's capability.
    fn extract_text(&self, body: &[u8]) -> Result<String, ExtractError>;
}

/// Default extractor: strict UTF-8 text bodies only.
///
/// PDF bodies pass detail validation (the magic is a known signature) but are
/// reported as unsupported here, leaving them to a capable extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8TextExtractor;

impl TextExtractor for Utf8TextExtractor {
    fn extract_text(&self, body: &[u8]) -> Result<String, ExtractError> {
        if body.starts_with(b"%PDF") {
            return Err(ExtractError::unsupported("pdf"));
        }
        match std::str::from_utf8(body) {
            Ok(text) => Ok(text.to_string()),
            Err(e) => Err(ExtractError::decode(format!("invalid UTF-8: {e}"))),
        }
    }
}
