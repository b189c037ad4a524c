//! Lexgraph Core Library
//!
//! This library implements a phased ingestion pipeline that turns remote
//! legal catalogs into a consistent, resumable, deduplicated document store
//! with a cross-reference graph.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`store`] - Document store: upserts, state transitions, relation graph
//! - [`fetch`] - Retrying HTTP fetcher with backoff and Retry-After support
//! - [`pipeline`] - Phase contract, batch executor, and the three phases
//! - [`catalog`] - Listing-page parsing seam
//! - [`extract`] - Text extraction seam
//! - [`citation`] - Citation scanning for cross-references
//! - [`config`] - Explicit pipeline configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod citation;
pub mod config;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod store;

// Re-export commonly used types
pub use catalog::{CatalogEntry, CatalogError, CatalogPage, CatalogParser, JsonCatalogParser};
pub use citation::{Citation, CitationScanner};
pub use config::{BatchConfig, Category, ConfigError, PipelineConfig, RetryConfig};
pub use db::{Database, DbError};
pub use extract::{ExtractError, TextExtractor, Utf8TextExtractor};
pub use fetch::{
    DEFAULT_MAX_RETRIES, FailureType, FetchError, FetchResponse, FetchStats, Fetcher,
    RetryDecision, RetryPolicy, classify_error, parse_retry_after,
};
pub use pipeline::{
    BatchExecutor, DetailProcessor, DiscoveryProcessor, ExecutorError, ItemOutcome, PhaseError,
    PhaseProcessor, PhaseStats, RelationsProcessor, ValidationError,
};
pub use store::{
    Document, DocumentState, DocumentStore, NaturalKey, Relation, RelationKind, StoreError,
    StoreTx, StubUpsert,
};
