//! Error types for the search simulator.

use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during ingestion, query planning, and execution.
///
/// Variants map onto the taxonomy in spec §7: validation (400), not-found
/// (404), conflict (409), unavailable (503), internal (500).
#[derive(Debug, Error)]
pub enum SearchError {
    /// The search index is not ready (still building or corrupted)
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// The index is corrupted and needs a full rebuild
    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    /// Query syntax error (malformed text query, invalid filter, etc.)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A document or action payload violates the installed schema: wrong
    /// vector dimension, unrecognized filter target, sort/facet on a
    /// non-sortable/non-facetable field, bad schema definition.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Schema mutation attempted after documents already exist.
    #[error("Schema is frozen after ingestion: {0}")]
    SchemaFrozen(String),

    /// The requested search mode is not available (feature not compiled)
    #[error("Search mode unavailable: {0}")]
    ModeUnavailable(String),

    /// Index not found.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Document not found in the index
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Named scoring profile not found.
    #[error("Scoring profile not found: {0}")]
    ScoringProfileNotFound(String),

    /// Timeout during search or indexing
    #[error("Search timeout: {0}")]
    Timeout(String),

    /// The engine has been disposed or is shutting down mid-batch.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// I/O error during index operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal/unexpected error
    #[error("Internal search error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Returns the error type string (for structured logging / JSON responses)
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::IndexNotReady(_) => "INDEX_NOT_READY",
            Self::IndexCorrupted(_) => "INDEX_CORRUPTED",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::SchemaViolation(_) => "SCHEMA_VIOLATION",
            Self::SchemaFrozen(_) => "SCHEMA_FROZEN",
            Self::ModeUnavailable(_) => "MODE_UNAVAILABLE",
            Self::IndexNotFound(_) => "INDEX_NOT_FOUND",
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::ScoringProfileNotFound(_) => "SCORING_PROFILE_NOT_FOUND",
            Self::Timeout(_) => "TIMEOUT",
            Self::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Maps this error to the HTTP-like status code in spec §4.1/§7.
    #[must_use]
    pub const fn http_like_status(&self) -> u16 {
        match self {
            Self::InvalidQuery(_) | Self::SchemaViolation(_) => 400,
            Self::IndexNotFound(_) | Self::DocumentNotFound(_) | Self::ScoringProfileNotFound(_) => 404,
            Self::SchemaFrozen(_) => 409,
            Self::EngineUnavailable(_) | Self::IndexNotReady(_) => 503,
            Self::IndexCorrupted(_)
            | Self::ModeUnavailable(_)
            | Self::Timeout(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns whether the error is transient and can be retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::IndexNotReady(_) | Self::Timeout(_) | Self::Io(_))
    }
}
