//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.
//!
//! Every error carries enough context to act on it. The synchronous request
//! path surfaces errors with their category; background tasks record the
//! last error on the task record and retry per schedule.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Input / Validation Errors
    // =========================================================================
    #[error("Invalid input: {field}, reason: {reason}")]
    InputInvalid { field: String, reason: String },

    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // =========================================================================
    // Invariant Errors
    // =========================================================================
    #[error("Conflict on {id}: {reason}")]
    Conflict { id: String, reason: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Schema mismatch: expected dimension {expected}, got {actual}")]
    SchemaError { expected: usize, actual: usize },

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Provider failure ({provider}): {reason}")]
    ProviderFailure { provider: String, reason: String },

    #[error("Provider rate limited ({provider}), retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("Security validator rejected prompt: {reason}")]
    SecurityRejected { reason: String },

    // =========================================================================
    // Deadline Errors
    // =========================================================================
    #[error("Deadline exceeded: {operation} after {elapsed_ms}ms")]
    DeadlineExceeded { operation: String, elapsed_ms: u64 },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid-input error
    pub fn input_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InputInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a provider-failure error
    pub fn provider_failure(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderFailure {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a security-rejected error
    pub fn security_rejected(reason: impl Into<String>) -> Self {
        Self::SecurityRejected {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is retriable
    ///
    /// Transient store and provider failures are worth retrying with backoff.
    /// Validation, lookup, and invariant errors are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::ProviderFailure { .. }
                | Self::RateLimited { .. }
                | Self::DeadlineExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("memory record", "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert!(err.to_string().contains("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert!(err.to_string().contains("memory record"));
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::store_unavailable("connection refused").is_retriable());
        assert!(Error::provider_failure("embeddings", "timeout").is_retriable());
        assert!(!Error::not_found("session", "s1").is_retriable());
        assert!(!Error::conflict("r1", "immutable field").is_retriable());
        assert!(!Error::security_rejected("missing placeholder").is_retriable());
    }

    #[test]
    fn test_schema_error_display() {
        let err = Error::SchemaError {
            expected: 1536,
            actual: 384,
        };
        assert!(err.to_string().contains("1536"));
        assert!(err.to_string().contains("384"));
    }
}
