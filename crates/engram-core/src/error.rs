//! Engine error taxonomy
//!
//! Background cycles catch and log; foreground paths (ingest,
//! retrieval) propagate. Capability failures are recovered locally by
//! each pipeline and never reach end users.

use crate::providers::ProviderError;
use crate::storage::StorageError;

/// Top-level engine error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed arguments at a public entry point
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Invariant violation surfaced to the caller
    #[error("conflict: {0}")]
    Conflict(String),
    /// Referenced id does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Embedding or language call failed; recovered locally where possible
    #[error("capability failure: {0}")]
    Capability(#[from] ProviderError),
    /// Content-store failure; the cycle aborts and the caller decides
    #[error("storage failure: {0}")]
    Storage(StorageError),
    /// Timer skew, contention, or other condition retried on the next tick
    #[error("transient: {0}")]
    Transient(String),
}

impl From<StorageError> for EngineError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => EngineError::NotFound(what),
            StorageError::Conflict(what) => EngineError::Conflict(what),
            StorageError::InvalidInput(what) => EngineError::InvalidInput(what),
            other => EngineError::Storage(other),
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let error: EngineError = StorageError::NotFound("m1".to_string()).into();
        assert!(matches!(error, EngineError::NotFound(_)));

        let error: EngineError = StorageError::Conflict("dup".to_string()).into();
        assert!(matches!(error, EngineError::Conflict(_)));

        let error: EngineError = StorageError::Init("boom".to_string()).into();
        assert!(matches!(error, EngineError::Storage(_)));
    }
}
