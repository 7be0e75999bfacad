use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Corpus store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Timed out after {waited_ms}ms waiting for a store handle")]
    AcquireTimeout { waited_ms: u64 },

    #[error("Index returned {returned} results, expected at least {expected}")]
    ShortResult { expected: usize, returned: usize },

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Scan worker failed: {0}")]
    ScanFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl VectorStoreError {
    /// Whether the error means the store could not serve the request at all.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::AcquireTimeout { .. }
                | Self::ShortResult { .. }
                | Self::ScanFailed(_)
                | Self::IoError(_)
        )
    }
}
