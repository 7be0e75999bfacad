use grounding_vector_store::VectorStoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The corpus store could not be reached, or a handle could not be
    /// obtained in time. Retried by the caller, never inside the engine.
    #[error("Corpus store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    /// Invalid configuration; only raised while constructing the engine.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Empty query")]
    EmptyQuery,
}

impl RetrievalError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the transport layer may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::EmbeddingFailure(_))
    }
}

impl From<VectorStoreError> for RetrievalError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::InvalidDimension { .. } | VectorStoreError::EmbeddingError(_) => {
                Self::EmbeddingFailure(err.to_string())
            }
            other if other.is_unavailable() => Self::StoreUnavailable(other.to_string()),
            other => Self::StoreUnavailable(format!("store request failed: {other}")),
        }
    }
}
