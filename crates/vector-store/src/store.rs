use crate::error::{Result, VectorStoreError};
use crate::types::{PassageRecord, ScoredPassage, StoreCapabilities};
use async_trait::async_trait;
use std::sync::Arc;

/// Boundary to the external store that owns the passages.
///
/// A store answers either the indexed `top_k` primitive or the raw
/// `embedded_passages` enumeration (or both). Which one is used is decided
/// once from [`CorpusStore::probe`].
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Reports what the store can do. Called once at startup.
    async fn probe(&self) -> Result<StoreCapabilities>;

    /// Number of passages that carry an embedding.
    async fn embedded_count(&self) -> Result<usize>;

    /// Approximate nearest neighbours, ascending by distance.
    async fn top_k(&self, _embedding: &[f32], _k: usize) -> Result<Vec<ScoredPassage>> {
        Err(VectorStoreError::Other(
            "store does not provide a similarity index".to_string(),
        ))
    }

    /// Every passage that carries an embedding.
    async fn embedded_passages(&self) -> Result<Vec<Arc<PassageRecord>>> {
        Err(VectorStoreError::Other(
            "store does not support passage enumeration".to_string(),
        ))
    }
}
