use crate::error::Result;
use crate::types::Candidate;
use grounding_vector_store::CorpusIndex;
use std::sync::Arc;

/// Requests an over-provisioned candidate set (K1) so filtering has room to
/// drop and deduplicate before the final cap (K2).
pub struct CandidateRetriever {
    index: Arc<CorpusIndex>,
    candidate_limit: usize,
}

impl CandidateRetriever {
    #[must_use]
    pub const fn new(index: Arc<CorpusIndex>, candidate_limit: usize) -> Self {
        Self {
            index,
            candidate_limit,
        }
    }

    #[must_use]
    pub const fn candidate_limit(&self) -> usize {
        self.candidate_limit
    }

    /// Raw candidates, ascending by distance. Store failures propagate as
    /// errors; an empty vector means the corpus had nothing to offer.
    pub async fn retrieve(&self, embedding: &[f32]) -> Result<Vec<Candidate>> {
        let scored = self.index.nearest(embedding, self.candidate_limit).await?;
        Ok(scored.into_iter().map(Candidate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;
    use grounding_vector_store::{MemoryCorpusStore, PassageRecord, StoreLimits};

    async fn retriever(store: Arc<MemoryCorpusStore>, k1: usize) -> CandidateRetriever {
        let index = CorpusIndex::detect(store, StoreLimits::default()).await.unwrap();
        CandidateRetriever::new(Arc::new(index), k1)
    }

    fn store(n: usize) -> Arc<MemoryCorpusStore> {
        let passages = (0..n).map(|i| {
            let angle = i as f32 * 0.1;
            PassageRecord::new(format!("p{i:02}"), format!("s{i}"), 0, "text")
                .with_embedding(vec![angle.cos(), angle.sin()])
        });
        Arc::new(MemoryCorpusStore::with_passages(2, passages, false).unwrap())
    }

    #[tokio::test]
    async fn requests_candidate_limit_passages() {
        let retriever = retriever(store(20), 7).await;
        let candidates = retriever.retrieve(&[1.0, 0.0]).await.unwrap();
        assert_eq!(candidates.len(), 7);
        assert_eq!(candidates[0].passage_id(), "p00");
        assert!(candidates
            .windows(2)
            .all(|w| w[0].distance() <= w[1].distance()));
    }

    #[tokio::test]
    async fn unavailable_store_is_an_error_not_an_empty_success() {
        let store = store(5);
        let retriever = retriever(store.clone(), 3).await;
        store.set_online(false);
        let err = retriever.retrieve(&[1.0, 0.0]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::StoreUnavailable(_)));
    }
}
