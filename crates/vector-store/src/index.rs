use crate::error::{Result, VectorStoreError};
use crate::limits::{ConcurrencyLimit, LimitSnapshot, StoreLimits};
use crate::metric::{batch_cosine_distances, compare_scored, select_top_k};
use crate::store::CorpusStore;
use crate::types::{PassageRecord, ScoredPassage};
use ndarray::Array2;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::spawn_blocking;

/// Nearest-passage lookup over the corpus store.
///
/// The search strategy is chosen once by [`CorpusIndex::detect`]: stores that
/// maintain a similarity index are queried through it, every other store is
/// scanned exhaustively. Callers see the same contract either way: up to `k`
/// passages, ascending by distance, ties broken by passage id.
pub struct CorpusIndex {
    store: Arc<dyn CorpusStore>,
    strategy: Strategy,
    dimension: Option<usize>,
    pool: ConcurrencyLimit,
    scans: ConcurrencyLimit,
    acquire_timeout: Duration,
}

/// Occupancy of the store pool and the exhaustive-scan limiter.
///
/// Both are always reported so the active strategy stays unobservable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexLoad {
    pub pool: LimitSnapshot,
    pub scans: LimitSnapshot,
}

enum Strategy {
    Indexed(IndexedSearch),
    Exhaustive(ExhaustiveScan),
}

impl Strategy {
    const fn name(&self) -> &'static str {
        match self {
            Self::Indexed(_) => "indexed",
            Self::Exhaustive(_) => "exhaustive-scan",
        }
    }
}

/// Delegates to the store's own approximate index.
struct IndexedSearch;

/// Distance against every embedded passage, then a partial sort.
struct ExhaustiveScan;

impl CorpusIndex {
    /// Probes the store once and picks the search strategy.
    pub async fn detect(store: Arc<dyn CorpusStore>, limits: StoreLimits) -> Result<Self> {
        let pool = ConcurrencyLimit::new("store pool", limits.pool_size);
        let capabilities = {
            let _handle = pool.acquire_timeout(limits.acquire_timeout).await?;
            store.probe().await?
        };

        let strategy = if capabilities.indexed {
            Strategy::Indexed(IndexedSearch)
        } else {
            Strategy::Exhaustive(ExhaustiveScan)
        };

        log::info!(
            "Corpus index ready: strategy={}, dimension={:?}, pool_size={}",
            strategy.name(),
            capabilities.dimension,
            limits.pool_size
        );

        Ok(Self {
            store,
            strategy,
            dimension: capabilities.dimension,
            pool,
            scans: ConcurrencyLimit::new("exhaustive scan", limits.max_concurrent_scans),
            acquire_timeout: limits.acquire_timeout,
        })
    }

    /// The `k` passages closest to `embedding`, without any relevance policy.
    pub async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        if let Some(expected) = self.dimension {
            if embedding.len() != expected {
                return Err(VectorStoreError::InvalidDimension {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let results = match &self.strategy {
            Strategy::Indexed(indexed) => indexed.nearest(self, embedding, k).await?,
            Strategy::Exhaustive(scan) => scan.nearest(self, embedding, k).await?,
        };
        log::debug!(
            "{} returned {} of {} requested passages",
            self.strategy.name(),
            results.len(),
            k
        );
        Ok(results)
    }

    /// Passages with embeddings, as reported by the store.
    pub async fn estimated_corpus_size(&self) -> Result<usize> {
        let _handle = self.handle().await?;
        self.store.embedded_count().await
    }

    #[must_use]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[must_use]
    pub fn load(&self) -> IndexLoad {
        IndexLoad {
            pool: self.pool.snapshot(),
            scans: self.scans.snapshot(),
        }
    }

    #[cfg(test)]
    fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    async fn handle(&self) -> Result<crate::limits::LimitPermit> {
        self.pool.acquire_timeout(self.acquire_timeout).await
    }
}

impl IndexedSearch {
    async fn nearest(
        &self,
        index: &CorpusIndex,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let _handle = index.handle().await?;
        let mut results = index.store.top_k(embedding, k).await?;

        if results.len() < k {
            let total = index.store.embedded_count().await?;
            let expected = k.min(total);
            if results.len() < expected {
                return Err(VectorStoreError::ShortResult {
                    expected,
                    returned: results.len(),
                });
            }
        }

        if !results.windows(2).all(|w| compare_scored(&w[0], &w[1]).is_le()) {
            log::warn!("Similarity index returned passages out of order; re-sorting");
        }
        results.sort_by(compare_scored);
        results.truncate(k);
        Ok(results)
    }
}

impl ExhaustiveScan {
    async fn nearest(
        &self,
        index: &CorpusIndex,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let scan = index.scans.acquire().await?;
        let passages = {
            let _handle = index.handle().await?;
            index.store.embedded_passages().await?
        };

        // The permit travels with the blocking work: a cancelled query stops
        // waiting, but its scan still counts against the limit until done.
        let query = embedding.to_vec();
        spawn_blocking(move || {
            let result = scan_top_k(&passages, &query, k);
            drop(passages);
            drop(scan);
            result
        })
        .await
        .map_err(|e| VectorStoreError::ScanFailed(format!("Join error: {e}")))?
    }
}

/// One batched distance pass over all embedded passages, then top-k selection.
fn scan_top_k(
    passages: &[Arc<PassageRecord>],
    query: &[f32],
    k: usize,
) -> Result<Vec<ScoredPassage>> {
    let dimension = query.len();
    let mut rows: Vec<&Arc<PassageRecord>> = Vec::with_capacity(passages.len());
    let mut flat: Vec<f32> = Vec::with_capacity(passages.len() * dimension);
    let mut skipped = 0usize;
    let mut foreign_dimension = None;

    for passage in passages {
        match passage.searchable_embedding() {
            Some(vector) if vector.len() == dimension => {
                flat.extend_from_slice(vector);
                rows.push(passage);
            }
            Some(vector) => {
                skipped += 1;
                foreign_dimension.get_or_insert(vector.len());
            }
            None => {}
        }
    }
    if let Some(expected) = foreign_dimension {
        // Nothing comparable at all means the query, not the corpus, is wrong.
        if rows.is_empty() {
            return Err(VectorStoreError::InvalidDimension {
                expected,
                actual: dimension,
            });
        }
        log::warn!("Exhaustive scan skipped {skipped} passages with a foreign embedding dimension");
    }
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let matrix = Array2::from_shape_vec((rows.len(), dimension), flat)
        .map_err(|e| VectorStoreError::ScanFailed(format!("Shape error: {e}")))?;
    let distances = batch_cosine_distances(matrix.view(), query)?;

    let scored: Vec<ScoredPassage> = rows
        .into_iter()
        .zip(distances)
        .map(|(passage, distance)| ScoredPassage::new(passage.clone(), distance))
        .collect();
    Ok(select_top_k(scored, k))
}
