use crate::budget::ContextBudgeter;
use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::filter::RelevanceFilter;
use crate::query_classifier::{QueryClassifier, RelevanceProfile};
use crate::retriever::CandidateRetriever;
use crate::types::FilteredResult;
use grounding_vector_store::{validate_embedding, CorpusIndex, CorpusStore, Embedder, IndexLoad};
use std::sync::Arc;

/// Query text in, grounded passages out.
///
/// Holds no per-query state, so one engine can serve any number of
/// concurrent queries. The only contended resources are the store pool and
/// the exhaustive-scan limiter inside [`CorpusIndex`].
pub struct RetrievalEngine {
    config: RetrievalConfig,
    index: Arc<CorpusIndex>,
    embedder: Arc<dyn Embedder>,
    classifier: QueryClassifier,
    retriever: CandidateRetriever,
    filter: RelevanceFilter,
    budgeter: ContextBudgeter,
}

impl RetrievalEngine {
    /// Validates the configuration and probes the store.
    ///
    /// Every configuration problem surfaces here, never at query time.
    pub async fn new(
        config: RetrievalConfig,
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;

        let index = CorpusIndex::detect(store, config.store).await?;
        if let Some(store_dimension) = index.dimension() {
            if store_dimension != embedder.dimension() {
                return Err(RetrievalError::configuration(format!(
                    "embedder produces {}-dimensional vectors but the corpus holds {store_dimension}",
                    embedder.dimension()
                )));
            }
        }
        let index = Arc::new(index);

        log::info!(
            "Retrieval engine ready: K1={}, K2={}, budget={} {:?}",
            config.candidate_limit,
            config.final_limit,
            config.context_budget.limit,
            config.context_budget.unit
        );

        Ok(Self {
            classifier: QueryClassifier::new(&config.thresholds, &config.vocabulary),
            retriever: CandidateRetriever::new(index.clone(), config.candidate_limit),
            filter: RelevanceFilter::new(config.final_limit),
            budgeter: ContextBudgeter::new(config.context_budget),
            index,
            embedder,
            config,
        })
    }

    /// Classifies and embeds the query, then retrieves, filters and budgets.
    ///
    /// An empty [`FilteredResult`] means nothing was relevant enough; store
    /// and embedder failures are errors.
    pub async fn retrieve(&self, query: &str) -> Result<FilteredResult> {
        let profile = self.profile_for(query)?;

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|err| RetrievalError::EmbeddingFailure(err.to_string()))?;
        validate_embedding(&embedding, self.embedder.dimension())?;

        self.run(profile, &embedding).await
    }

    /// Same pipeline for callers that already hold the query embedding.
    pub async fn retrieve_with_embedding(
        &self,
        query: &str,
        embedding: &[f32],
    ) -> Result<FilteredResult> {
        let profile = self.profile_for(query)?;
        // Construction pinned the embedder to any dimension the store declares.
        let dimension = self
            .index
            .dimension()
            .unwrap_or_else(|| self.embedder.dimension());
        validate_embedding(embedding, dimension)?;

        self.run(profile, embedding).await
    }

    pub async fn estimated_corpus_size(&self) -> Result<usize> {
        Ok(self.index.estimated_corpus_size().await?)
    }

    /// Current occupancy of the store pool and the scan limiter.
    #[must_use]
    pub fn store_load(&self) -> IndexLoad {
        self.index.load()
    }

    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn profile_for(&self, query: &str) -> Result<RelevanceProfile> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        let profile = self.classifier.classify(query);
        log::debug!(
            "Query {query:?} classified as {} (threshold {:.3})",
            profile.label(),
            profile.distance_threshold
        );
        Ok(profile)
    }

    async fn run(&self, profile: RelevanceProfile, embedding: &[f32]) -> Result<FilteredResult> {
        let candidates = self.retriever.retrieve(embedding).await?;
        let mut result = self.filter.apply(candidates, &profile);
        result.context = self.budgeter.fit(&result.candidates);

        if result.is_empty() {
            log::debug!("No passage within the {} threshold", profile.label());
        } else {
            log::debug!(
                "Accepted {} passages, confidence {:.3}, {} in context",
                result.accepted_count,
                result.set_confidence,
                result.context.len()
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BudgetUnit, ContextBudget, ProfileThresholds};
    use crate::query_classifier::ProfileKind;
    use async_trait::async_trait;
    use grounding_vector_store::{
        LimitSnapshot, MemoryCorpusStore, PassageRecord, StoreCapabilities, StoreLimits,
        StubEmbedder, VectorStoreError,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const DIM: usize = 2;

    /// Unit vector whose cosine distance to [1, 0] is exactly `distance`.
    fn at_distance(distance: f32) -> Vec<f32> {
        let angle = (1.0 - distance).acos();
        vec![angle.cos(), angle.sin()]
    }

    fn scenario_passages() -> Vec<PassageRecord> {
        [0.2, 0.5, 0.9, 1.3, 1.8]
            .iter()
            .enumerate()
            .map(|(i, d)| {
                PassageRecord::new(format!("p{i}"), format!("doc{i}"), 0, format!("passage {i}"))
                    .with_embedding(at_distance(*d))
            })
            .collect()
    }

    fn scenario_config(threshold: f32, final_limit: usize) -> RetrievalConfig {
        RetrievalConfig {
            final_limit,
            candidate_limit: final_limit * 3,
            thresholds: ProfileThresholds {
                strict: threshold.min(0.35),
                domain: threshold.max(1.0),
                technical: threshold,
                procedural: threshold,
                default: threshold,
            },
            ..RetrievalConfig::default()
        }
    }

    async fn engine_with(
        config: RetrievalConfig,
        passages: Vec<PassageRecord>,
        indexed: bool,
    ) -> (RetrievalEngine, Arc<MemoryCorpusStore>) {
        let store = Arc::new(MemoryCorpusStore::with_passages(DIM, passages, indexed).unwrap());
        let engine = RetrievalEngine::new(config, store.clone(), Arc::new(StubEmbedder::new(DIM)))
            .await
            .unwrap();
        (engine, store)
    }

    fn ids(result: &FilteredResult) -> Vec<String> {
        result
            .candidates
            .iter()
            .map(|c| c.passage_id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn threshold_and_cap_scenario() {
        let (engine, _) = engine_with(scenario_config(1.0, 3), scenario_passages(), false).await;
        let result = engine
            .retrieve_with_embedding("what is the refund policy", &[1.0, 0.0])
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["p0", "p1", "p2"]);
        assert_eq!(result.accepted_count, 3);
        assert_eq!(result.profile, ProfileKind::Default);
        for (candidate, expected) in result.candidates.iter().zip([0.2, 0.5, 0.9]) {
            assert!((candidate.distance() - expected).abs() < 1e-4);
        }
        assert_eq!(result.context.len(), 3);
    }

    #[tokio::test]
    async fn nothing_relevant_is_an_empty_success() {
        let (engine, _) = engine_with(scenario_config(0.1, 3), scenario_passages(), false).await;
        let result = engine
            .retrieve_with_embedding("what is the refund policy", &[1.0, 0.0])
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.accepted_count, 0);
        assert!(result.set_confidence.abs() < f32::EPSILON);
        assert!(result.context.is_empty());
    }

    #[tokio::test]
    async fn both_strategies_return_identical_results() {
        let mut passages = scenario_passages();
        // Same distance as p1, tie broken by id.
        passages.push(
            PassageRecord::new("p1b", "doc-extra", 0, "twin").with_embedding(at_distance(0.5)),
        );

        let (indexed, _) = engine_with(scenario_config(1.0, 4), passages.clone(), true).await;
        let (scanned, _) = engine_with(scenario_config(1.0, 4), passages, false).await;

        let a = indexed.retrieve_with_embedding("refunds", &[1.0, 0.0]).await.unwrap();
        let b = scanned.retrieve_with_embedding("refunds", &[1.0, 0.0]).await.unwrap();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a), vec!["p0", "p1", "p1b", "p2"]);
        assert_eq!(a.context, b.context);
    }

    #[tokio::test]
    async fn stub_embedder_finds_the_identical_passage() {
        let embedder = StubEmbedder::new(16);
        let passages = ["rotate the signing keys", "refund window is thirty days", "holiday hours"]
            .iter()
            .enumerate()
            .map(|(i, text)| {
                PassageRecord::new(format!("p{i}"), format!("s{i}"), 0, *text)
                    .with_embedding(embedder.embed_sync(text))
            });
        let store = Arc::new(MemoryCorpusStore::with_passages(16, passages, false).unwrap());
        let engine = RetrievalEngine::new(RetrievalConfig::default(), store, Arc::new(embedder))
            .await
            .unwrap();

        let result = engine.retrieve("refund window is thirty days").await.unwrap();
        assert_eq!(result.candidates[0].passage_id(), "p1");
        assert!(result.candidates[0].distance() < 1e-4);
        assert!(result.set_confidence > 0.99);
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_any_work() {
        let (engine, store) = engine_with(RetrievalConfig::default(), scenario_passages(), false).await;
        store.set_online(false);
        assert!(matches!(
            engine.retrieve("   ").await.unwrap_err(),
            RetrievalError::EmptyQuery
        ));
    }

    #[tokio::test]
    async fn offline_store_is_store_unavailable() {
        let (engine, store) = engine_with(RetrievalConfig::default(), scenario_passages(), true).await;
        store.set_online(false);
        let err = engine.retrieve("refund policy").await.unwrap_err();
        assert!(matches!(err, RetrievalError::StoreUnavailable(_)), "{err}");
        assert!(err.is_retryable());
    }

    struct BrokenEmbedder {
        output: Option<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn dimension(&self) -> usize {
            DIM
        }

        async fn embed(&self, _text: &str) -> grounding_vector_store::Result<Vec<f32>> {
            self.output
                .clone()
                .ok_or_else(|| VectorStoreError::EmbeddingError("model offline".to_string()))
        }
    }

    async fn engine_with_embedder(embedder: BrokenEmbedder) -> RetrievalEngine {
        let store = Arc::new(MemoryCorpusStore::with_passages(DIM, scenario_passages(), false).unwrap());
        RetrievalEngine::new(RetrievalConfig::default(), store, Arc::new(embedder))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn embedder_failures_are_surfaced() {
        let failing = engine_with_embedder(BrokenEmbedder { output: None }).await;
        let err = failing.retrieve("refund policy").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailure(_)));
        assert!(err.to_string().contains("model offline"), "{err}");

        let zero = engine_with_embedder(BrokenEmbedder {
            output: Some(vec![0.0, 0.0]),
        })
        .await;
        assert!(matches!(
            zero.retrieve("refund policy").await.unwrap_err(),
            RetrievalError::EmbeddingFailure(_)
        ));

        let short = engine_with_embedder(BrokenEmbedder {
            output: Some(vec![1.0]),
        })
        .await;
        assert!(matches!(
            short.retrieve("refund policy").await.unwrap_err(),
            RetrievalError::EmbeddingFailure(_)
        ));
    }

    #[tokio::test]
    async fn wrong_dimension_embedding_is_rejected() {
        let (engine, _) = engine_with(RetrievalConfig::default(), scenario_passages(), false).await;
        let err = engine
            .retrieve_with_embedding("refund policy", &[1.0, 0.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailure(_)));
    }

    #[tokio::test]
    async fn construction_rejects_bad_configuration() {
        let store = Arc::new(MemoryCorpusStore::with_passages(DIM, scenario_passages(), false).unwrap());

        let config = RetrievalConfig {
            final_limit: 10,
            candidate_limit: 5,
            ..RetrievalConfig::default()
        };
        let err = RetrievalEngine::new(config, store.clone(), Arc::new(StubEmbedder::new(DIM)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Configuration(_)));

        let err = RetrievalEngine::new(
            RetrievalConfig::default(),
            store,
            Arc::new(StubEmbedder::new(DIM + 1)),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, RetrievalError::Configuration(_)));
    }

    #[tokio::test]
    async fn context_is_budgeted_in_rank_order() {
        let config = RetrievalConfig {
            context_budget: ContextBudget {
                unit: BudgetUnit::Chars,
                limit: 12,
            },
            ..scenario_config(1.0, 3)
        };
        let (engine, _) = engine_with(config, scenario_passages(), false).await;
        let result = engine
            .retrieve_with_embedding("what is the refund policy", &[1.0, 0.0])
            .await
            .unwrap();

        // "passage 0" (9 chars) fits, "passage 1" is cut to the 3 chars left.
        assert_eq!(result.candidates.len(), 3);
        assert_eq!(result.context.len(), 2);
        assert_eq!(result.context[0].text, "passage 0");
        assert!(!result.context[0].truncated);
        assert_eq!(result.context[1].passage_id, "p1");
        assert_eq!(result.context[1].text, "pas");
        assert!(result.context[1].truncated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_queries_queue_on_a_small_pool() {
        let config = RetrievalConfig {
            store: StoreLimits {
                pool_size: 1,
                acquire_timeout: Duration::from_secs(30),
                max_concurrent_scans: 1,
            },
            ..scenario_config(1.0, 3)
        };
        let (engine, _) = engine_with(config, scenario_passages(), false).await;
        let engine = Arc::new(engine);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .retrieve_with_embedding("refund policy", &[1.0, 0.0])
                        .await
                })
            })
            .collect();

        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert_eq!(ids(&result), vec!["p0", "p1", "p2"]);
        }
    }

    #[tokio::test]
    async fn reports_corpus_size() {
        let mut passages = scenario_passages();
        passages.push(PassageRecord::new("bare", "doc-bare", 0, "no vector"));
        let (engine, _) = engine_with(RetrievalConfig::default(), passages, false).await;
        assert_eq!(engine.estimated_corpus_size().await.unwrap(), 5);
        assert_eq!(engine.config().final_limit, 12);
    }

    /// Scan-only store that does not declare its dimension.
    struct UndeclaredDimension(MemoryCorpusStore);

    #[async_trait]
    impl CorpusStore for UndeclaredDimension {
        async fn probe(&self) -> grounding_vector_store::Result<StoreCapabilities> {
            Ok(StoreCapabilities {
                indexed: false,
                dimension: None,
            })
        }

        async fn embedded_count(&self) -> grounding_vector_store::Result<usize> {
            self.0.embedded_count().await
        }

        async fn embedded_passages(&self) -> grounding_vector_store::Result<Vec<Arc<PassageRecord>>> {
            self.0.embedded_passages().await
        }
    }

    #[tokio::test]
    async fn embedder_dimension_foreign_to_the_corpus_is_an_embedding_failure() {
        let inner = MemoryCorpusStore::with_passages(DIM, scenario_passages(), false).unwrap();
        let engine = RetrievalEngine::new(
            scenario_config(1.0, 3),
            Arc::new(UndeclaredDimension(inner)),
            Arc::new(StubEmbedder::new(DIM + 1)),
        )
        .await
        .unwrap();

        let err = engine.retrieve("refund policy").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailure(_)), "{err}");

        // A caller-supplied vector must match the embedder, not itself.
        let err = engine
            .retrieve_with_embedding("refund policy", &[1.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailure(_)), "{err}");
    }

    /// Scan-only store whose enumeration never answers.
    struct StalledScan;

    #[async_trait]
    impl CorpusStore for StalledScan {
        async fn probe(&self) -> grounding_vector_store::Result<StoreCapabilities> {
            Ok(StoreCapabilities {
                indexed: false,
                dimension: Some(DIM),
            })
        }

        async fn embedded_count(&self) -> grounding_vector_store::Result<usize> {
            Ok(0)
        }

        async fn embedded_passages(&self) -> grounding_vector_store::Result<Vec<Arc<PassageRecord>>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn abandoned_queries_free_pool_and_scan_slots() {
        let config = RetrievalConfig {
            store: StoreLimits {
                pool_size: 1,
                acquire_timeout: Duration::from_secs(30),
                max_concurrent_scans: 1,
            },
            ..scenario_config(1.0, 3)
        };
        let engine = RetrievalEngine::new(config, Arc::new(StalledScan), Arc::new(StubEmbedder::new(DIM)))
            .await
            .unwrap();

        let queries = async {
            tokio::join!(
                engine.retrieve_with_embedding("refund policy", &[1.0, 0.0]),
                engine.retrieve_with_embedding("holiday hours", &[0.0, 1.0]),
                engine.retrieve("parking"),
            )
        };
        assert!(tokio::time::timeout(Duration::from_millis(50), queries).await.is_err());

        let idle = LimitSnapshot {
            limit: 1,
            in_flight: 0,
            waiters: 0,
        };
        let load = engine.store_load();
        assert_eq!(load.pool, idle);
        assert_eq!(load.scans, idle);
    }
}
