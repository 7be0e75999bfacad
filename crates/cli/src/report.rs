use grounding_search::{FilteredResult, ProfileKind, RetrievalConfig};
use grounding_vector_store::IndexLoad;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub dimension: usize,
    pub estimated_corpus_size: usize,
    pub unembedded_passages: usize,
    pub load: IndexLoad,
}

pub fn render_result(result: &FilteredResult) -> String {
    if result.is_empty() {
        return format!(
            "no grounded passages (profile: {})",
            result.profile.label()
        );
    }

    let mut out = format!(
        "profile: {}  accepted: {}  confidence: {:.3}\n",
        result.profile.label(),
        result.accepted_count,
        result.set_confidence
    );
    for (i, candidate) in result.candidates.iter().enumerate() {
        out.push_str(&format!(
            "\n# {} {} [{}] (distance: {:.3}, similarity: {:.3})\n",
            i + 1,
            candidate.passage_id(),
            candidate.source_id(),
            candidate.distance(),
            candidate.similarity()
        ));
        // Context is a prefix of the candidates; later ones did not fit the budget.
        match result.context.get(i) {
            Some(passage) if passage.truncated => {
                out.push_str(&passage.text);
                out.push_str(" [...]\n");
            }
            Some(passage) => {
                out.push_str(&passage.text);
                out.push('\n');
            }
            None => out.push_str("(outside context budget)\n"),
        }
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn render_stats(stats: &CorpusStats) -> String {
    format!(
        "dimension: {}\nembedded passages: {}\npassages without embedding: {}\n\
         store pool: {}/{} in flight, {} waiting\nexhaustive scans: {}/{} in flight, {} waiting",
        stats.dimension,
        stats.estimated_corpus_size,
        stats.unembedded_passages,
        stats.load.pool.in_flight,
        stats.load.pool.limit,
        stats.load.pool.waiters,
        stats.load.scans.in_flight,
        stats.load.scans.limit,
        stats.load.scans.waiters
    )
}

pub fn config_json(config: &RetrievalConfig) -> Value {
    let profiles: serde_json::Map<String, Value> = ProfileKind::ALL
        .iter()
        .map(|kind| {
            (
                kind.label().to_string(),
                json!({ "distance_threshold": config.thresholds.for_kind(*kind) }),
            )
        })
        .collect();

    json!({
        "retrieval": {
            "final_limit": config.final_limit,
            "candidate_limit": config.candidate_limit,
        },
        "profiles": profiles,
        "vocabulary": config.vocabulary,
        "context_budget": config.context_budget,
        "store": {
            "pool_size": config.store.pool_size,
            "acquire_timeout_ms": u64::try_from(config.store.acquire_timeout.as_millis()).unwrap_or(u64::MAX),
            "max_concurrent_scans": config.store.max_concurrent_scans,
        },
    })
}

pub fn render_config(config: &RetrievalConfig) -> String {
    let mut out = String::from("config ok\n");
    out.push_str(&format!(
        "retrieval: final_limit={} candidate_limit={}\n",
        config.final_limit, config.candidate_limit
    ));
    for kind in ProfileKind::ALL {
        out.push_str(&format!(
            "profile {}: distance_threshold={:.2}\n",
            kind.label(),
            config.thresholds.for_kind(kind)
        ));
    }
    out.push_str(&format!(
        "vocabulary: domain={} technical={} procedural={} entries\n",
        config.vocabulary.domain.len(),
        config.vocabulary.technical.len(),
        config.vocabulary.procedural.len()
    ));
    out.push_str(&format!(
        "context_budget: {} {:?}\n",
        config.context_budget.limit, config.context_budget.unit
    ));
    out.push_str(&format!(
        "store: pool_size={} acquire_timeout_ms={} max_concurrent_scans={}",
        config.store.pool_size,
        config.store.acquire_timeout.as_millis(),
        config.store.max_concurrent_scans
    ));
    out
}
