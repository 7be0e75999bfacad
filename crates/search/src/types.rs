use crate::query_classifier::ProfileKind;
use grounding_vector_store::metric::similarity_from_distance;
use grounding_vector_store::{PassageRecord, ScoredPassage};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// A passage scored against one query.
///
/// Similarity is always derived from distance through
/// [`similarity_from_distance`]; there is no way to set it independently.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    #[serde(serialize_with = "serialize_passage")]
    passage: Arc<PassageRecord>,
    distance: f32,
    similarity: f32,
}

impl Candidate {
    #[must_use]
    pub fn new(passage: Arc<PassageRecord>, distance: f32) -> Self {
        let distance = if distance.is_nan() {
            f32::INFINITY
        } else {
            distance
        };
        Self {
            passage,
            distance,
            similarity: similarity_from_distance(distance),
        }
    }

    #[must_use]
    pub fn passage(&self) -> &PassageRecord {
        &self.passage
    }

    #[must_use]
    pub fn passage_id(&self) -> &str {
        &self.passage.id
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.passage.source_id
    }

    #[must_use]
    pub const fn distance(&self) -> f32 {
        self.distance
    }

    #[must_use]
    pub const fn similarity(&self) -> f32 {
        self.similarity
    }
}

impl From<ScoredPassage> for Candidate {
    fn from(scored: ScoredPassage) -> Self {
        Self::new(scored.passage, scored.distance)
    }
}

/// Passage text as it goes to the downstream consumer, possibly cut to fit
/// the context budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPassage {
    pub passage_id: String,
    pub source_id: String,
    pub text: String,
    pub truncated: bool,
}

/// Outcome of relevance filtering for one query.
///
/// An empty result is a valid terminal state meaning "nothing relevant
/// enough", distinct from a retrieval failure.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredResult {
    pub candidates: Vec<Candidate>,
    pub set_confidence: f32,
    pub accepted_count: usize,
    pub profile: ProfileKind,
    /// Budgeted passage texts, filled in by the context budgeter.
    pub context: Vec<ContextPassage>,
}

impl FilteredResult {
    #[must_use]
    pub fn empty(profile: ProfileKind) -> Self {
        Self {
            candidates: Vec::new(),
            set_confidence: 0.0,
            accepted_count: 0,
            profile,
            context: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

fn serialize_passage<S: Serializer>(
    passage: &Arc<PassageRecord>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct PassageView<'a> {
        id: &'a str,
        source_id: &'a str,
        sequence_index: usize,
        attributes: &'a std::collections::BTreeMap<String, grounding_vector_store::AttributeValue>,
    }

    PassageView {
        id: &passage.id,
        source_id: &passage.source_id,
        sequence_index: passage.sequence_index,
        attributes: &passage.attributes,
    }
    .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: &str) -> Arc<PassageRecord> {
        Arc::new(PassageRecord::new(id, "src", 0, "text").with_embedding(vec![1.0, 0.0]))
    }

    #[test]
    fn similarity_tracks_distance() {
        let near = Candidate::new(passage("a"), 0.2);
        let far = Candidate::new(passage("b"), 1.8);
        assert!(near.similarity() > far.similarity());
        assert!((near.similarity() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nan_distance_never_looks_relevant() {
        let candidate = Candidate::new(passage("a"), f32::NAN);
        assert!(candidate.distance().is_infinite());
        assert!(candidate.similarity().abs() < f32::EPSILON);
    }

    #[test]
    fn serialized_candidate_omits_embedding() {
        let value = serde_json::to_value(Candidate::new(passage("a"), 0.5)).unwrap();
        assert_eq!(value["passage"]["id"], "a");
        assert!(value["passage"].get("embedding").is_none());
        assert!((value["similarity"].as_f64().unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn empty_result_has_zero_confidence() {
        let result = FilteredResult::empty(ProfileKind::Default);
        assert!(result.is_empty());
        assert_eq!(result.accepted_count, 0);
        assert!(result.set_confidence.abs() < f32::EPSILON);
    }
}
