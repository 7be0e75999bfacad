use crate::query_classifier::RelevanceProfile;
use crate::types::{Candidate, FilteredResult};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Turns raw candidates into the bounded, deduplicated result set.
///
/// Steps run in a fixed order:
/// 1. drop candidates whose distance exceeds the profile threshold;
/// 2. keep only the closest candidate per source document, so several
///    passages of one document cannot crowd other documents out of a short
///    list;
/// 3. cap at `final_limit` (K2), keeping ascending distance order;
/// 4. set confidence to the best surviving similarity (0 when empty).
///
/// An empty outcome is returned as such and is never padded with candidates
/// outside the threshold.
#[derive(Debug, Clone, Copy)]
pub struct RelevanceFilter {
    final_limit: usize,
}

impl RelevanceFilter {
    #[must_use]
    pub const fn new(final_limit: usize) -> Self {
        Self { final_limit }
    }

    #[must_use]
    pub fn apply(&self, mut candidates: Vec<Candidate>, profile: &RelevanceProfile) -> FilteredResult {
        let raw = candidates.len();
        candidates.sort_by(compare_candidates);

        let threshold = profile.distance_threshold;
        candidates.retain(|c| c.distance() <= threshold);
        let within_threshold = candidates.len();

        let mut seen_sources: HashSet<String> = HashSet::with_capacity(candidates.len());
        candidates.retain(|c| seen_sources.insert(c.source_id().to_string()));
        let deduplicated = candidates.len();

        candidates.truncate(self.final_limit);

        log::debug!(
            "Relevance filter [{}] threshold={threshold:.3}: raw={raw} within={within_threshold} \
             distinct_sources={deduplicated} kept={}",
            profile.label(),
            candidates.len()
        );

        if candidates.is_empty() {
            return FilteredResult::empty(profile.kind);
        }

        let set_confidence = candidates[0].similarity();
        FilteredResult {
            accepted_count: candidates.len(),
            set_confidence,
            candidates,
            profile: profile.kind,
            context: Vec::new(),
        }
    }
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance()
        .total_cmp(&b.distance())
        .then_with(|| a.passage_id().cmp(b.passage_id()))
}
