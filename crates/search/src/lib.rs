//! # Grounding Search
//!
//! Query-dependent relevance filtering on top of [`grounding_vector_store`].
//!
//! ```text
//! query text ──> QueryClassifier ──> RelevanceProfile
//!     │                                    │
//!     └─> Embedder ──> CandidateRetriever (K1) ──> RelevanceFilter (threshold, dedup, K2)
//!                                                        │
//!                                                        └─> ContextBudgeter ──> FilteredResult
//! ```
//!
//! [`RetrievalEngine::retrieve`] is the entry point. An empty
//! [`FilteredResult`] is a normal outcome meaning "nothing grounded enough";
//! failures come back as [`RetrievalError`].

mod budget;
mod config;
mod engine;
mod error;
mod filter;
mod query_classifier;
mod retriever;
mod types;

pub use budget::ContextBudgeter;
pub use config::{
    BudgetUnit, ContextBudget, ProfileThresholds, RetrievalConfig, Vocabulary,
    CONFIG_SCHEMA_VERSION,
};
pub use engine::RetrievalEngine;
pub use error::{Result, RetrievalError};
pub use filter::RelevanceFilter;
pub use query_classifier::{ProfileKind, QueryClassifier, RelevanceProfile};
pub use retriever::CandidateRetriever;
pub use types::{Candidate, ContextPassage, FilteredResult};
