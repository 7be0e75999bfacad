//! # Grounding Vector Store
//!
//! Passage storage boundary and nearest-neighbour lookup for the grounding
//! retrieval engine.
//!
//! ## Architecture
//!
//! ```text
//! query embedding
//!     │
//!     └──> CorpusIndex (strategy fixed at startup by CorpusStore::probe)
//!            ├─> IndexedSearch   → store.top_k()            (approximate)
//!            └─> ExhaustiveScan  → store.embedded_passages()
//!                                   └─> batched cosine pass + partial sort (exact)
//! ```
//!
//! Store access is bounded by a handle pool with an acquire timeout, and
//! exhaustive scans by a separate concurrency limit.
//!
//! ## Example
//!
//! ```no_run
//! use grounding_vector_store::{CorpusIndex, MemoryCorpusStore, StoreLimits};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryCorpusStore::load("corpus.json", false).await?;
//!     let index = CorpusIndex::detect(Arc::new(store), StoreLimits::default()).await?;
//!
//!     for hit in index.nearest(&[0.1, 0.7, 0.2], 10).await? {
//!         println!("{}: {:.3}", hit.passage.id, hit.distance);
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod index;
mod limits;
mod memory;
pub mod metric;
mod store;
mod types;

pub use embeddings::{validate_embedding, Embedder, StubEmbedder};
pub use error::{Result, VectorStoreError};
pub use index::{CorpusIndex, IndexLoad};
pub use limits::{ConcurrencyLimit, LimitPermit, LimitSnapshot, StoreLimits};
pub use memory::{MemoryCorpusStore, CORPUS_SNAPSHOT_SCHEMA_VERSION};
pub use store::CorpusStore;
pub use types::{AttributeValue, PassageRecord, ScoredPassage, StoreCapabilities};
