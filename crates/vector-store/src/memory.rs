use crate::error::{Result, VectorStoreError};
use crate::metric::{cosine_distance, select_top_k};
use crate::store::CorpusStore;
use crate::types::{PassageRecord, ScoredPassage, StoreCapabilities};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub const CORPUS_SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// In-process corpus store backed by a vector of passages.
///
/// It answers `top_k` with an exact scan when constructed as `indexed`, and
/// otherwise only offers passage enumeration.
pub struct MemoryCorpusStore {
    dimension: usize,
    indexed: bool,
    online: AtomicBool,
    passages: RwLock<Corpus>,
}

/// Passages in insertion order, with an id index for replacement.
#[derive(Default)]
struct Corpus {
    records: Vec<Arc<PassageRecord>>,
    by_id: HashMap<String, usize>,
}

impl Corpus {
    fn upsert(&mut self, passage: PassageRecord) {
        match self.by_id.get(&passage.id) {
            Some(&pos) => self.records[pos] = Arc::new(passage),
            None => {
                self.by_id.insert(passage.id.clone(), self.records.len());
                self.records.push(Arc::new(passage));
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCorpus {
    schema_version: u32,
    dimension: usize,
    passages: Vec<PassageRecord>,
}

impl MemoryCorpusStore {
    #[must_use]
    pub fn new(dimension: usize, indexed: bool) -> Self {
        Self {
            dimension,
            indexed,
            online: AtomicBool::new(true),
            passages: RwLock::new(Corpus::default()),
        }
    }

    pub fn with_passages(
        dimension: usize,
        passages: impl IntoIterator<Item = PassageRecord>,
        indexed: bool,
    ) -> Result<Self> {
        let store = Self::new(dimension, indexed);
        {
            let mut corpus = store.write()?;
            for passage in passages {
                store.check_dimension(&passage)?;
                corpus.upsert(passage);
            }
        }
        Ok(store)
    }

    /// Adds a passage, replacing any passage with the same id.
    pub fn insert(&self, passage: PassageRecord) -> Result<()> {
        self.check_dimension(&passage)?;
        self.write()?.upsert(passage);
        Ok(())
    }

    fn check_dimension(&self, passage: &PassageRecord) -> Result<()> {
        match &passage.embedding {
            Some(vector) if vector.len() != self.dimension => {
                Err(VectorStoreError::InvalidDimension {
                    expected: self.dimension,
                    actual: vector.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Simulates the store going away (or coming back).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.records.is_empty())
    }

    /// Passages stored without an embedding.
    pub fn unembedded_count(&self) -> Result<usize> {
        Ok(self
            .read()?
            .records
            .iter()
            .filter(|p| p.searchable_embedding().is_none())
            .count())
    }

    pub async fn load(path: impl AsRef<Path>, indexed: bool) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading corpus snapshot from {}", path.display());
        let bytes = tokio::fs::read(path).await?;
        let persisted: PersistedCorpus = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != CORPUS_SNAPSHOT_SCHEMA_VERSION {
            return Err(VectorStoreError::Other(format!(
                "Unsupported corpus snapshot schema_version {} (expected {CORPUS_SNAPSHOT_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }
        let store = Self::with_passages(persisted.dimension, persisted.passages, indexed)?;
        log::info!("Loaded {} passages", store.len()?);
        Ok(store)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedCorpus {
            schema_version: CORPUS_SNAPSHOT_SCHEMA_VERSION,
            dimension: self.dimension,
            passages: self
                .read()?
                .records
                .iter()
                .map(|p| p.as_ref().clone())
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VectorStoreError::StoreUnavailable(
                "memory store is offline".to_string(),
            ))
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Corpus>> {
        self.passages
            .read()
            .map_err(|_| VectorStoreError::Other("corpus lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Corpus>> {
        self.passages
            .write()
            .map_err(|_| VectorStoreError::Other("corpus lock poisoned".to_string()))
    }

    fn embedded(&self) -> Result<Vec<Arc<PassageRecord>>> {
        Ok(self
            .read()?
            .records
            .iter()
            .filter(|p| p.searchable_embedding().is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpusStore {
    async fn probe(&self) -> Result<StoreCapabilities> {
        self.ensure_online()?;
        Ok(StoreCapabilities {
            indexed: self.indexed,
            dimension: Some(self.dimension),
        })
    }

    async fn embedded_count(&self) -> Result<usize> {
        self.ensure_online()?;
        Ok(self.embedded()?.len())
    }

    async fn top_k(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        self.ensure_online()?;
        if !self.indexed {
            return Err(VectorStoreError::Other(
                "memory store was created without an index".to_string(),
            ));
        }
        let scored = self
            .embedded()?
            .into_iter()
            .filter_map(|passage| {
                let distance = cosine_distance(passage.searchable_embedding()?, embedding);
                Some(ScoredPassage::new(passage, distance))
            })
            .collect();
        Ok(select_top_k(scored, k))
    }

    async fn embedded_passages(&self) -> Result<Vec<Arc<PassageRecord>>> {
        self.ensure_online()?;
        self.embedded()
    }
}
