use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provenance value attached to a passage (page number, source title, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Number(f64),
    Text(String),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A chunk of source-document text together with its embedding.
///
/// The embedding is either complete or absent; passages without one are
/// stored but never searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    pub id: String,
    pub source_id: String,
    #[serde(default)]
    pub sequence_index: usize,
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl PassageRecord {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        sequence_index: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            sequence_index,
            text: text.into(),
            embedding: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Embedding usable for search: present and non-empty.
    #[must_use]
    pub fn searchable_embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|v| !v.is_empty())
    }
}

/// A passage paired with its distance to a query, as returned by the corpus index.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Arc<PassageRecord>,
    pub distance: f32,
}

impl ScoredPassage {
    #[must_use]
    pub const fn new(passage: Arc<PassageRecord>, distance: f32) -> Self {
        Self { passage, distance }
    }
}

/// Store capabilities reported once by the startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCapabilities {
    /// The store maintains its own similarity index and answers `top_k` directly.
    pub indexed: bool,
    /// Embedding dimension of the stored passages, when known.
    pub dimension: Option<usize>,
}
