use crate::error::StoreError;
use crate::models::{ChunkMetadata, CollectionStats, MetadataFilter, ScoredDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The persisted unit inside a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Backend-agnostic vector store contract.
///
/// Implementations must serialize structural mutations relative to reads
/// (single-writer / multiple-reader) and must map every backend failure
/// into [`StoreError`] rather than leaking their own error types.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and insert one document per text. `ids`, when given, must
    /// match `texts` in length; an existing id is overwritten. When `ids`
    /// is omitted the store generates ids unique within the collection.
    /// Embedding failure for any item fails the whole call with no
    /// partial insert.
    async fn add_documents(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
        ids: Option<Vec<String>>,
    ) -> Result<(), StoreError>;

    /// At most `k` hits, ordered by descending score.
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredDocument>, StoreError>;

    /// Irreversible. The collection is usable (empty) afterwards.
    async fn delete_collection(&self) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<CollectionStats, StoreError>;
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    f64::from(dot / (left_norm * right_norm))
}
