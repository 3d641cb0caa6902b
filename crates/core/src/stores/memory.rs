use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{ChunkMetadata, CollectionStats, MetadataFilter, ScoredDocument};
use crate::store::{cosine_similarity, StoredDocument, VectorStore};
use crate::stores::{poisoned_lock, prepare_documents, upsert};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

pub const BACKEND: &str = "memory";

/// Brute-force in-memory cosine index. Has no native metadata filtering,
/// so filters are emulated by post-filtering scored candidates before
/// truncating to k.
pub struct InMemoryStore {
    collection_name: String,
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryStore {
    pub fn new(collection_name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collection_name: collection_name.into(),
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add_documents(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
        ids: Option<Vec<String>>,
    ) -> Result<(), StoreError> {
        let incoming = prepare_documents(self.embedder.as_ref(), texts, metadatas, ids)?;
        let mut documents = self.documents.write().map_err(|_| poisoned_lock(BACKEND))?;
        upsert(&mut documents, incoming);
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let query_vector = self
            .embedder
            .embed_batch(std::slice::from_ref(&query.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();

        let documents = self.documents.read().map_err(|_| poisoned_lock(BACKEND))?;
        let mut scored: Vec<ScoredDocument> = documents
            .iter()
            .map(|document| ScoredDocument {
                id: document.id.clone(),
                text: document.text.clone(),
                metadata: document.metadata.clone(),
                score: cosine_similarity(&query_vector, &document.embedding),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));

        // Filtering is emulated: candidates are filtered after scoring and
        // only then truncated to k.
        if let Some(filter) = filter {
            scored.retain(|candidate| filter.matches(&candidate.metadata));
        }

        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| poisoned_lock(BACKEND))?;
        documents.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let documents = self.documents.read().map_err(|_| poisoned_lock(BACKEND))?;
        Ok(CollectionStats {
            collection_name: self.collection_name.clone(),
            document_count: documents.len(),
            backend: BACKEND.to_string(),
        })
    }
}
