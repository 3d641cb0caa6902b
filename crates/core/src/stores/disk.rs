use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{ChunkMetadata, CollectionStats, MetadataFilter, ScoredDocument};
use crate::store::{cosine_similarity, StoredDocument, VectorStore};
use crate::stores::{poisoned_lock, prepare_documents, upsert};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const BACKEND: &str = "disk";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    documents: Vec<StoredDocument>,
}

/// Persistent store. The collection lives in one JSON file under the
/// persist directory and is rewritten atomically (temp file + rename)
/// after every mutation, so readers never observe a partially written
/// collection even across process crashes.
pub struct DiskStore {
    collection_name: String,
    file_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<StoredDocument>>,
}

impl DiskStore {
    /// Open (or create) the collection at `persist_dir/<name>.json`.
    pub fn open(
        persist_dir: &Path,
        collection_name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        let collection_name = collection_name.into();
        fs::create_dir_all(persist_dir)?;
        let file_path = persist_dir.join(format!("{collection_name}.json"));

        let documents = if file_path.exists() {
            let raw = fs::read_to_string(&file_path)?;
            let collection: CollectionFile = serde_json::from_str(&raw)?;
            collection.documents
        } else {
            Vec::new()
        };

        Ok(Self {
            collection_name,
            file_path,
            embedder,
            documents: RwLock::new(documents),
        })
    }

    fn persist(&self, documents: &[StoredDocument]) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&CollectionFile {
            documents: documents.to_vec(),
        })?;
        let temp_path = self.file_path.with_extension("json.tmp");
        fs::write(&temp_path, serialized)?;
        fs::rename(&temp_path, &self.file_path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for DiskStore {
    async fn add_documents(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
        ids: Option<Vec<String>>,
    ) -> Result<(), StoreError> {
        let incoming = prepare_documents(self.embedder.as_ref(), texts, metadatas, ids)?;
        let mut documents = self.documents.write().map_err(|_| poisoned_lock(BACKEND))?;
        upsert(&mut documents, incoming);
        self.persist(&documents)
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

        // Native filtering: restrict the candidate set before scoring.
        let mut scored: Vec<ScoredDocument> = documents
            .iter()
            .filter(|document| {
                filter
                    .map(|filter| filter.matches(&document.metadata))
                    .unwrap_or(true)
            })
            .map(|document| ScoredDocument {
                id: document.id.clone(),
                text: document.text.clone(),
                metadata: document.metadata.clone(),
                score: cosine_similarity(&query_vector, &document.embedding),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| poisoned_lock(BACKEND))?;
        documents.clear();
        match fs::remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::models::ContentType;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn metadata(page: u32, chapter: &str) -> ChunkMetadata {
        ChunkMetadata {
            page,
            chapter: chapter.to_string(),
            content_type: ContentType::Text,
            importance: 3,
            chunk_index: 0,
            total_chunks: 1,
            chunked: false,
            extra: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn collection_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));

        {
            let store = DiskStore::open(dir.path(), "s1000d_docs", Arc::clone(&embedder))?;
            store
                .add_documents(
                    &["business rules are produced in steps".to_string()],
                    &[metadata(2, "2.5.2")],
                    Some(vec!["doc-1".to_string()]),
                )
                .await?;
        }

        let reopened = DiskStore::open(dir.path(), "s1000d_docs", embedder)?;
        let stats = reopened.stats().await?;
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.backend, "disk");

        let hits = reopened.search("business rules", 5, None).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "doc-1");
        assert_eq!(hits[0].metadata.chapter, "2.5.2");
        Ok(())
    }

    #[tokio::test]
    async fn native_filter_restricts_before_scoring() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DiskStore::open(dir.path(), "docs", Arc::new(HashEmbedder::new(32)))?;

        store
            .add_documents(
                &[
                    "chapter two content".to_string(),
                    "chapter four content".to_string(),
                ],
                &[metadata(2, "2.5"), metadata(4, "4.1")],
                None,
            )
            .await?;

        let filter = MetadataFilter {
            page: Some(4),
            ..Default::default()
        };
        let hits = store.search("content", 10, Some(&filter)).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.page, 4);
        Ok(())
    }

    #[tokio::test]
    async fn delete_collection_removes_the_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DiskStore::open(dir.path(), "docs", Arc::new(HashEmbedder::new(32)))?;

        store
            .add_documents(
                &["some text".to_string()],
                &[metadata(1, "1.0")],
                None,
            )
            .await?;
        assert!(dir.path().join("docs.json").exists());

        store.delete_collection().await?;
        assert!(!dir.path().join("docs.json").exists());
        assert_eq!(store.stats().await?.document_count, 0);
        Ok(())
    }
}
