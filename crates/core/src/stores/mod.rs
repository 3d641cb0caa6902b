pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::InMemoryStore;

use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, StoreError};
use crate::models::ChunkMetadata;
use crate::store::StoredDocument;
use uuid::Uuid;

/// Validate an `add_documents` call and embed the whole batch up front, so
/// a failure anywhere leaves the collection untouched.
pub(crate) fn prepare_documents(
    embedder: &dyn Embedder,
    texts: &[String],
    metadatas: &[ChunkMetadata],
    ids: Option<Vec<String>>,
) -> Result<Vec<StoredDocument>, StoreError> {
    if texts.len() != metadatas.len() {
        return Err(EmbeddingError::LengthMismatch {
            texts: texts.len(),
            metadatas: metadatas.len(),
        }
        .into());
    }

    if let Some(ids) = &ids {
        if ids.len() != texts.len() {
            return Err(StoreError::InvalidArgument(format!(
                "ids length {} does not match texts length {}",
                ids.len(),
                texts.len()
            )));
        }
    }

    let embeddings = embedder.embed_batch(texts)?;
    for embedding in &embeddings {
        if embedding.len() != embedder.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: embedder.dimensions(),
                actual: embedding.len(),
            }
            .into());
        }
    }

    let ids = ids.unwrap_or_else(|| {
        texts
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect::<Vec<_>>()
    });

    Ok(ids
        .into_iter()
        .zip(texts.iter().cloned())
        .zip(embeddings)
        .zip(metadatas.iter().cloned())
        .map(|(((id, text), embedding), metadata)| StoredDocument {
            id,
            embedding,
            text,
            metadata,
        })
        .collect())
}

/// Insert or overwrite by id.
pub(crate) fn upsert(documents: &mut Vec<StoredDocument>, incoming: Vec<StoredDocument>) {
    for document in incoming {
        match documents.iter_mut().find(|existing| existing.id == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }
}

pub(crate) fn poisoned_lock(backend: &str) -> StoreError {
    StoreError::Backend {
        backend: backend.to_string(),
        details: "collection lock poisoned".to_string(),
    }
}
