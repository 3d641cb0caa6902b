use crate::chunking::ContentAwareChunker;
use crate::config::IndexConfig;
use crate::error::{IndexError, StoreError};
use crate::extractor::{self, ContentExtractor, DocumentReader};
use crate::models::{
    Chunk, ChunkMetadata, CollectionStats, DocumentInfo, IndexReport, MetadataFilter,
    SearchOutcome, UNKNOWN_CHAPTER,
};
use crate::search::{PageTextCache, SearchRanker};
use crate::store::VectorStore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Progress callback, invoked after each processed page with
/// `(page, end_page)`.
pub type ProgressFn<'a> = dyn Fn(u32, u32) + Send + Sync + 'a;

/// Owns the vector store handle, the extraction pipeline, and the
/// page-text cache for one deployment. Created once at startup, passed by
/// reference to callers, reset explicitly on reindex — no process-wide
/// globals.
pub struct IndexSession {
    config: IndexConfig,
    reader: Arc<dyn DocumentReader>,
    store: Arc<dyn VectorStore>,
    extractor: ContentExtractor,
    chunker: ContentAwareChunker,
    ranker: SearchRanker,
    page_cache: PageTextCache,
}

impl IndexSession {
    pub fn new(
        config: IndexConfig,
        reader: Arc<dyn DocumentReader>,
        store: Arc<dyn VectorStore>,
        extractor: ContentExtractor,
    ) -> Result<Self, IndexError> {
        config.validate()?;

        let chunker = ContentAwareChunker::new(config.chunk_size, config.chunk_overlap);
        let ranker = SearchRanker::new(
            Arc::clone(&store),
            crate::search::default_boost_rules(),
            config.min_score,
        );

        Ok(Self {
            config,
            reader,
            store,
            extractor,
            chunker,
            ranker,
            page_cache: PageTextCache::new(),
        })
    }

    /// Extract, chunk, embed and store a page range, in bounded batches.
    ///
    /// Chunk ids are deterministic over `(collection, page, ordinal, text)`,
    /// so re-indexing a range without `force` overwrites the same documents
    /// instead of duplicating them. A failed batch is counted and the run
    /// continues; interruption between pages leaves no partial-page state.
    pub async fn index(
        &self,
        start_page: u32,
        end_page: Option<u32>,
        force: bool,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<IndexReport, IndexError> {
        if force {
            self.store.delete_collection().await?;
            self.page_cache.clear();
        }

        let total_pages = self.reader.page_count()?;
        let start = start_page.max(1);
        let end = end_page.unwrap_or(total_pages).min(total_pages);

        info!(start, end, total_pages, force, "indexing run started");

        let run_started = Instant::now();
        let mut indexing_secs = 0f64;
        let mut report = IndexReport::default();
        let mut pending: Vec<Chunk> = Vec::new();
        let mut pending_ids: Vec<String> = Vec::new();
        let mut ordinal = 0u64;

        for (page, blocks) in self.extractor.extract(self.reader.as_ref(), start, end) {
            report.pages_processed += 1;
            report.blocks_extracted += blocks.len();

            if !blocks.is_empty() {
                let page_text = blocks
                    .iter()
                    .map(|block| block.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let page_chapter = blocks
                    .iter()
                    .map(|block| block.chapter.clone())
                    .find(|chapter| chapter != UNKNOWN_CHAPTER)
                    .unwrap_or_else(|| UNKNOWN_CHAPTER.to_string());
                self.page_cache.insert(page, page_text, page_chapter);
            }

            for chunk in self.chunker.chunk_blocks(&blocks) {
                pending_ids.push(chunk_id(&self.config.collection_name, page, ordinal, &chunk.text));
                pending.push(chunk);
                ordinal += 1;
            }

            while pending.len() >= self.config.batch_size {
                let batch: Vec<Chunk> = pending.drain(..self.config.batch_size).collect();
                let ids: Vec<String> = pending_ids.drain(..self.config.batch_size).collect();
                indexing_secs += self.flush_batch(batch, ids, &mut report).await;
            }

            if let Some(progress) = progress {
                progress(page, end);
            }
        }

        if !pending.is_empty() {
            let batch: Vec<Chunk> = std::mem::take(&mut pending);
            let ids: Vec<String> = std::mem::take(&mut pending_ids);
            indexing_secs += self.flush_batch(batch, ids, &mut report).await;
        }

        report.indexing_secs = indexing_secs;
        report.extraction_secs = (run_started.elapsed().as_secs_f64() - indexing_secs).max(0.0);

        info!(
            pages = report.pages_processed,
            blocks = report.blocks_extracted,
            chunks = report.chunks_indexed,
            failed_batches = report.failed_batches,
            "indexing run finished"
        );

        Ok(report)
    }

    /// Embed and insert one batch. Failures abort only this batch.
    async fn flush_batch(&self, batch: Vec<Chunk>, ids: Vec<String>, report: &mut IndexReport) -> f64 {
        let batch_size = batch.len();
        let (texts, metadatas): (Vec<String>, Vec<ChunkMetadata>) = batch
            .into_iter()
            .map(|chunk| (chunk.text, chunk.metadata))
            .unzip();

        let started = Instant::now();
        match self.store.add_documents(&texts, &metadatas, Some(ids)).await {
            Ok(()) => report.chunks_indexed += batch_size,
            Err(StoreError::Embedding(error)) => {
                warn!(batch_size, %error, "embedding failed, batch dropped");
                report.failed_batches += 1;
            }
            Err(error) => {
                warn!(batch_size, %error, "store insert failed, batch dropped");
                report.failed_batches += 1;
            }
        }
        started.elapsed().as_secs_f64()
    }

    /// Ranked search; degrades to keyword scanning on store failure rather
    /// than surfacing the error.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> SearchOutcome {
        self.ranker
            .search_and_rank(query, k, filter, &self.page_cache)
            .await
    }

    /// Drop the collection and the page-text cache. Irreversible.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.delete_collection().await?;
        self.page_cache.clear();
        Ok(())
    }

    pub async fn stats(&self) -> Result<CollectionStats, StoreError> {
        self.store.stats().await
    }

    pub fn document_info(&self) -> Result<DocumentInfo, IndexError> {
        let page_count = self.reader.page_count()?;
        Ok(extractor::document_info(&self.config.pdf_path, page_count)?)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }
}

fn chunk_id(collection: &str, page: u32, ordinal: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ContentClassifier;
    use crate::embeddings::HashEmbedder;
    use crate::error::ExtractionError;
    use crate::extractor::TextSpan;
    use crate::models::ScoredDocument;
    use crate::stores::InMemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct FixtureReader {
        pages: Vec<Vec<&'static str>>,
    }

    impl DocumentReader for FixtureReader {
        fn page_count(&self) -> Result<u32, ExtractionError> {
            Ok(self.pages.len() as u32)
        }

        fn page_spans(&self, page: u32) -> Result<Vec<TextSpan>, ExtractionError> {
            Ok(self
                .pages
                .get((page - 1) as usize)
                .map(|spans| {
                    spans
                        .iter()
                        .map(|text| TextSpan {
                            text: text.to_string(),
                            bounding_box: None,
                            font_size: None,
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn fixture_reader() -> Arc<FixtureReader> {
        Arc::new(FixtureReader {
            pages: vec![
                vec![
                    "2.5 Business rules overview",
                    "Business rules are decisions a project makes about how to apply the specification.",
                ],
                vec![
                    "Chapter 2.5.2\nThere are 13 steps in producing business rules: \
                     1. Define scope 2. Identify stakeholders 3. Gather constraints \
                     4. Draft decisions 5. Review drafts 6. Approve decisions \
                     7. Publish rules 8. Train authors 9. Apply rules \
                     10. Validate output 11. Audit compliance 12. Collect feedback \
                     13. Maintain the rule set.",
                ],
                vec!["3.1 Applicability", "Applicability narrows content to a configuration."],
            ],
        })
    }

    fn test_config(dir: &TempDir) -> IndexConfig {
        let pdf_path: PathBuf = dir.path().join("spec.pdf");
        fs::write(&pdf_path, b"%PDF-1.4\n%fixture").unwrap();
        IndexConfig {
            pdf_path,
            persist_dir: dir.path().join("data"),
            batch_size: 4,
            ..Default::default()
        }
    }

    fn session(dir: &TempDir) -> IndexSession {
        let store = Arc::new(InMemoryStore::new(
            "test_docs",
            Arc::new(HashEmbedder::new(128)),
        ));
        IndexSession::new(
            test_config(dir),
            fixture_reader(),
            store,
            ContentExtractor::new(ContentClassifier::default(), None, None),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn index_then_search_ranks_the_known_answer_first() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir);

        let report = session.index(1, None, false, None).await.unwrap();
        assert_eq!(report.pages_processed, 3);
        assert!(report.blocks_extracted >= 6);
        assert!(report.chunks_indexed > 0);
        assert_eq!(report.failed_batches, 0);

        let outcome = session
            .search("major steps in producing business rules", 5, None)
            .await;
        assert!(!outcome.degraded);
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results[0].metadata.chapter, "2.5.2");
        assert_eq!(outcome.results[0].metadata.page, 2);
    }

    #[tokio::test]
    async fn reindexing_without_force_keeps_ranking_stable() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir);

        session.index(1, None, false, None).await.unwrap();
        let first_stats = session.stats().await.unwrap();
        let first = session.search("business rules", 5, None).await;

        session.index(1, None, false, None).await.unwrap();
        let second_stats = session.stats().await.unwrap();
        let second = session.search("business rules", 5, None).await;

        assert_eq!(first_stats.document_count, second_stats.document_count);
        let ids = |outcome: &SearchOutcome| {
            outcome
                .results
                .iter()
                .map(|hit: &ScoredDocument| hit.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn force_reindex_starts_from_an_empty_collection() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir);

        session.index(1, Some(1), false, None).await.unwrap();
        let partial = session.stats().await.unwrap().document_count;

        session.index(2, Some(3), true, None).await.unwrap();
        let stats = session.stats().await.unwrap();
        // Page 1 documents are gone after the forced reset.
        assert!(stats.document_count > 0);
        let outcome = session.search("business rules overview", 10, None).await;
        assert!(outcome
            .results
            .iter()
            .all(|hit| hit.metadata.page != 1 || partial == 0));
    }

    #[tokio::test]
    async fn progress_callback_fires_once_per_page() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        session
            .index(
                1,
                None,
                false,
                Some(&move |_page, _end| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn add_documents(
            &self,
            _texts: &[String],
            _metadatas: &[ChunkMetadata],
            _ids: Option<Vec<String>>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Backend {
                backend: "failing".to_string(),
                details: "insert refused".to_string(),
            })
        }

        async fn search(
            &self,
            _query: &str,
            _k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<ScoredDocument>, StoreError> {
            Err(StoreError::Backend {
                backend: "failing".to_string(),
                details: "search refused".to_string(),
            })
        }

        async fn delete_collection(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn stats(&self) -> Result<CollectionStats, StoreError> {
            Ok(CollectionStats {
                collection_name: "failing".to_string(),
                document_count: 0,
                backend: "failing".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failed_batches_are_counted_and_the_run_completes() {
        let dir = TempDir::new().unwrap();
        let session = IndexSession::new(
            test_config(&dir),
            fixture_reader(),
            Arc::new(FailingStore),
            ContentExtractor::new(ContentClassifier::default(), None, None),
        )
        .unwrap();

        let report = session.index(1, None, false, None).await.unwrap();
        assert_eq!(report.pages_processed, 3);
        assert!(report.failed_batches >= 1);
        assert_eq!(report.chunks_indexed, 0);
    }

    #[tokio::test]
    async fn degraded_search_scans_the_page_cache_after_store_failure() {
        let dir = TempDir::new().unwrap();
        let session = IndexSession::new(
            test_config(&dir),
            fixture_reader(),
            Arc::new(FailingStore),
            ContentExtractor::new(ContentClassifier::default(), None, None),
        )
        .unwrap();

        session.index(1, None, false, None).await.unwrap();
        let outcome = session.search("applicability configuration", 5, None).await;

        assert!(outcome.degraded);
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results[0].metadata.page, 3);
    }
}
