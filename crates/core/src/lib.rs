pub mod chunking;
pub mod classifier;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod search;
pub mod session;
pub mod store;
pub mod stores;

pub use chunking::{split_text, ContentAwareChunker, SplitterConfig};
pub use classifier::{ContentClassifier, LayoutHint};
pub use config::{IndexConfig, DEFAULT_IMPORTANT_KEYWORDS};
pub use embeddings::{Embedder, HashEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    ConfigError, EmbeddingError, ExtractionError, IndexError, Result, StoreError,
};
pub use extractor::{
    document_info, ContentExtractor, DocumentReader, HttpOcrClient, LopdfReader, OcrEngine,
    PageExtract, PageStream, TableReader, TextSpan,
};
pub use models::{
    Chunk, ChunkMetadata, CollectionStats, ContentBlock, ContentType, DocumentInfo, IndexReport,
    MetadataFilter, MetadataValue, Rect, ScoredDocument, SearchOutcome, UNKNOWN_CHAPTER,
};
pub use search::{default_boost_rules, BoostRule, PageTextCache, SearchRanker};
pub use session::{IndexSession, ProgressFn};
pub use store::{cosine_similarity, StoredDocument, VectorStore};
pub use stores::{DiskStore, InMemoryStore};
