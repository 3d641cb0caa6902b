use std::path::PathBuf;
use thiserror::Error;

/// Page- or image-level extraction failures. These are local: the extractor
/// logs them and skips the page, the run continues.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("unreadable page {page}: {details}")]
    UnreadablePage { page: u32, details: String },

    #[error("ocr request failed: {0}")]
    Ocr(String),
}

/// Embedding failures abort the current batch with no partial insert.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("texts and metadatas length mismatch: {texts} texts, {metadatas} metadatas")]
    LengthMismatch { texts: usize, metadatas: usize },

    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding generation failed: {0}")]
    Failed(String),
}

/// Single error kind crossing the vector store boundary. Backend-specific
/// failures must be mapped into one of these variants before surfacing.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{backend} backend error: {details}")]
    Backend { backend: String, details: String },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fatal at startup, never recoverable mid-run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pdf not found: {0}")]
    PdfNotFound(PathBuf),

    #[error("chunk overlap {overlap} must be smaller than chunk size {size}")]
    OverlapTooLarge { size: usize, overlap: usize },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Umbrella error for orchestrator entry points.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
