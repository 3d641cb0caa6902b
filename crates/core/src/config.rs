use crate::error::ConfigError;
use std::path::PathBuf;

/// Default S1000D keyword set that raises block importance.
pub const DEFAULT_IMPORTANT_KEYWORDS: [&str; 8] = [
    "business rules",
    "data module",
    "publication module",
    "applicability",
    "brex",
    "csdb",
    "ietm",
    "common source database",
];

/// Engine configuration. Built once at startup; `validate` failures are
/// fatal, nothing here is re-read mid-run.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub pdf_path: PathBuf,
    pub collection_name: String,
    /// Directory for the persistent store backend.
    pub persist_dir: PathBuf,
    /// Default chunk size for plain text blocks, in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Number of chunks embedded and inserted per store batch.
    pub batch_size: usize,
    pub ocr_enabled: bool,
    pub ocr_endpoint: Option<String>,
    pub ocr_api_key: Option<String>,
    /// Font size above which a short span is treated as a heading.
    pub heading_font_size: f32,
    /// Minimum adjusted score a search candidate must reach to be returned.
    pub min_score: f64,
    pub embedding_dimensions: usize,
    pub important_keywords: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            pdf_path: PathBuf::from("s1000d.pdf"),
            collection_name: "s1000d_docs".to_string(),
            persist_dir: PathBuf::from("./index_data"),
            chunk_size: 1_000,
            chunk_overlap: 200,
            batch_size: 100,
            ocr_enabled: true,
            ocr_endpoint: None,
            ocr_api_key: None,
            heading_font_size: 14.0,
            min_score: 0.1,
            embedding_dimensions: 384,
            important_keywords: DEFAULT_IMPORTANT_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pdf_path.exists() {
            return Err(ConfigError::PdfNotFound(self.pdf_path.clone()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroValue("chunk_size"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroValue("batch_size"));
        }
        if self.embedding_dimensions == 0 {
            return Err(ConfigError::ZeroValue("embedding_dimensions"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}
