use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Classified kind of a content block. `Diagram` only arises from
/// OCR-recovered image text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Heading,
    List,
    Table,
    Diagram,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Heading => "heading",
            ContentType::List => "list",
            ContentType::Table => "table",
            ContentType::Diagram => "diagram",
            ContentType::Text => "text",
        }
    }

    /// Tables and diagrams are indexed whole, never split into chunks.
    pub fn is_splittable(&self) -> bool {
        !matches!(self, ContentType::Table | ContentType::Diagram)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "heading" => Ok(ContentType::Heading),
            "list" => Ok(ContentType::List),
            "table" => Ok(ContentType::Table),
            "diagram" => Ok(ContentType::Diagram),
            "text" => Ok(ContentType::Text),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

/// Page-space rectangle, x0/y0 top-left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Storage-safe scalar metadata value. Anything richer has to be rendered
/// to `Str` before it reaches the store boundary, so metadata filters stay
/// well defined across backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Sentinel chapter value for blocks seen before any chapter marker.
pub const UNKNOWN_CHAPTER: &str = "Unknown";

/// A classified unit of document content produced by the extractor.
///
/// `importance` is computed once by the classifier from the content type,
/// the text, and chapter-marker presence; it is never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    pub text: String,
    pub content_type: ContentType,
    /// 1-indexed page number.
    pub page: u32,
    /// Section identifier such as "2.5.2", or [`UNKNOWN_CHAPTER`].
    pub chapter: String,
    pub bounding_box: Option<Rect>,
    /// 1..=5, where 5 is reserved for chapter-marker blocks.
    pub importance: u8,
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// Metadata carried by every chunk into the vector store. All fields are
/// scalar by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub page: u32,
    pub chapter: String,
    pub content_type: ContentType,
    pub importance: u8,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunked: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, MetadataValue>,
}

/// A retrieval unit derived from exactly one content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A store search hit. Higher score means more relevant; the scale is
/// backend-specific, which is why ranking boosts are additive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

/// Equality/range predicate map for store searches. Backends must support
/// equality on chapter, content type and page, and `>=` on importance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilter {
    pub chapter: Option<String>,
    pub content_type: Option<ContentType>,
    pub min_importance: Option<u8>,
    pub page: Option<u32>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.chapter.is_none()
            && self.content_type.is_none()
            && self.min_importance.is_none()
            && self.page.is_none()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(chapter) = &self.chapter {
            if metadata.chapter != *chapter {
                return false;
            }
        }
        if let Some(content_type) = self.content_type {
            if metadata.content_type != content_type {
                return false;
            }
        }
        if let Some(min_importance) = self.min_importance {
            if metadata.importance < min_importance {
                return false;
            }
        }
        if let Some(page) = self.page {
            if metadata.page != page {
                return false;
            }
        }
        true
    }
}

/// Collection statistics exposed by every store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection_name: String,
    pub document_count: usize,
    pub backend: String,
}

/// Statistics record returned by a full indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub pages_processed: u32,
    pub blocks_extracted: usize,
    pub chunks_indexed: usize,
    pub failed_batches: usize,
    pub extraction_secs: f64,
    pub indexing_secs: f64,
}

/// Identity of the indexed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub page_count: u32,
    pub checksum: String,
    pub indexed_at: DateTime<Utc>,
}

/// Ranked search response. `degraded` is set when the vector path failed
/// and the results came from keyword scanning instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<ScoredDocument>,
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(chapter: &str, importance: u8) -> ChunkMetadata {
        ChunkMetadata {
            page: 2,
            chapter: chapter.to_string(),
            content_type: ContentType::Text,
            importance,
            chunk_index: 0,
            total_chunks: 1,
            chunked: false,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn filter_combines_equality_and_min_importance() {
        let filter = MetadataFilter {
            chapter: Some("2.5.2".to_string()),
            min_importance: Some(3),
            ..Default::default()
        };

        assert!(filter.matches(&metadata("2.5.2", 4)));
        assert!(!filter.matches(&metadata("2.5.2", 2)));
        assert!(!filter.matches(&metadata("2.5", 5)));
    }

    #[test]
    fn metadata_values_round_trip_as_plain_scalars() {
        let mut extra = BTreeMap::new();
        extra.insert("rows".to_string(), MetadataValue::Int(7));
        extra.insert("ocr_applied".to_string(), MetadataValue::Bool(true));

        let json = serde_json::to_string(&extra).unwrap();
        assert!(json.contains("\"rows\":7"));
        assert!(json.contains("\"ocr_applied\":true"));

        let parsed: BTreeMap<String, MetadataValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, extra);
    }
}
