use crate::classifier::{ContentClassifier, LayoutHint};
use crate::error::ExtractionError;
use crate::models::{ContentBlock, ContentType, DocumentInfo, MetadataValue, Rect, UNKNOWN_CHAPTER};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use lopdf::{Document, Object};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// OCR output at or below this many characters is treated as "no text
/// found", not as an error.
const MIN_OCR_TEXT_CHARS: usize = 10;

/// A positioned text span as reported by a reader backend.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub bounding_box: Option<Rect>,
    pub font_size: Option<f32>,
}

/// Page-oriented access to the source document. Backends that cannot
/// report layout leave bounding boxes and font sizes unset.
pub trait DocumentReader: Send + Sync {
    fn page_count(&self) -> Result<u32, ExtractionError>;

    fn page_spans(&self, page: u32) -> Result<Vec<TextSpan>, ExtractionError>;

    /// Raw bytes of the images embedded on a page.
    fn page_images(&self, page: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        let _ = page;
        Ok(Vec::new())
    }
}

/// Structured-table collaborator: rows of cells per table on a page.
pub trait TableReader: Send + Sync {
    fn page_tables(&self, page: u32) -> Result<Vec<Vec<Vec<String>>>, ExtractionError>;
}

/// Image-to-text collaborator. May return an empty string.
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image: &[u8]) -> Result<String, ExtractionError>;
}

/// lopdf-backed reader. Spans are the blank-line separated blocks of the
/// extracted page text; this backend has no layout model, so no boxes.
pub struct LopdfReader {
    document: Document,
}

impl LopdfReader {
    pub fn open(path: &Path) -> Result<Self, ExtractionError> {
        let document =
            Document::load(path).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
        Ok(Self { document })
    }
}

impl DocumentReader for LopdfReader {
    fn page_count(&self) -> Result<u32, ExtractionError> {
        Ok(self.document.get_pages().len() as u32)
    }

    fn page_spans(&self, page: u32) -> Result<Vec<TextSpan>, ExtractionError> {
        let text = self
            .document
            .extract_text(&[page])
            .map_err(|error| ExtractionError::UnreadablePage {
                page,
                details: error.to_string(),
            })?;

        Ok(text
            .split("\n\n")
            .map(str::trim)
            .filter(|span| !span.is_empty())
            .map(|span| TextSpan {
                text: span.to_string(),
                bounding_box: None,
                font_size: None,
            })
            .collect())
    }

    fn page_images(&self, page: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        let pages = self.document.get_pages();
        let Some(page_id) = pages.get(&page).copied() else {
            return Ok(Vec::new());
        };

        let mut images = Vec::new();
        let Ok(page_dict) = self.document.get_dictionary(page_id) else {
            return Ok(images);
        };
        let Some(resources) = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|object| self.resolve_dict(object))
        else {
            return Ok(images);
        };
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|object| self.resolve_dict(object))
        else {
            return Ok(images);
        };

        for (_name, object) in xobjects.iter() {
            let stream = match object {
                Object::Reference(id) => self
                    .document
                    .get_object(*id)
                    .ok()
                    .and_then(|resolved| resolved.as_stream().ok()),
                Object::Stream(stream) => Some(stream),
                _ => None,
            };

            if let Some(stream) = stream {
                let is_image = stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|subtype| subtype.as_name().ok())
                    .is_some_and(|name| name == b"Image");
                if is_image {
                    images.push(stream.content.clone());
                }
            }
        }

        Ok(images)
    }
}

impl LopdfReader {
    fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a lopdf::Dictionary> {
        match object {
            Object::Reference(id) => self
                .document
                .get_object(*id)
                .ok()
                .and_then(|resolved| resolved.as_dict().ok()),
            Object::Dictionary(dictionary) => Some(dictionary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    image_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP OCR collaborator client: posts the image as base64 JSON to the
/// configured endpoint with an optional bearer key.
pub struct HttpOcrClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpOcrClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            client: Client::new(),
        }
    }
}

impl OcrEngine for HttpOcrClient {
    fn extract_text(&self, image: &[u8]) -> Result<String, ExtractionError> {
        let payload = OcrRequest {
            image_base64: STANDARD.encode(image),
        };

        tokio::task::block_in_place(|| {
            let mut request = self
                .client
                .post(&self.endpoint)
                .header("content-type", "application/json")
                .json(&payload);

            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key);
            }

            let response = request
                .send()
                .map_err(|error| ExtractionError::Ocr(error.to_string()))?;

            if !response.status().is_success() {
                return Err(ExtractionError::Ocr(format!(
                    "ocr endpoint {} returned {}",
                    self.endpoint,
                    response.status()
                )));
            }

            let parsed: OcrResponse = response
                .json()
                .map_err(|error| ExtractionError::Ocr(error.to_string()))?;
            Ok(parsed.text.unwrap_or_default())
        })
    }
}

/// One extracted page: its content blocks plus the chapter context to
/// carry into the next page.
pub struct PageExtract {
    pub blocks: Vec<ContentBlock>,
    pub carry: String,
}

/// Walks the document page by page, classifies spans, tracks the current
/// chapter, and folds in table and OCR collaborator output.
pub struct ContentExtractor {
    classifier: ContentClassifier,
    ocr: Option<Arc<dyn OcrEngine>>,
    tables: Option<Arc<dyn TableReader>>,
}

impl ContentExtractor {
    pub fn new(
        classifier: ContentClassifier,
        ocr: Option<Arc<dyn OcrEngine>>,
        tables: Option<Arc<dyn TableReader>>,
    ) -> Self {
        Self {
            classifier,
            ocr,
            tables,
        }
    }

    /// Extract a single page. `carried_chapter` is the last chapter seen on
    /// earlier pages; blocks before this page's first marker inherit it.
    pub fn extract_page(
        &self,
        reader: &dyn DocumentReader,
        page: u32,
        carried_chapter: &str,
    ) -> Result<PageExtract, ExtractionError> {
        let spans = reader.page_spans(page)?;
        let mut blocks = Vec::new();
        let mut current_chapter = carried_chapter.to_string();

        for span in &spans {
            if span.text.trim().is_empty() {
                continue;
            }

            let chapter = self.classifier.extract_chapter(&span.text, &current_chapter);
            if chapter != UNKNOWN_CHAPTER {
                current_chapter = chapter;
            }

            let hint = LayoutHint {
                font_size: span.font_size,
            };
            let (content_type, importance) = self.classifier.classify(&span.text, Some(hint));

            blocks.push(ContentBlock {
                text: span.text.trim().to_string(),
                content_type,
                page,
                chapter: current_chapter.clone(),
                bounding_box: span.bounding_box,
                importance,
                metadata: BTreeMap::new(),
            });
        }

        // Blocks emitted before the first marker on the page inherit the
        // page's first resolved chapter.
        let page_chapter = blocks
            .iter()
            .map(|block| block.chapter.clone())
            .find(|chapter| chapter != UNKNOWN_CHAPTER)
            .unwrap_or_else(|| current_chapter.clone());
        for block in &mut blocks {
            if block.chapter == UNKNOWN_CHAPTER {
                block.chapter = page_chapter.clone();
            }
        }

        if let Some(ocr) = &self.ocr {
            blocks.extend(self.ocr_blocks(reader, page, ocr.as_ref(), &page_chapter));
        }

        if let Some(tables) = &self.tables {
            blocks.extend(self.table_blocks(tables.as_ref(), page, &page_chapter));
        }

        let carry = if current_chapter == UNKNOWN_CHAPTER {
            carried_chapter.to_string()
        } else {
            current_chapter
        };

        Ok(PageExtract { blocks, carry })
    }

    fn ocr_blocks(
        &self,
        reader: &dyn DocumentReader,
        page: u32,
        ocr: &dyn OcrEngine,
        chapter: &str,
    ) -> Vec<ContentBlock> {
        let images = match reader.page_images(page) {
            Ok(images) => images,
            Err(error) => {
                warn!(page, %error, "image enumeration failed, skipping ocr pass");
                return Vec::new();
            }
        };

        let mut blocks = Vec::new();
        for (image_index, image) in images.iter().enumerate() {
            let text = match ocr.extract_text(image) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page, image_index, %error, "ocr failed for image");
                    continue;
                }
            };

            let trimmed = text.trim();
            if trimmed.chars().count() <= MIN_OCR_TEXT_CHARS {
                continue;
            }

            let mut metadata = BTreeMap::new();
            metadata.insert(
                "image_index".to_string(),
                MetadataValue::Int(image_index as i64),
            );
            metadata.insert(
                "image_size".to_string(),
                MetadataValue::Int(image.len() as i64),
            );
            metadata.insert("ocr_applied".to_string(), MetadataValue::Bool(true));

            blocks.push(ContentBlock {
                text: trimmed.to_string(),
                content_type: ContentType::Diagram,
                page,
                chapter: chapter.to_string(),
                bounding_box: None,
                importance: self
                    .classifier
                    .score_importance(trimmed, ContentType::Diagram),
                metadata,
            });
        }

        blocks
    }

    fn table_blocks(
        &self,
        tables: &dyn TableReader,
        page: u32,
        chapter: &str,
    ) -> Vec<ContentBlock> {
        let extracted = match tables.page_tables(page) {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(page, %error, "table extraction failed, skipping table pass");
                return Vec::new();
            }
        };

        let mut blocks = Vec::new();
        for (table_index, table) in extracted.iter().enumerate() {
            if table.is_empty() {
                continue;
            }

            let text = table
                .iter()
                .map(|row| row.join(" | "))
                .collect::<Vec<_>>()
                .join("\n");

            let mut metadata = BTreeMap::new();
            metadata.insert(
                "table_index".to_string(),
                MetadataValue::Int(table_index as i64),
            );
            metadata.insert("rows".to_string(), MetadataValue::Int(table.len() as i64));

            blocks.push(ContentBlock {
                text: text.clone(),
                content_type: ContentType::Table,
                page,
                chapter: chapter.to_string(),
                bounding_box: None,
                importance: self.classifier.score_importance(&text, ContentType::Table),
                metadata,
            });
        }

        blocks
    }

    /// Lazy page-range walk. Each page is processed independently, so the
    /// stream is restartable; page-level failures are logged and yield an
    /// empty page instead of aborting the run.
    pub fn extract<'a>(
        &'a self,
        reader: &'a dyn DocumentReader,
        start_page: u32,
        end_page: u32,
    ) -> PageStream<'a> {
        PageStream {
            extractor: self,
            reader,
            next_page: start_page.max(1),
            end_page,
            carry: UNKNOWN_CHAPTER.to_string(),
        }
    }
}

pub struct PageStream<'a> {
    extractor: &'a ContentExtractor,
    reader: &'a dyn DocumentReader,
    next_page: u32,
    end_page: u32,
    carry: String,
}

impl Iterator for PageStream<'_> {
    type Item = (u32, Vec<ContentBlock>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_page > self.end_page {
            return None;
        }
        let page = self.next_page;
        self.next_page += 1;

        match self.extractor.extract_page(self.reader, page, &self.carry) {
            Ok(extract) => {
                self.carry = extract.carry;
                Some((page, extract.blocks))
            }
            Err(error) => {
                warn!(page, %error, "page extraction failed, skipping page");
                Some((page, Vec::new()))
            }
        }
    }
}

/// Identity record for the source document.
pub fn document_info(path: &Path, page_count: u32) -> Result<DocumentInfo, ExtractionError> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);

    Ok(DocumentInfo {
        filename: path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string(),
        page_count,
        checksum: format!("{:x}", hasher.finalize()),
        indexed_at: Utc::now(),
    })
}
