use crate::models::{Chunk, ChunkMetadata, ContentBlock, ContentType};

/// Separator preference for split points: paragraph break, then line
/// break, then word boundary, then a hard character cut.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl SplitterConfig {
    pub const HEADING: SplitterConfig = SplitterConfig {
        chunk_size: 500,
        overlap: 50,
    };

    pub const LIST: SplitterConfig = SplitterConfig {
        chunk_size: 800,
        overlap: 100,
    };
}

/// Split `text` into pieces of at most `chunk_size` characters, with each
/// piece after the first repeating the previous piece's final `overlap`
/// characters. Split points prefer the separator hierarchy; character
/// order is preserved and no piece is ever empty, so stripping the overlap
/// prefix of every piece after the first reproduces the input exactly.
pub fn split_text(text: &str, config: SplitterConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= config.chunk_size {
        return vec![text.to_string()];
    }

    let overlap = config.overlap.min(config.chunk_size.saturating_sub(1));
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + config.chunk_size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            // A break must land past the overlap region or the cursor
            // would stop advancing.
            let min_break = start + (config.chunk_size / 2).max(overlap + 1);
            best_break(&chars, min_break.min(hard_end), hard_end).unwrap_or(hard_end)
        };

        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    pieces
}

/// Latest split point in `(lower, upper]` that falls just after a
/// separator, checked in preference order.
fn best_break(chars: &[char], lower: usize, upper: usize) -> Option<usize> {
    for separator in SEPARATORS {
        let sep_chars: Vec<char> = separator.chars().collect();
        let mut position = upper;
        while position > lower && position >= sep_chars.len() {
            if chars[position - sep_chars.len()..position] == sep_chars[..] {
                return Some(position);
            }
            position -= 1;
        }
    }
    None
}

/// Converts classified content blocks into retrieval-sized chunks, using a
/// splitting strategy selected by content type. Tables and diagrams are
/// indexed whole so their structure survives retrieval.
pub struct ContentAwareChunker {
    text_config: SplitterConfig,
}

impl ContentAwareChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            text_config: SplitterConfig {
                chunk_size,
                overlap: chunk_overlap,
            },
        }
    }

    fn config_for(&self, content_type: ContentType) -> SplitterConfig {
        match content_type {
            ContentType::Heading => SplitterConfig::HEADING,
            ContentType::List => SplitterConfig::LIST,
            _ => self.text_config,
        }
    }

    pub fn chunk_block(&self, block: &ContentBlock) -> Vec<Chunk> {
        if !block.content_type.is_splittable() {
            return vec![Chunk {
                text: block.text.clone(),
                metadata: ChunkMetadata {
                    page: block.page,
                    chapter: block.chapter.clone(),
                    content_type: block.content_type,
                    importance: block.importance,
                    chunk_index: 0,
                    total_chunks: 1,
                    chunked: false,
                    extra: block.metadata.clone(),
                },
            }];
        }

        let pieces = split_text(&block.text, self.config_for(block.content_type));
        let total_chunks = pieces.len();

        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                text,
                metadata: ChunkMetadata {
                    page: block.page,
                    chapter: block.chapter.clone(),
                    content_type: block.content_type,
                    importance: block.importance,
                    chunk_index,
                    total_chunks,
                    chunked: true,
                    extra: block.metadata.clone(),
                },
            })
            .collect()
    }

    pub fn chunk_blocks(&self, blocks: &[ContentBlock]) -> Vec<Chunk> {
        blocks
            .iter()
            .flat_map(|block| self.chunk_block(block))
            .collect()
    }
}

impl Default for ContentAwareChunker {
    fn default() -> Self {
        Self::new(1_000, 200)
    }
}
