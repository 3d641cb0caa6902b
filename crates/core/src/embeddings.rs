use crate::error::EmbeddingError;

/// Matches the dimensionality of the MiniLM family the collection format
/// was sized for.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Pluggable embedding function. Must be deterministic for identical
/// input; the output dimensionality is fixed per collection.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts. Either every text gets a vector or the
    /// whole batch fails; callers rely on this for no-partial-insert.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Deterministic feature-hashing embedder over word unigrams and
/// character trigrams, L2-normalized. Stands in for a model-backed
/// embedding service while keeping the whole pipeline reproducible
/// offline.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn accumulate(&self, vector: &mut [f32], token: &str, weight: f32) {
        let bucket = (fnv1a(token.as_bytes()) % vector.len() as u64) as usize;
        vector[bucket] += weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();

        // Word features carry more weight than character features so whole
        // terms dominate while trigrams still catch partial matches.
        for word in lowered.split_whitespace() {
            self.accumulate(&mut vector, word, 2.0);
        }

        let chars: Vec<char> = lowered.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            self.accumulate(&mut vector, &trigram, 1.0);
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::default();
        let texts = vec!["business rules exchange".to_string()];
        let first = embedder.embed_batch(&texts).unwrap();
        let second = embedder.embed_batch(&texts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn vectors_have_fixed_dimensionality_and_unit_norm() {
        let embedder = HashEmbedder::new(64);
        let vectors = embedder
            .embed_batch(&["data module".to_string(), "applicability".to_string()])
            .unwrap();

        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), 64);
            let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_text_maps_to_the_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let vectors = embedder.embed_batch(&[String::new()]).unwrap();
        assert!(vectors[0].iter().all(|value| *value == 0.0));
    }

    #[test]
    fn related_texts_score_closer_than_unrelated_ones() {
        let embedder = HashEmbedder::default();
        let vectors = embedder
            .embed_batch(&[
                "producing business rules for a project".to_string(),
                "business rules production steps".to_string(),
                "hydraulic pump impeller torque".to_string(),
            ])
            .unwrap();

        let related = dot(&vectors[0], &vectors[1]);
        let unrelated = dot(&vectors[0], &vectors[2]);
        assert!(related > unrelated);
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
