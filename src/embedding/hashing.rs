//! Feature-hashing embedder
//!
//! Each lowercase word and each of its character trigrams is hashed (FNV-1a)
//! into one of `dimensions` buckets with a hash-derived sign, then the vector
//! is L2-normalized. Lexically overlapping texts score high; there is no
//! semantic knowledge. Stable across processes and platforms.

use super::{l2_normalize, Embedder, EmbeddingError};

/// Default vector length, matching all-MiniLM-L6-v2
pub const DEFAULT_DIMENSIONS: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Trigrams weigh less than whole words.
const TRIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    id: String,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-length vectors (at least 1).
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            id: format!("hashing-fnv1a:{}", dimensions),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word, 1.0);

            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.add_feature(&mut vector, &format!("#{}", trigram), TRIGRAM_WEIGHT);
                }
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn vectors_have_fixed_length_and_unit_norm() {
        let embedder = HashingEmbedder::new(64);
        let v = embedder.embed("Apply code SAVE15 for 15% off").unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let a = HashingEmbedder::new(128);
        let b = HashingEmbedder::new(128);
        assert_eq!(a.embed("discount code").unwrap(), b.embed("discount code").unwrap());
    }

    #[test]
    fn lexical_overlap_ranks_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("discount code").unwrap();
        let relevant = embedder.embed("Apply code SAVE15 for 15% off").unwrap();
        let unrelated = embedder.embed("Shipping takes three business days").unwrap();
        assert!(cosine_similarity(&query, &relevant) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let embedder = HashingEmbedder::new(32);
        assert_eq!(
            embedder.embed("Discount, CODE!").unwrap(),
            embedder.embed("discount code").unwrap()
        );
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed("").unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn id_encodes_dimensions() {
        assert_eq!(HashingEmbedder::new(384).id(), "hashing-fnv1a:384");
        assert_eq!(HashingEmbedder::new(0).dimensions(), 1);
    }
}
