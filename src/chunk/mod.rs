//! Sliding-window text chunking
//!
//! Text is split on character (Unicode scalar) boundaries into windows of
//! `size` characters, each starting `size - overlap` characters after the
//! previous one. The sequence ends with the first window that reaches the end
//! of the text, so every pair of consecutive chunks shares exactly `overlap`
//! characters and no chunk is wholly contained in its predecessor.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default window size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive windows in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Namespace for deterministic chunk identities.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_9b7d_4e58_a0c4_51d2_e8f7_b936);

/// Invalid chunking configuration. Fatal at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Validated chunking parameters.
///
/// Construct through [`ChunkConfig::new`]; an instance always satisfies
/// `overlap < size`, so the window always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChunkConfig")]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

#[derive(Deserialize)]
struct RawChunkConfig {
    #[serde(default = "default_size")]
    size: usize,
    #[serde(default = "default_overlap")]
    overlap: usize,
}

fn default_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl TryFrom<RawChunkConfig> for ChunkConfig {
    type Error = ChunkConfigError;

    fn try_from(raw: RawChunkConfig) -> Result<Self, Self::Error> {
        Self::new(raw.size, raw.overlap)
    }
}

impl ChunkConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        if size == 0 {
            return Err(ChunkConfigError::ZeroSize);
        }
        if overlap >= size {
            return Err(ChunkConfigError::OverlapTooLarge { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Number of chunks a text of `char_len` characters produces.
    pub fn chunk_count(&self, char_len: usize) -> usize {
        if char_len == 0 {
            0
        } else if char_len <= self.size {
            1
        } else {
            1 + (char_len - self.size).div_ceil(self.step())
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Lazy iterator over the windows of a text.
///
/// Cloning forks the iterator at its current position. Calling [`chunks`]
/// again on the same input restarts the identical sequence.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every char boundary, plus `text.len()` as sentinel
    boundaries: Vec<usize>,
    config: ChunkConfig,
    start: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let char_len = self.boundaries.len() - 1;
        if self.done || char_len == 0 {
            return None;
        }

        let end = (self.start + self.config.size).min(char_len);
        let slice = &self.text[self.boundaries[self.start]..self.boundaries[end]];

        if end == char_len {
            self.done = true;
        } else {
            self.start += self.config.step();
        }
        Some(slice)
    }
}

/// Split `text` into overlapping windows.
pub fn chunks<'a>(text: &'a str, config: &ChunkConfig) -> Chunks<'a> {
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    Chunks {
        text,
        boundaries,
        config: *config,
        start: 0,
        done: false,
    }
}

/// Split `text` into owned overlapping windows.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    chunks(text, config).map(str::to_string).collect()
}

/// Deterministic identity for the chunk at `sequence` within `source`.
pub fn chunk_id(source: &str, sequence: usize) -> Uuid {
    let name = format!("{}\u{1f}{}", source, sequence);
    Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes())
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    /// Name of the originating document
    pub source: String,
    /// 0-based position within the document's chunk list
    pub sequence: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(source: impl Into<String>, sequence: usize, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: chunk_id(&source, sequence),
            source,
            sequence,
            text: text.into(),
        }
    }
}

/// Chunk a whole document's text into identified chunks.
pub fn chunk_document(source: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    chunks(text, config)
        .enumerate()
        .map(|(sequence, window)| Chunk::new(source, sequence, window))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn cfg(size: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig::new(size, overlap).unwrap()
    }

    /// Undo the overlap: first chunk whole, then each later chunk minus its
    /// leading `overlap` characters.
    fn reconstruct(parts: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i == 0 {
                out.push_str(part);
            } else {
                out.extend(part.chars().skip(overlap));
            }
        }
        out
    }

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        if len == 0 {
            0
        } else if len <= overlap {
            1
        } else {
            (len - overlap).div_ceil(size - overlap)
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert_eq!(
            ChunkConfig::new(100, 100),
            Err(ChunkConfigError::OverlapTooLarge { size: 100, overlap: 100 })
        );
        assert_eq!(
            ChunkConfig::new(100, 250),
            Err(ChunkConfigError::OverlapTooLarge { size: 100, overlap: 250 })
        );
        assert_eq!(ChunkConfig::new(0, 0), Err(ChunkConfigError::ZeroSize));
        assert!(ChunkConfig::new(1, 0).is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let ok: ChunkConfig = serde_yaml::from_str("size: 500\noverlap: 50").unwrap();
        assert_eq!((ok.size(), ok.overlap()), (500, 50));

        let defaults: ChunkConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(defaults, ChunkConfig::default());

        assert!(serde_yaml::from_str::<ChunkConfig>("size: 100\noverlap: 100").is_err());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
        assert_eq!(ChunkConfig::default().chunk_count(0), 0);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "Apply code SAVE15 for 15% off";
        let parts = chunk_text(text, &ChunkConfig::default());
        assert_eq!(parts, vec![text.to_string()]);
    }

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let parts = chunk_text("abcdefghij", &cfg(4, 1));
        assert_eq!(parts, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn final_window_may_be_short() {
        let parts = chunk_text("abcdefghijk", &cfg(4, 1));
        assert_eq!(parts, vec!["abcd", "defg", "ghij", "jk"]);
    }

    #[test]
    fn exact_fit_has_no_redundant_tail() {
        // 1000 chars at 1000/200 is one window, not a second window
        // contained entirely in the first.
        let text = "x".repeat(1000);
        assert_eq!(chunk_text(&text, &ChunkConfig::default()).len(), 1);
        let text = "x".repeat(1001);
        assert_eq!(chunk_text(&text, &ChunkConfig::default()).len(), 2);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "€uro ✓ñ日本語テキスト";
        let config = cfg(5, 2);
        let parts = chunk_text(text, &config);
        for part in &parts {
            assert!(part.chars().count() <= 5);
        }
        assert_eq!(reconstruct(&parts, 2), text);
    }

    #[test]
    fn iterator_is_restartable_and_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog";
        let config = cfg(10, 3);
        let first: Vec<&str> = chunks(text, &config).collect();
        let second: Vec<&str> = chunks(text, &config).collect();
        assert_eq!(first, second);

        let mut iter = chunks(text, &config);
        iter.next();
        let fork = iter.clone();
        assert_eq!(iter.collect::<Vec<_>>(), fork.collect::<Vec<_>>());
    }

    #[test]
    fn reconstruction_and_count_hold_for_random_inputs() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let alphabet: Vec<char> = "abc xyz\n€✓日".chars().collect();

        for _ in 0..300 {
            let size = rng.gen_range(1..40);
            let overlap = rng.gen_range(0..size);
            let len = rng.gen_range(0..200);
            let text: String = (0..len)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let config = cfg(size, overlap);

            let parts = chunk_text(&text, &config);
            assert_eq!(parts.len(), expected_count(len, size, overlap), "len={len} size={size} overlap={overlap}");
            assert_eq!(parts.len(), config.chunk_count(len));
            assert_eq!(reconstruct(&parts, overlap), text);

            for pair in parts.windows(2) {
                assert_eq!(pair[0].chars().count(), size);
                let tail: String = pair[0].chars().skip(size - overlap).collect();
                let head: String = pair[1].chars().take(overlap).collect();
                assert_eq!(tail, head);
            }
        }
    }

    #[test]
    fn chunk_identity_is_deterministic_and_distinct() {
        assert_eq!(chunk_id("pricing.md", 0), chunk_id("pricing.md", 0));
        assert_ne!(chunk_id("pricing.md", 0), chunk_id("pricing.md", 1));
        assert_ne!(chunk_id("pricing.md", 0), chunk_id("checkout.html", 0));
        // separator prevents "a1"+"0" colliding with "a"+"10"
        assert_ne!(chunk_id("a1", 0), chunk_id("a", 10));
    }

    #[test]
    fn chunk_document_numbers_sequences() {
        let chunks = chunk_document("guide.txt", "abcdefghij", &cfg(4, 1));
        let seqs: Vec<usize> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.source == "guide.txt"));
        assert_eq!(chunks[1].id, chunk_id("guide.txt", 1));
    }
}
