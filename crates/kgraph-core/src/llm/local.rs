//! Offline embedder for tests and air-gapped use

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::traits::Embedder;

/// Default vector width of [`HashEmbedder`]
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Deterministic embedder hashing character trigrams into a fixed-width,
/// L2-normalized vector.
///
/// Identical text always yields the identical vector, and texts sharing
/// most trigrams land close together. It has no notion of meaning, so
/// synonyms score no better than unrelated words.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASH_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidInput(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(text_to_vec(text, self.dimensions))
    }
}

fn text_to_vec(text: &str, dims: usize) -> Vec<f32> {
    let mut vec = vec![0.0; dims];
    let padded: Vec<char> = format!("  {}  ", text.to_lowercase()).chars().collect();

    for window in padded.windows(3) {
        let idx = (fnv1a(window) % dims as u64) as usize;
        vec[idx] += 1.0;
    }

    // Normalize
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for c in chars {
        let mut buf = [0u8; 4];
        for b in c.encode_utf8(&mut buf).bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    hash
}
