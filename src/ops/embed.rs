use unicode_segmentation::UnicodeSegmentation;

use crate::model::config::{EmbeddingConfig, EmbeddingProvider};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    Mismatch { expected: usize, got: usize },
}

/// The vector half of retrieval: turns text into fixed-size vectors.
pub trait EmbeddingBackend: Send + Sync {
    /// Identifies the model; embeddings from different models never mix
    fn model_id(&self) -> &str;

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, BackendError>;
}

/// Build the configured backend, or `None` for lexical-only retrieval
pub fn backend_from_config(config: &EmbeddingConfig) -> Option<Box<dyn EmbeddingBackend>> {
    match config.provider {
        EmbeddingProvider::Hashing => Some(Box::new(HashingEmbedder::new(config.dimensions))),
        EmbeddingProvider::None => None,
    }
}

/// Offline embedder: signed feature hashing of lowercased words and word
/// bigrams, L2-normalized. Texts sharing vocabulary land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        HashingEmbedder {
            dimensions,
            model: format!("hashing-{}", dimensions),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let words: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();
        let mut add = |feature: &str, weight: f32| {
            let h = fnv1a(feature.as_bytes());
            let idx = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * weight;
        };
        for w in &words {
            add(w, 1.0);
        }
        for pair in words.windows(2) {
            add(&format!("{} {}", pair[0], pair[1]), 0.5);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Cosine similarity; 0 when either vector is zero or the sizes differ
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
