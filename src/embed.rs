//! Text embedding behind a single `embed(text) -> vector` contract.
//!
//! The pipeline only depends on [`Embedder`]. The backend is picked by
//! `[embedding] backend`: `onnx` runs a sentence-transformer model
//! (all-MiniLM-L6-v2 by default) through ONNX Runtime and needs the `onnx`
//! cargo feature; `hashing` is the offline [`HashingEmbedder`], feature-hashed
//! word unigrams and bigrams, lexical only.

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::EmbedError;
use ahash::RandomState;
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

// Fixed seeds keep vectors identical across runs and machines.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

pub trait Embedder {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Vectors as the backend produces them. Backends with batched inference
    /// override this.
    fn embed_raw_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Unit-length vectors for every text, failing on the first error or
    /// wrong-sized vector.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let expected = self.dimension();
        let mut vectors = self.embed_raw_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Service(format!(
                "backend returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        for vector in &mut vectors {
            if vector.len() != expected {
                return Err(EmbedError::InvalidDimension {
                    expected,
                    actual: vector.len(),
                });
            }
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

/// Build the configured backend. A backend that cannot be loaded becomes an
/// [`UnavailableEmbedder`], so the failure surfaces in the semantic pass and
/// the exact pass still runs.
pub fn load_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    match try_load_embedder(config) {
        Ok(embedder) => embedder,
        Err(e) => {
            tracing::error!(error = %e, backend = ?config.backend, "embedding backend unavailable");
            Box::new(UnavailableEmbedder {
                dimension: config.dimension,
                reason: e.to_string(),
            })
        }
    }
}

pub fn try_load_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbedError> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Box::new(HashingEmbedder::new(config.dimension))),
        #[cfg(feature = "onnx")]
        EmbeddingBackend::Onnx => Ok(Box::new(crate::onnx::OnnxEmbedder::load(config)?)),
        #[cfg(not(feature = "onnx"))]
        EmbeddingBackend::Onnx => Err(EmbedError::Service(
            "built without the `onnx` feature; rebuild with `--features onnx` or set [embedding] backend = \"hashing\""
                .to_string(),
        )),
    }
}

/// Stands in for a backend that failed to load; every call fails with the
/// load error.
#[derive(Debug, Clone)]
pub struct UnavailableEmbedder {
    dimension: usize,
    reason: String,
}

impl Embedder for UnavailableEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Service(self.reason.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    state: RandomState,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RandomState::with_seeds(HASH_SEEDS[0], HASH_SEEDS[1], HASH_SEEDS[2], HASH_SEEDS[3]),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str) {
        let h = self.state.hash_one(feature);
        let bucket = (h % self.dimension as u64) as usize;
        // Top bit picks the sign so collisions tend to cancel rather than pile up.
        let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if self.dimension == 0 {
            return Err(EmbedError::InvalidDimension {
                expected: 1,
                actual: 0,
            });
        }
        let tokens: Vec<&str> = TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect();
        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            self.add_feature(&mut vector, token);
        }
        for window in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", window[0], window[1]));
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine of two vectors from [`Embedder::embed_batch`]. Those are unit
/// length, so this is their dot product; mismatched lengths score zero.
pub fn unit_cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn dimension(&self) -> usize {
            4
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text.contains("boom") {
                Err(EmbedError::Service("model unavailable".to_string()))
            } else {
                Ok(vec![1.0, 0.0, 0.0])
            }
        }
    }

    struct RawEmbedder;

    impl Embedder for RawEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![3.0, 4.0])
        }
    }

    #[test]
    fn test_identical_text_identical_vectors() {
        let embedder = HashingEmbedder::new(64);
        let vs = embedder
            .embed_batch(&["title: login\nsteps: open app", "title: login\nsteps: open app"])
            .unwrap();
        assert_eq!(vs[0], vs[1]);
        assert!((unit_cosine(&vs[0], &vs[1]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vectors_are_unit_length() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed("open the settings screen").unwrap();
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_batch_normalizes_backend_output() {
        let vs = RawEmbedder.embed_batch(&["a"]).unwrap();
        assert!((vs[0][0] - 0.6).abs() < 1e-6);
        assert!((vs[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_related_text_scores_higher_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let vs = embedder
            .embed_batch(&[
                "open the app and tap the login button with valid credentials",
                "open the app and tap the login button with invalid credentials",
                "change wallpaper from gallery picker in display preferences",
            ])
            .unwrap();
        assert!(unit_cosine(&vs[0], &vs[1]) > 0.7);
        assert!(unit_cosine(&vs[0], &vs[2]) < 0.3);
    }

    #[test]
    fn test_unit_cosine_edge_cases() {
        assert_eq!(unit_cosine(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(unit_cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!(unit_cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_batch_checks_dimension_and_errors() {
        let err = FailingEmbedder.embed_batch(&["ok"]).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidDimension { expected: 4, actual: 3 }));
        let count = HashingEmbedder::new(8).embed_batch(&["a", "b"]).map(|v| v.len());
        assert_eq!(count.unwrap(), 2);
        assert!(matches!(
            FailingEmbedder.embed_batch(&["boom"]),
            Err(EmbedError::Service(_))
        ));
    }

    #[test]
    fn test_hashing_backend_loads() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Hashing,
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let embedder = try_load_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
    }

    #[test]
    fn test_missing_model_fails_only_at_embedding_time() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Onnx,
            model_dir: PathBuf::from("/nonexistent/all-MiniLM-L6-v2"),
            ..EmbeddingConfig::default()
        };
        assert!(try_load_embedder(&config).is_err());

        let embedder = load_embedder(&config);
        assert_eq!(embedder.dimension(), 384);
        assert!(matches!(
            embedder.embed_batch(&["open app"]),
            Err(EmbedError::Service(_))
        ));
    }
}
