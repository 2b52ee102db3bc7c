//! Sentence-transformer embeddings through ONNX Runtime.
//!
//! `model_dir` holds an exported `model.onnx` and its `tokenizer.json`
//! (all-MiniLM-L6-v2 by default). Models that emit token states are mean
//! pooled over the attention mask; models that emit one row per text are used
//! as is.

use crate::config::EmbeddingConfig;
use crate::embed::Embedder;
use crate::error::EmbedError;
use ndarray::{Array, ArrayD, ArrayView2, Axis, Ix2, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::sync::Mutex;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    batch_size: usize,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

fn service<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> EmbedError + '_ {
    move |e| EmbedError::Service(format!("{context}: {e}"))
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model_path = config.model_dir.join(MODEL_FILE);
        let tokenizer_path = config.model_dir.join(TOKENIZER_FILE);
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(EmbedError::Service(format!(
                "model files missing: expected {} and {}",
                model_path.display(),
                tokenizer_path.display()
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(service("tokenizer load failed"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..TruncationParams::default()
            }))
            .map_err(service("tokenizer truncation failed"))?;

        let session = Session::builder()
            .map_err(service("session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(service("optimization level"))?
            .commit_from_file(&model_path)
            .map_err(service("model load failed"))?;

        tracing::info!(
            model = %model_path.display(),
            dimension = config.dimension,
            max_length = config.max_length,
            batch_size = config.batch_size,
            "onnx model loaded"
        );
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    fn encode_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(service("tokenization failed"))?;
        let Some(seq_len) = encodings.first().map(Encoding::len) else {
            return Ok(Vec::new());
        };
        if encodings.iter().any(|e| e.len() != seq_len) {
            return Err(EmbedError::Service("inconsistent sequence lengths after padding".to_string()));
        }

        let (ids, masks, type_ids) = flatten(&encodings, seq_len);
        let mask_rows: Vec<Vec<i64>> = masks.chunks(seq_len).map(<[i64]>::to_vec).collect();
        let shape = (texts.len(), seq_len);
        let mut available: HashMap<&str, DynTensor> = HashMap::new();
        for (name, data) in [("input_ids", ids), ("attention_mask", masks), ("token_type_ids", type_ids)] {
            let array = Array::from_shape_vec(shape, data).map_err(service("input shape"))?;
            let tensor = Tensor::from_array(array.into_dyn()).map_err(service("input tensor"))?;
            available.insert(name, tensor.upcast());
        }

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EmbedError::Service("onnx session lock poisoned".to_string()))?;
            let mut feed: HashMap<String, DynTensor> = HashMap::new();
            for input in &session.inputs {
                let tensor = available
                    .remove(input.name.as_str())
                    .ok_or_else(|| EmbedError::Service(format!("unsupported model input '{}'", input.name)))?;
                feed.insert(input.name.clone(), tensor);
            }
            let outputs = session.run(SessionInputs::from(feed)).map_err(service("onnx forward failed"))?;
            if outputs.len() == 0 {
                return Err(EmbedError::Service("onnx returned no outputs".to_string()));
            }
            let array = outputs[0]
                .try_extract_array::<f32>()
                .map_err(service("decoding onnx output"))?
                .to_owned();
            drop(outputs);
            array
        };
        pooled_embeddings(output, &mask_rows)
    }
}

impl Embedder for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.encode_chunk(&[text])?
            .pop()
            .ok_or_else(|| EmbedError::Service("no embedding returned".to_string()))
    }

    fn embed_raw_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            vectors.extend(self.encode_chunk(chunk)?);
        }
        tracing::debug!(texts = texts.len(), "onnx batch embedded");
        Ok(vectors)
    }
}

fn flatten(encodings: &[Encoding], seq_len: usize) -> (Vec<i64>, Vec<i64>, Vec<i64>) {
    let capacity = encodings.len() * seq_len;
    let (mut ids, mut masks, mut type_ids) =
        (Vec::with_capacity(capacity), Vec::with_capacity(capacity), Vec::with_capacity(capacity));
    for encoding in encodings {
        ids.extend(encoding.get_ids().iter().map(|&v| i64::from(v)));
        masks.extend(encoding.get_attention_mask().iter().map(|&v| i64::from(v)));
        type_ids.extend(encoding.get_type_ids().iter().map(|&v| i64::from(v)));
    }
    (ids, masks, type_ids)
}

/// One vector per text from a `[batch, dim]` or `[batch, tokens, dim]` output.
fn pooled_embeddings(output: ArrayD<f32>, mask_rows: &[Vec<i64>]) -> Result<Vec<Vec<f32>>, EmbedError> {
    match output.ndim() {
        2 => {
            let rows = output.into_dimensionality::<Ix2>().map_err(service("output shape"))?;
            Ok(rows.outer_iter().map(|row| row.to_vec()).collect())
        }
        3 => {
            let hidden = output.into_dimensionality::<Ix3>().map_err(service("output shape"))?;
            Ok(hidden
                .outer_iter()
                .enumerate()
                .map(|(i, sample)| {
                    let mask = mask_rows
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                    mean_pool(sample, &mask)
                })
                .collect())
        }
        n => Err(EmbedError::Service(format!("unexpected onnx output rank {n}"))),
    }
}

/// Average of the token states whose mask is set.
fn mean_pool(sample: ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let mut sum = vec![0.0f32; sample.len_of(Axis(1))];
    let mut count = 0.0f32;
    for (token, state) in sample.outer_iter().enumerate() {
        if mask.get(token).copied().unwrap_or(0) == 0 {
            continue;
        }
        count += 1.0;
        for (acc, value) in sum.iter_mut().zip(state.iter()) {
            *acc += value;
        }
    }
    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}
