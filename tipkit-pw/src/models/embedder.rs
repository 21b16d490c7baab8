//! Sentence embedding via tract
//!
//! MiniLM-class ONNX model run with tract-onnx, tokenized with the
//! tokenizers crate. Pure-Rust inference, no ONNX Runtime or system deps.
//! Output is mean-pooled over valid tokens and L2-normalized; identical
//! input yields a bit-identical vector within a process lifetime.

use super::{Embedder, ModelError, OnnxPlan};
use std::path::Path;
use tipkit_common::EMBEDDING_DIM;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::s;

const MAX_TOKENS: usize = 256;

#[derive(Debug)]
pub struct MiniLmEmbedder {
    tokenizer: tokenizers::Tokenizer,
    model: OnnxPlan,
}

impl MiniLmEmbedder {
    /// Load `embedding/model.onnx` and `embedding/tokenizer.json` from the
    /// model directory.
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let onnx_path = model_dir.join("embedding").join("model.onnx");
        let tokenizer_path = model_dir.join("embedding").join("tokenizer.json");

        for path in [&onnx_path, &tokenizer_path] {
            if !path.exists() {
                return Err(ModelError::ModelMissing(path.display().to_string()));
            }
        }

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::Tokenizer(format!("load tokenizer: {e}")))?;

        let model = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .map_err(|e| ModelError::LoadFailed(format!("load ONNX: {e}")))?
            .into_optimized()
            .map_err(|e| ModelError::LoadFailed(format!("optimize: {e}")))?
            .into_runnable()
            .map_err(|e| ModelError::LoadFailed(format!("build runnable: {e}")))?;

        Ok(Self { tokenizer, model })
    }
}

impl Embedder for MiniLmEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::Tokenizer(format!("encode: {e}")))?;

        let ids = encoding.get_ids();
        let len = ids.len().clamp(1, MAX_TOKENS);

        let mut input_ids = vec![0i64; len];
        let mut attention_mask = vec![0i64; len];
        for (slot, &id) in input_ids.iter_mut().zip(ids.iter().take(len)) {
            *slot = i64::from(id);
        }
        for slot in attention_mask.iter_mut().take(ids.len().min(len)) {
            *slot = 1;
        }

        let input_ids_tensor: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, len), input_ids)
                .map_err(|e| ModelError::Inference(format!("input ids shape: {e}")))?
                .into();
        let attention_mask_tensor: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, len), attention_mask)
                .map_err(|e| ModelError::Inference(format!("attention mask shape: {e}")))?
                .into();

        let outputs = self
            .model
            .run(tvec!(input_ids_tensor.into(), attention_mask_tensor.into()))
            .map_err(|e| ModelError::Inference(format!("run: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Inference("no output tensor".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(format!("output to array: {e}")))?;

        // [1, 384] when the export pools internally, [1, seq, 384] when it
        // emits the last hidden state; mean-pool the latter ourselves.
        let shape = view.shape().to_vec();
        let mut vector = match shape.len() {
            2 => view.slice(s![0, ..]).iter().copied().collect::<Vec<f32>>(),
            3 => {
                let seq_len = shape[1].min(len);
                let mut sum = vec![0f32; shape[2]];
                for token in 0..seq_len {
                    for (slot, &value) in
                        sum.iter_mut().zip(view.slice(s![0, token, ..]).iter())
                    {
                        *slot += value;
                    }
                }
                for value in &mut sum {
                    *value /= seq_len as f32;
                }
                sum
            }
            _ => {
                return Err(ModelError::Inference(format!(
                    "unexpected output shape {shape:?}"
                )))
            }
        };

        if vector.len() != EMBEDDING_DIM {
            return Err(ModelError::Inference(format!(
                "model emitted {} dimensions, expected {EMBEDDING_DIM}",
                vector.len()
            )));
        }

        normalize_l2(&mut vector);
        Ok(vector)
    }
}

fn normalize_l2(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_files_are_a_startup_error() {
        let err = MiniLmEmbedder::load(Path::new("/nonexistent/model/dir")).unwrap_err();
        assert!(matches!(err, ModelError::ModelMissing(_)));
    }

    #[test]
    fn normalization_produces_unit_vectors() {
        let mut vector = vec![3.0f32, 4.0];
        normalize_l2(&mut vector);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut vector = vec![0.0f32; 4];
        normalize_l2(&mut vector);
        assert!(vector.iter().all(|&x| x == 0.0));
    }
}
