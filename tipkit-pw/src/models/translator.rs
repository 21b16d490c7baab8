//! Translation via tract
//!
//! NLLB-class encoder/decoder ONNX pair driven with greedy decoding. The
//! target language is fixed at load time (the canonical target of the whole
//! pipeline); the source language arrives per call as a FLORES-style tag
//! prepended to the input, the way the model was trained.

use super::{ModelError, OnnxPlan, Translator};
use crate::lang::Language;
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::s;

/// Hard cap on generated target tokens; tips are short texts.
const MAX_DECODE_TOKENS: usize = 256;
const EOS_TOKEN: &str = "</s>";

#[derive(Debug)]
pub struct OnnxTranslator {
    tokenizer: tokenizers::Tokenizer,
    encoder: OnnxPlan,
    decoder: OnnxPlan,
    eos_id: u32,
    /// Forced first target token: the target language tag
    target_lang_id: u32,
}

impl OnnxTranslator {
    /// Load `translation/encoder.onnx`, `translation/decoder.onnx`, and
    /// `translation/tokenizer.json` from the model directory.
    pub fn load(model_dir: &Path, target: &'static Language) -> Result<Self, ModelError> {
        let dir = model_dir.join("translation");
        let encoder_path = dir.join("encoder.onnx");
        let decoder_path = dir.join("decoder.onnx");
        let tokenizer_path = dir.join("tokenizer.json");

        for path in [&encoder_path, &decoder_path, &tokenizer_path] {
            if !path.exists() {
                return Err(ModelError::ModelMissing(path.display().to_string()));
            }
        }

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::Tokenizer(format!("load tokenizer: {e}")))?;

        let eos_id = tokenizer
            .token_to_id(EOS_TOKEN)
            .ok_or_else(|| ModelError::Tokenizer(format!("tokenizer lacks {EOS_TOKEN}")))?;
        let target_lang_id = tokenizer.token_to_id(target.flores).ok_or_else(|| {
            ModelError::UnsupportedLanguage(format!(
                "tokenizer lacks target language tag {}",
                target.flores
            ))
        })?;

        let encoder = load_plan(&encoder_path)?;
        let decoder = load_plan(&decoder_path)?;

        Ok(Self {
            tokenizer,
            encoder,
            decoder,
            eos_id,
            target_lang_id,
        })
    }
}

fn load_plan(path: &Path) -> Result<OnnxPlan, ModelError> {
    tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| ModelError::LoadFailed(format!("{}: load: {e}", path.display())))?
        .into_optimized()
        .map_err(|e| ModelError::LoadFailed(format!("{}: optimize: {e}", path.display())))?
        .into_runnable()
        .map_err(|e| ModelError::LoadFailed(format!("{}: runnable: {e}", path.display())))
}

fn tensor_2d(values: Vec<i64>, len: usize) -> Result<Tensor, ModelError> {
    tract_ndarray::Array2::from_shape_vec((1, len), values)
        .map(Tensor::from)
        .map_err(|e| ModelError::Inference(format!("tensor shape: {e}")))
}

impl Translator for OnnxTranslator {
    fn translate(&self, text: &str, source: &'static Language) -> Result<String, ModelError> {
        // Source language tag + sentence + EOS, per the model's training
        let source_lang_id = self.tokenizer.token_to_id(source.flores).ok_or_else(|| {
            ModelError::UnsupportedLanguage(format!(
                "tokenizer lacks source language tag {}",
                source.flores
            ))
        })?;

        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ModelError::Tokenizer(format!("encode: {e}")))?;

        let mut input_ids: Vec<i64> = Vec::with_capacity(encoding.get_ids().len() + 2);
        input_ids.push(i64::from(source_lang_id));
        input_ids.extend(encoding.get_ids().iter().map(|&id| i64::from(id)));
        input_ids.push(i64::from(self.eos_id));

        let input_len = input_ids.len();
        let attention_mask = vec![1i64; input_len];

        let encoder_outputs = self
            .encoder
            .run(tvec!(
                tensor_2d(input_ids, input_len)?.into(),
                tensor_2d(attention_mask.clone(), input_len)?.into(),
            ))
            .map_err(|e| ModelError::Inference(format!("encoder: {e}")))?;

        let encoder_hidden = encoder_outputs
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Inference("encoder produced no output".to_string()))?;

        // Greedy decode: decoder start token (EOS) + forced target language
        // tag, then argmax one token at a time
        let mut target_ids: Vec<i64> =
            vec![i64::from(self.eos_id), i64::from(self.target_lang_id)];

        loop {
            let step_len = target_ids.len();
            let outputs = self
                .decoder
                .run(tvec!(
                    tensor_2d(target_ids.clone(), step_len)?.into(),
                    encoder_hidden.clone(),
                    tensor_2d(attention_mask.clone(), input_len)?.into(),
                ))
                .map_err(|e| ModelError::Inference(format!("decoder: {e}")))?;

            let logits = outputs
                .into_iter()
                .next()
                .ok_or_else(|| ModelError::Inference("decoder produced no output".to_string()))?;
            let view = logits
                .to_array_view::<f32>()
                .map_err(|e| ModelError::Inference(format!("logits to array: {e}")))?;

            let last = view.slice(s![0, step_len - 1, ..]);
            let next_id = last
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(index, _)| index as i64)
                .ok_or_else(|| ModelError::Inference("empty logits".to_string()))?;

            if next_id == i64::from(self.eos_id) {
                break;
            }
            target_ids.push(next_id);

            if target_ids.len() >= MAX_DECODE_TOKENS {
                tracing::warn!(tokens = target_ids.len(), "Decode hit the token cap");
                break;
            }
        }

        // Strip the decoder start token and the language tag
        let generated: Vec<u32> = target_ids[2..]
            .iter()
            .map(|&id| id as u32)
            .collect();

        self.tokenizer
            .decode(&generated, true)
            .map(|s| s.trim().to_string())
            .map_err(|e| ModelError::Tokenizer(format!("decode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang;

    #[test]
    fn missing_model_files_are_a_startup_error() {
        let target = lang::resolve_target("eng_Latn").unwrap();
        let err = OnnxTranslator::load(Path::new("/nonexistent/model/dir"), target).unwrap_err();
        assert!(matches!(err, ModelError::ModelMissing(_)));
    }
}
