//! Test doubles for the model runtime
//!
//! Deterministic stand-ins for the production models so the HTTP surface
//! can be exercised without model files: a table-driven detector, a
//! dictionary translator, and a hash-seeded embedder.

use std::collections::HashMap;
use std::sync::Arc;
use tipkit_common::EMBEDDING_DIM;
use tipkit_pw::lang::{self, Language};
use tipkit_pw::models::{Embedder, LanguageDetector, ModelError, ModelRuntime, Translator};
use tipkit_pw::AppState;

/// Text that makes [`HashEmbedder`] fail, for per-item error tests.
pub const EMBED_POISON: &str = "EMBED_POISON";

/// Detector backed by an exact-text table. Unknown text is undetermined.
pub struct TableDetector {
    by_text: HashMap<String, &'static Language>,
}

impl TableDetector {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        let by_text = entries
            .iter()
            .map(|(text, iso2)| {
                (
                    text.to_string(),
                    lang::by_iso2(iso2).expect("test table uses supported languages"),
                )
            })
            .collect();
        Self { by_text }
    }
}

impl LanguageDetector for TableDetector {
    fn detect(&self, text: &str) -> Result<Option<&'static Language>, ModelError> {
        Ok(self.by_text.get(text).copied())
    }
}

/// Translator backed by an exact-text dictionary.
pub struct DictionaryTranslator {
    by_text: HashMap<String, String>,
}

impl DictionaryTranslator {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        let by_text = entries
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self { by_text }
    }
}

impl Translator for DictionaryTranslator {
    fn translate(&self, text: &str, source: &'static Language) -> Result<String, ModelError> {
        self.by_text.get(text).cloned().ok_or_else(|| {
            ModelError::Inference(format!("no {} translation for {text:?}", source.iso2))
        })
    }
}

/// Embedder deriving a unit vector from a hash of the text. Identical text
/// gives an identical vector; different texts land far apart.
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        if text.contains(EMBED_POISON) {
            return Err(ModelError::Inference("poisoned input".to_string()));
        }

        // FNV-1a seed, xorshift fill
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }

        let mut state = seed.max(1);
        let mut vector = Vec::with_capacity(EMBEDDING_DIM);
        for _ in 0..EMBEDDING_DIM {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            vector.push((state % 2000) as f32 / 1000.0 - 1.0);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for value in &mut vector {
            *value /= norm;
        }
        Ok(vector)
    }
}

/// App state over the fakes, with English as the canonical target.
pub fn fake_state(
    detections: &[(&str, &str)],
    translations: &[(&str, &str)],
) -> AppState {
    let runtime = ModelRuntime::new(
        Box::new(TableDetector::new(detections)),
        Box::new(DictionaryTranslator::new(translations)),
        Box::new(HashEmbedder),
        lang::resolve_target("eng_Latn").expect("English is always supported"),
    );
    AppState::new(Arc::new(runtime))
}
