//! Model runtime
//!
//! The translation model and the embedding model load **once per process**
//! at startup and live until process exit. Within a process, items are
//! serviced sequentially behind a gate; parallelism comes from running a
//! pool of sibling processes on one port.

pub mod detector;
pub mod embedder;
pub mod translator;

pub use detector::WhatlangDetector;
pub use embedder::MiniLmEmbedder;
pub use translator::OnnxTranslator;

use crate::config::WorkerConfig;
use crate::lang::{self, Language};
use std::sync::Mutex;
use thiserror::Error;
use tipkit_common::api::{BatchItem, ProcessedItem};
use tract_onnx::prelude::{Graph, SimplePlan, TypedFact, TypedOp};

/// A loaded, optimized, runnable ONNX graph.
pub(crate) type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Model pipeline errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// A required model file is absent. Startup-fatal.
    #[error("Model file not found: {0}")]
    ModelMissing(String),

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    /// Detected or requested language the translation model cannot handle
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Empty input text")]
    EmptyInput,
}

/// Identifies the language of a text.
pub trait LanguageDetector: Send + Sync {
    /// `Ok(None)` when no confident classification exists (very short or
    /// ambiguous text); the caller assumes the canonical target language.
    fn detect(&self, text: &str) -> Result<Option<&'static Language>, ModelError>;
}

/// Translates into the canonical target language the runtime was built for.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, source: &'static Language) -> Result<String, ModelError>;
}

/// Produces the fixed-dimensionality sentence embedding. Must be
/// bit-deterministic for identical input within a process lifetime.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

/// Process-wide model state.
pub struct ModelRuntime {
    detector: Box<dyn LanguageDetector>,
    translator: Box<dyn Translator>,
    embedder: Box<dyn Embedder>,
    target: &'static Language,
    /// Requests are serviced one at a time within a process
    gate: Mutex<()>,
}

impl ModelRuntime {
    pub fn new(
        detector: Box<dyn LanguageDetector>,
        translator: Box<dyn Translator>,
        embedder: Box<dyn Embedder>,
        target: &'static Language,
    ) -> Self {
        Self {
            detector,
            translator,
            embedder,
            target,
            gate: Mutex::new(()),
        }
    }

    /// Load the production models. Called once at startup; missing model
    /// files refuse the process rather than degrade at request time.
    pub fn load(config: &WorkerConfig) -> Result<Self, ModelError> {
        let target = lang::resolve_target(&config.target_language).ok_or_else(|| {
            ModelError::UnsupportedLanguage(config.target_language.clone())
        })?;

        tracing::info!(model_dir = %config.model_dir.display(), "Loading models");
        let embedder = MiniLmEmbedder::load(&config.model_dir)?;
        tracing::info!("Embedding model loaded");
        let translator = OnnxTranslator::load(&config.model_dir, target)?;
        tracing::info!(target = target.flores, "Translation model loaded");

        Ok(Self::new(
            Box::new(WhatlangDetector::new()),
            Box::new(translator),
            Box::new(embedder),
            target,
        ))
    }

    pub fn target(&self) -> &'static Language {
        self.target
    }

    /// Detect a text's language, falling back to the canonical target when
    /// no confident classification exists.
    pub fn detect_language(&self, text: &str) -> Result<&'static Language, ModelError> {
        let _gate = self.lock_gate();
        Ok(self.detector.detect(text)?.unwrap_or(self.target))
    }

    /// Translate into the target language. Verbatim when the source already
    /// is the target.
    pub fn translate(
        &self,
        text: &str,
        source: &'static Language,
    ) -> Result<String, ModelError> {
        if std::ptr::eq(source, self.target) {
            return Ok(text.to_string());
        }
        let _gate = self.lock_gate();
        self.translator.translate(text, source)
    }

    /// Embed a (translated) text.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let _gate = self.lock_gate();
        self.embedder.embed(text)
    }

    /// Full per-item pipeline: detect, translate unless already canonical,
    /// embed the translation.
    pub fn process_item(&self, item: &BatchItem) -> Result<ProcessedItem, ModelError> {
        let text = item.text.trim();
        if text.is_empty() {
            return Err(ModelError::EmptyInput);
        }

        let _gate = self.lock_gate();

        let source = match item.source_language.as_deref() {
            Some(code) => lang::by_iso2(code)
                .ok_or_else(|| ModelError::UnsupportedLanguage(code.to_string()))?,
            None => self.detector.detect(text)?.unwrap_or(self.target),
        };

        let translated_text = if std::ptr::eq(source, self.target) {
            text.to_string()
        } else {
            self.translator.translate(text, source)?
        };

        let vector = self.embedder.embed(&translated_text)?;

        Ok(ProcessedItem {
            id: item.id,
            detected_language: source.iso2.to_string(),
            translated_text,
            vector,
        })
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, ()> {
        // A poisoned gate only means a previous request panicked; the
        // models themselves hold no mutable state
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
