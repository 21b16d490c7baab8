//! Language detection via whatlang
//!
//! Statistical trigram classification, no model files. Detection of a
//! language the translation model does not cover is an explicit per-item
//! error rather than a silent passthrough.

use super::{LanguageDetector, ModelError};
use crate::lang::{self, Language};

pub struct WhatlangDetector;

impl WhatlangDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WhatlangDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<Option<&'static Language>, ModelError> {
        let Some(info) = whatlang::detect(text) else {
            return Ok(None);
        };

        // Low-confidence calls on short texts are treated as undetermined
        if !info.is_reliable() {
            tracing::debug!(
                lang = info.lang().code(),
                confidence = info.confidence(),
                "Unreliable language classification, treating as undetermined"
            );
            return Ok(None);
        }

        match lang::from_whatlang(info.lang()) {
            Some(language) => Ok(Some(language)),
            None => Err(ModelError::UnsupportedLanguage(
                info.lang().eng_name().to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_languages() {
        let detector = WhatlangDetector::new();

        let english = detector
            .detect("Avoid the tourist restaurants near the tower, the food is much better two streets away")
            .unwrap()
            .expect("confident classification");
        assert_eq!(english.iso2, "en");

        let french = detector
            .detect("Évitez les restaurants touristiques près de la tour, la nourriture est bien meilleure deux rues plus loin")
            .unwrap()
            .expect("confident classification");
        assert_eq!(french.iso2, "fr");

        let spanish = detector
            .detect("Evite los restaurantes turísticos cerca de la torre, la comida es mucho mejor dos calles más allá")
            .unwrap()
            .expect("confident classification");
        assert_eq!(spanish.iso2, "es");
    }

    #[test]
    fn gibberish_is_undetermined_or_classified_not_an_error() {
        let detector = WhatlangDetector::new();
        // Either outcome is acceptable; it must not be an Err for text in
        // covered scripts
        let outcome = detector.detect("zzq");
        assert!(outcome.is_ok());
    }
}
