//! Language table
//!
//! Bridges the three code systems in play: whatlang's ISO 639-3 detection,
//! the two-letter codes stored with tips, and the FLORES-style codes the
//! translation model speaks (e.g. `eng_Latn`).

use whatlang::Lang;

/// One supported language.
#[derive(Debug, PartialEq, Eq)]
pub struct Language {
    /// Two-letter ISO 639-1 code, stored on tips
    pub iso2: &'static str,
    /// FLORES-style code used by the translation model
    pub flores: &'static str,
}

macro_rules! languages {
    ($(($variant:ident, $iso2:literal, $flores:literal)),+ $(,)?) => {
        static LANGUAGES: &[(Lang, Language)] = &[
            $((Lang::$variant, Language { iso2: $iso2, flores: $flores })),+
        ];
    };
}

languages![
    (Eng, "en", "eng_Latn"),
    (Fra, "fr", "fra_Latn"),
    (Spa, "es", "spa_Latn"),
    (Por, "pt", "por_Latn"),
    (Ita, "it", "ita_Latn"),
    (Deu, "de", "deu_Latn"),
    (Nld, "nl", "nld_Latn"),
    (Rus, "ru", "rus_Cyrl"),
    (Ukr, "uk", "ukr_Cyrl"),
    (Pol, "pl", "pol_Latn"),
    (Ces, "cs", "ces_Latn"),
    (Swe, "sv", "swe_Latn"),
    (Dan, "da", "dan_Latn"),
    (Fin, "fi", "fin_Latn"),
    (Ell, "el", "ell_Grek"),
    (Tur, "tr", "tur_Latn"),
    (Ara, "ar", "arb_Arab"),
    (Heb, "he", "heb_Hebr"),
    (Hin, "hi", "hin_Deva"),
    (Jpn, "ja", "jpn_Jpan"),
    (Kor, "ko", "kor_Hang"),
    (Cmn, "zh", "zho_Hans"),
    (Vie, "vi", "vie_Latn"),
    (Tha, "th", "tha_Thai"),
    (Ind, "id", "ind_Latn"),
];

/// Look up a detected whatlang language. `None` for languages the
/// translation model does not cover.
pub fn from_whatlang(lang: Lang) -> Option<&'static Language> {
    LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == lang)
        .map(|(_, language)| language)
}

pub fn by_iso2(code: &str) -> Option<&'static Language> {
    let code = code.trim().to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(_, language)| language.iso2 == code)
        .map(|(_, language)| language)
}

pub fn by_flores(code: &str) -> Option<&'static Language> {
    let code = code.trim();
    LANGUAGES
        .iter()
        .find(|(_, language)| language.flores == code)
        .map(|(_, language)| language)
}

/// Resolve a configured target language. Accepts either a FLORES-style code
/// (`eng_Latn`) or a bare two-letter code (`en`).
pub fn resolve_target(code: &str) -> Option<&'static Language> {
    by_flores(code).or_else(|| by_iso2(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatlang_mapping_covers_the_canonical_target() {
        let english = from_whatlang(Lang::Eng).unwrap();
        assert_eq!(english.iso2, "en");
        assert_eq!(english.flores, "eng_Latn");
    }

    #[test]
    fn unsupported_whatlang_language_maps_to_none() {
        assert!(from_whatlang(Lang::Epo).is_none());
    }

    #[test]
    fn iso2_lookup_is_case_insensitive() {
        assert_eq!(by_iso2("FR").unwrap().flores, "fra_Latn");
        assert!(by_iso2("xx").is_none());
    }

    #[test]
    fn target_resolution_accepts_both_code_styles() {
        assert_eq!(resolve_target("eng_Latn").unwrap().iso2, "en");
        assert_eq!(resolve_target("en").unwrap().flores, "eng_Latn");
        assert!(resolve_target("tlh_Latn").is_none());
    }
}
