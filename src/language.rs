//! Supported language registry
//!
//! Every language the gateway accepts is listed here. Callers may name a
//! language either by its display name ("French") or by its service code
//! ("fr"); anything else is rejected before a remote service is contacted.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::{Error, Result};

/// A registered language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    /// Display name shown to users
    pub name: &'static str,
    /// Code understood by the translation and speech services
    pub code: &'static str,
}

/// Languages offered for translation, recognition and synthesis
pub const LANGUAGES: &[Language] = &[
    Language { name: "English", code: "en" },
    Language { name: "Hindi", code: "hi" },
    Language { name: "Bengali", code: "bn" },
    Language { name: "Spanish", code: "es" },
    Language { name: "Chinese (Simplified)", code: "zh-CN" },
    Language { name: "Russian", code: "ru" },
    Language { name: "Japanese", code: "ja" },
    Language { name: "Korean", code: "ko" },
    Language { name: "German", code: "de" },
    Language { name: "French", code: "fr" },
    Language { name: "Tamil", code: "ta" },
    Language { name: "Telugu", code: "te" },
    Language { name: "Kannada", code: "kn" },
    Language { name: "Gujarati", code: "gu" },
    Language { name: "Punjabi", code: "pa" },
];

/// Sentinel code asking the translator to detect the source language
pub const AUTO: &str = "auto";

/// A validated language code from [`LANGUAGES`], or the `auto` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguageCode(&'static str);

impl LanguageCode {
    /// Source-language detection sentinel
    pub const AUTO: Self = Self(AUTO);

    /// Resolve a display name or code, case-insensitively.
    ///
    /// `auto` is accepted; use [`LanguageCode::resolve_target`] where a
    /// concrete language is required.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedLanguage`] if the input is not registered
    pub fn resolve(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case(AUTO) {
            return Ok(Self::AUTO);
        }

        LANGUAGES
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(input) || l.code.eq_ignore_ascii_case(input))
            .map(|l| Self(l.code))
            .ok_or_else(|| Error::UnsupportedLanguage(input.to_string()))
    }

    /// Resolve a language that output can be produced in (never `auto`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedLanguage`] for unknown input or `auto`
    pub fn resolve_target(input: &str) -> Result<Self> {
        let code = Self::resolve(input)?;
        if code.is_auto() {
            return Err(Error::UnsupportedLanguage(
                "auto is only valid as a source language".to_string(),
            ));
        }
        Ok(code)
    }

    /// Service code, e.g. `zh-CN`
    #[must_use]
    pub const fn code(self) -> &'static str {
        self.0
    }

    /// Whether this is the detection sentinel
    #[must_use]
    pub fn is_auto(self) -> bool {
        self.0 == AUTO
    }

    /// Display name, or `"Detect language"` for the sentinel
    #[must_use]
    pub fn name(self) -> &'static str {
        LANGUAGES
            .iter()
            .find(|l| l.code == self.0)
            .map_or("Detect language", |l| l.name)
    }

    /// Locale tag for speech recognition (`en` → `en-US`)
    ///
    /// The recognizer needs a concrete locale, so `auto` falls back to
    /// US English.
    #[must_use]
    pub fn speech_locale(self) -> String {
        match self.0 {
            AUTO | "en" => "en-US".to_string(),
            "zh-CN" => "zh-CN".to_string(),
            "hi" | "bn" | "ta" | "te" | "kn" | "gu" | "pa" => format!("{}-IN", self.0),
            "es" => "es-ES".to_string(),
            "ja" => "ja-JP".to_string(),
            "ko" => "ko-KR".to_string(),
            "ru" => "ru-RU".to_string(),
            "de" => "de-DE".to_string(),
            "fr" => "fr-FR".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for LanguageCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_and_codes() {
        assert_eq!(LanguageCode::resolve("French").unwrap().code(), "fr");
        assert_eq!(LanguageCode::resolve("fr").unwrap().code(), "fr");
        assert_eq!(LanguageCode::resolve("  english ").unwrap().code(), "en");
        assert_eq!(
            LanguageCode::resolve("Chinese (Simplified)").unwrap().code(),
            "zh-CN"
        );
        assert_eq!(LanguageCode::resolve("ZH-cn").unwrap().code(), "zh-CN");
    }

    #[test]
    fn rejects_unknown_language() {
        let err = LanguageCode::resolve("Klingon").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(ref s) if s == "Klingon"));
    }

    #[test]
    fn auto_is_source_only() {
        assert!(LanguageCode::resolve("auto").unwrap().is_auto());
        assert!(LanguageCode::resolve_target("auto").is_err());
        assert!(LanguageCode::resolve_target("de").is_ok());
    }

    #[test]
    fn names_round_trip() {
        for lang in LANGUAGES {
            assert_eq!(LanguageCode::resolve(lang.name).unwrap().name(), lang.name);
        }
        assert_eq!(LanguageCode::AUTO.name(), "Detect language");
    }

    #[test]
    fn speech_locales() {
        assert_eq!(LanguageCode::resolve("en").unwrap().speech_locale(), "en-US");
        assert_eq!(LanguageCode::AUTO.speech_locale(), "en-US");
        assert_eq!(LanguageCode::resolve("hi").unwrap().speech_locale(), "hi-IN");
        assert_eq!(LanguageCode::resolve("ja").unwrap().speech_locale(), "ja-JP");
    }
}
