//! Translation pipeline
//!
//! Composes validation, audio normalization, recognition, translation and
//! cached synthesis into the operations exposed by the HTTP API and the
//! voice loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::audio::{AudioFormat, AudioNormalizer, Normalized};
use crate::cache::SynthesisCache;
use crate::language::LanguageCode;
use crate::scratch::ScratchDir;
use crate::services::ServiceClients;
use crate::{Error, Result, preview};

/// Default maximum length of submitted text, in characters
pub const DEFAULT_MAX_TEXT_CHARS: usize = 5000;

/// A validated text translation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    text: String,
    source: LanguageCode,
    target: LanguageCode,
}

impl TranslationRequest {
    /// Validate text and resolve language names or codes
    ///
    /// # Errors
    ///
    /// Returns a client error for empty or oversize text, an unknown
    /// language, or `auto` as the target
    pub fn new(text: &str, source: &str, target: &str, max_chars: usize) -> Result<Self> {
        let text = validate_text(text, max_chars)?;
        Ok(Self {
            text,
            source: LanguageCode::resolve(source)?,
            target: LanguageCode::resolve_target(target)?,
        })
    }

    /// Validate text against already-resolved languages
    ///
    /// # Errors
    ///
    /// Returns a client error for empty or oversize text or an `auto` target
    pub fn from_codes(
        text: &str,
        source: LanguageCode,
        target: LanguageCode,
        max_chars: usize,
    ) -> Result<Self> {
        if target.is_auto() {
            return Err(Error::UnsupportedLanguage(
                "auto is only valid as a source language".to_string(),
            ));
        }
        Ok(Self {
            text: validate_text(text, max_chars)?,
            source,
            target,
        })
    }

    /// Trimmed source text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Source language (may be `auto`)
    #[must_use]
    pub const fn source(&self) -> LanguageCode {
        self.source
    }

    /// Target language
    #[must_use]
    pub const fn target(&self) -> LanguageCode {
        self.target
    }
}

fn validate_text(text: &str, max_chars: usize) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::EmptyText);
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(Error::TextTooLong { len, max: max_chars });
    }
    Ok(text.to_string())
}

/// Recorded speech submitted for recognition
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Raw audio bytes as received
    pub audio: Vec<u8>,
    /// Declared MIME type or extension
    pub format: String,
}

impl TranscriptionRequest {
    /// Create a request
    #[must_use]
    pub fn new(audio: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            audio,
            format: format.into(),
        }
    }
}

/// A partial failure that did not invalidate the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Degradation {
    /// Input audio could not be converted; the raw bytes were recognized
    FormatConversion(String),
    /// Speech could not be synthesized; only text is returned
    SynthesisFailed(String),
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FormatConversion(reason) => write!(f, "audio format conversion failed: {reason}"),
            Self::SynthesisFailed(reason) => write!(f, "speech synthesis failed: {reason}"),
        }
    }
}

/// Outcome of a translation
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Submitted or recognized text
    pub source_text: String,
    /// Translated text
    pub translated_text: String,
    /// MP3 rendition of the translation, if synthesis succeeded
    pub audio: Option<Arc<Vec<u8>>>,
    /// Wall time of the whole operation
    pub elapsed: Duration,
    /// Partial failures
    pub degradations: Vec<Degradation>,
}

/// Outcome of recognition only
#[derive(Debug, Clone)]
pub struct Transcription {
    /// Recognized text
    pub text: String,
    /// Wall time of the whole operation
    pub elapsed: Duration,
    /// Partial failures
    pub degradations: Vec<Degradation>,
}

/// Orchestrates the remote services around shared cache and scratch space
pub struct TranslationPipeline {
    clients: ServiceClients,
    cache: Arc<SynthesisCache>,
    scratch: Arc<ScratchDir>,
    max_text_chars: usize,
}

impl TranslationPipeline {
    /// Create a pipeline
    #[must_use]
    pub fn new(clients: ServiceClients, cache: Arc<SynthesisCache>, scratch: Arc<ScratchDir>) -> Self {
        Self {
            clients,
            cache,
            scratch,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }

    /// Set the maximum accepted text length
    #[must_use]
    pub const fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = max;
        self
    }

    /// Maximum accepted text length, in characters
    #[must_use]
    pub const fn max_text_chars(&self) -> usize {
        self.max_text_chars
    }

    /// Synthesized speech cache
    #[must_use]
    pub fn cache(&self) -> &SynthesisCache {
        &self.cache
    }

    /// Scratch directory for uploads
    #[must_use]
    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Translate text and synthesize the result
    ///
    /// # Errors
    ///
    /// Returns [`Error::Translation`] if the translator fails. Synthesis
    /// failure is reported as a degradation, not an error.
    pub async fn translate_text(&self, request: TranslationRequest) -> Result<PipelineResult> {
        let started = Instant::now();
        self.translate_and_speak(request, started, Vec::new()).await
    }

    /// Recognize speech only
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for empty audio or
    /// [`Error::Recognition`] if recognition fails
    pub async fn transcribe(
        &self,
        request: TranscriptionRequest,
        language: LanguageCode,
    ) -> Result<Transcription> {
        let started = Instant::now();
        let (text, degradations) = self.recognize(request, language).await?;

        Ok(Transcription {
            text,
            elapsed: started.elapsed(),
            degradations,
        })
    }

    /// Recognize speech, then translate and synthesize it
    ///
    /// # Errors
    ///
    /// Returns error if recognition or translation fails
    pub async fn transcribe_and_translate(
        &self,
        request: TranscriptionRequest,
        source: LanguageCode,
        target: LanguageCode,
    ) -> Result<PipelineResult> {
        if target.is_auto() {
            return Err(Error::UnsupportedLanguage(
                "auto is only valid as a source language".to_string(),
            ));
        }

        let started = Instant::now();
        let (text, degradations) = self.recognize(request, source).await?;
        let request = TranslationRequest::from_codes(&text, source, target, self.max_text_chars)?;
        self.translate_and_speak(request, started, degradations).await
    }

    /// Synthesize `text`, serving repeats from the cache
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if the synthesizer fails
    pub async fn speak(&self, text: &str, language: LanguageCode) -> Result<Arc<Vec<u8>>> {
        let key = self.cache.key(text, language);
        if let Some(audio) = self.cache.get(&key) {
            tracing::debug!(text = %preview(text), language = %language, "synthesis cache hit");
            return Ok(audio);
        }

        let audio = self
            .clients
            .synthesizer
            .synthesize(text, language)
            .await
            .map_err(Error::Synthesis)?;

        let audio = Arc::new(audio);
        self.cache.put(key, Arc::clone(&audio));
        Ok(audio)
    }

    async fn translate_and_speak(
        &self,
        request: TranslationRequest,
        started: Instant,
        mut degradations: Vec<Degradation>,
    ) -> Result<PipelineResult> {
        let TranslationRequest {
            text,
            source,
            target,
        } = request;

        let translated = match self.clients.translator.translate(&text, source, target).await {
            Ok(translated) => translated,
            Err(e) => {
                tracing::error!(
                    operation = "translate",
                    text = %preview(&text),
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %e,
                    "translation failed"
                );
                return Err(Error::Translation(e));
            }
        };

        let audio = match self.speak(&translated, target).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(
                    operation = "synthesize",
                    text = %preview(&translated),
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %e,
                    "synthesis failed, returning text only"
                );
                degradations.push(Degradation::SynthesisFailed(e.to_string()));
                None
            }
        };

        let elapsed = started.elapsed();
        tracing::info!(
            source = %source,
            target = %target,
            text = %preview(&text),
            has_audio = audio.is_some(),
            elapsed_ms = elapsed.as_millis(),
            "translation complete"
        );

        Ok(PipelineResult {
            source_text: text,
            translated_text: translated,
            audio,
            elapsed,
            degradations,
        })
    }

    /// Write the upload to scratch, normalize it and run recognition
    async fn recognize(
        &self,
        request: TranscriptionRequest,
        language: LanguageCode,
    ) -> Result<(String, Vec<Degradation>)> {
        let TranscriptionRequest { audio, format } = request;
        if audio.is_empty() {
            return Err(Error::EmptyInput);
        }

        let started = Instant::now();
        let scratch = Arc::clone(&self.scratch);
        let declared = format.clone();
        let input_bytes = audio.len();

        let normalized = tokio::task::spawn_blocking(move || -> Result<Normalized> {
            let extension = AudioFormat::from_mime(&declared).extension().to_string();
            let file = scratch.acquire("upload", &extension)?;
            file.write(&audio)?;
            let normalized = AudioNormalizer::new().normalize_file(file.path(), &declared);
            scratch.release(&file)?;
            normalized
        })
        .await
        .map_err(|e| Error::Audio(format!("normalizer task failed: {e}")))??;

        let mut degradations = Vec::new();
        let mime = match &normalized {
            Normalized::Degraded { reason, .. } => {
                degradations.push(Degradation::FormatConversion(reason.clone()));
                format.as_str()
            }
            Normalized::Unchanged(_) | Normalized::Converted(_) => "audio/wav",
        };

        let text = match self
            .clients
            .recognizer
            .recognize(normalized.bytes(), mime, language)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    operation = "recognize",
                    input_bytes,
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %e,
                    "recognition failed"
                );
                return Err(Error::Recognition(e));
            }
        };

        tracing::info!(
            language = %language,
            text = %preview(&text),
            elapsed_ms = started.elapsed().as_millis(),
            "speech recognized"
        );
        Ok((text, degradations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_trims_and_resolves() {
        let request = TranslationRequest::new("  Hello  ", "English", "fr", 100).unwrap();
        assert_eq!(request.text(), "Hello");
        assert_eq!(request.source().code(), "en");
        assert_eq!(request.target().code(), "fr");
    }

    #[test]
    fn request_rejects_whitespace() {
        assert!(matches!(
            TranslationRequest::new(" \n\t ", "auto", "fr", 100),
            Err(Error::EmptyText)
        ));
    }

    #[test]
    fn request_rejects_oversize_text_by_chars() {
        let text = "é".repeat(11);
        assert!(matches!(
            TranslationRequest::new(&text, "auto", "fr", 10),
            Err(Error::TextTooLong { len: 11, max: 10 })
        ));
        assert!(TranslationRequest::new(&"é".repeat(10), "auto", "fr", 10).is_ok());
    }

    #[test]
    fn request_rejects_auto_target() {
        assert!(matches!(
            TranslationRequest::new("Hello", "en", "auto", 100),
            Err(Error::UnsupportedLanguage(_))
        ));
        assert!(TranslationRequest::from_codes("Hello", LanguageCode::AUTO, LanguageCode::AUTO, 100).is_err());
    }

    #[test]
    fn degradations_serialize_with_kind() {
        let json = serde_json::to_value(Degradation::SynthesisFailed("down".into())).unwrap();
        assert_eq!(json["kind"], "synthesis_failed");
        assert_eq!(json["message"], "down");
    }
}
