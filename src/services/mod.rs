//! Remote translation, recognition and synthesis services
//!
//! Each capability is a trait so the pipeline can run against real HTTP
//! backends or test doubles. The `*Client` wrappers add the bounded retry
//! policy and the per-call deadline on top of a backend.

mod retry;
mod stt;
mod translate;
mod tts;

use std::sync::Arc;

use async_trait::async_trait;

pub use retry::{RetryPolicy, call_with_retry, delay_for_attempt};
pub use stt::SpeechToText;
pub use translate::GoogleTranslator;
pub use tts::{GOOGLE_CHUNK_CHARS, TextToSpeech, split_for_tts};

use crate::Result;
use crate::config::{RecognizerKind, ServicesConfig, SynthesizerKind};
use crate::error::ServiceError;
use crate::language::LanguageCode;

/// Translates text between languages
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text`; `source` may be [`LanguageCode::AUTO`]
    async fn translate(
        &self,
        text: &str,
        source: LanguageCode,
        target: LanguageCode,
    ) -> std::result::Result<String, ServiceError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Converts speech audio to text
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize speech in `audio`, encoded as `mime`
    async fn recognize(
        &self,
        audio: &[u8],
        mime: &str,
        language: LanguageCode,
    ) -> std::result::Result<String, ServiceError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Converts text to MP3 speech audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` spoken in `language`
    async fn synthesize(
        &self,
        text: &str,
        language: LanguageCode,
    ) -> std::result::Result<Vec<u8>, ServiceError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Translator with retry and deadline
#[derive(Clone)]
pub struct TranslationClient {
    backend: Arc<dyn Translator>,
    policy: RetryPolicy,
}

impl TranslationClient {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Arc<dyn Translator>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Translate text. An empty result counts as a transient failure.
    ///
    /// # Errors
    ///
    /// Returns the last [`ServiceError`] once retries are exhausted
    pub async fn translate(
        &self,
        text: &str,
        source: LanguageCode,
        target: LanguageCode,
    ) -> std::result::Result<String, ServiceError> {
        let backend = self.backend.as_ref();
        call_with_retry(backend.name(), &self.policy, move || async move {
            let translated = backend.translate(text, source, target).await?;
            if translated.trim().is_empty() {
                return Err(ServiceError::Unavailable(
                    "translator returned empty text".to_string(),
                ));
            }
            Ok(translated)
        })
        .await
    }
}

/// Recognizer with retry and deadline
#[derive(Clone)]
pub struct RecognitionClient {
    backend: Arc<dyn Recognizer>,
    policy: RetryPolicy,
}

impl RecognitionClient {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Arc<dyn Recognizer>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Recognize speech. Blank text counts as not understood.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotUnderstood`] immediately, or the last
    /// transient error once retries are exhausted
    pub async fn recognize(
        &self,
        audio: &[u8],
        mime: &str,
        language: LanguageCode,
    ) -> std::result::Result<String, ServiceError> {
        let backend = self.backend.as_ref();
        call_with_retry(backend.name(), &self.policy, move || async move {
            let text = backend.recognize(audio, mime, language).await?;
            let text = text.trim();
            if text.is_empty() {
                return Err(ServiceError::NotUnderstood("empty transcript".to_string()));
            }
            Ok(text.to_string())
        })
        .await
    }
}

/// Synthesizer with retry and deadline
#[derive(Clone)]
pub struct SynthesisClient {
    backend: Arc<dyn Synthesizer>,
    policy: RetryPolicy,
}

impl SynthesisClient {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Arc<dyn Synthesizer>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Synthesize speech. Empty audio counts as a transient failure.
    ///
    /// # Errors
    ///
    /// Returns the last [`ServiceError`] once retries are exhausted
    pub async fn synthesize(
        &self,
        text: &str,
        language: LanguageCode,
    ) -> std::result::Result<Vec<u8>, ServiceError> {
        let backend = self.backend.as_ref();
        call_with_retry(backend.name(), &self.policy, move || async move {
            let audio = backend.synthesize(text, language).await?;
            if audio.is_empty() {
                return Err(ServiceError::Unavailable(
                    "synthesizer returned no audio".to_string(),
                ));
            }
            Ok(audio)
        })
        .await
    }
}

/// The three service clients the pipeline needs
#[derive(Clone)]
pub struct ServiceClients {
    /// Text translation
    pub translator: TranslationClient,
    /// Speech recognition
    pub recognizer: RecognitionClient,
    /// Speech synthesis
    pub synthesizer: SynthesisClient,
}

impl ServiceClients {
    /// Build clients for the configured backends
    ///
    /// # Errors
    ///
    /// Returns error if a selected backend is missing its API key
    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        let policy = config.retry_policy();

        let translator: Arc<dyn Translator> = Arc::new(GoogleTranslator::new());

        let recognizer: Arc<dyn Recognizer> = match config.recognizer {
            RecognizerKind::Google => {
                Arc::new(SpeechToText::new_google(config.google_speech_key.clone()))
            }
            RecognizerKind::Whisper => Arc::new(SpeechToText::new_whisper(
                config.openai_api_key.clone().unwrap_or_default(),
                config.stt_model.clone(),
            )?),
        };

        let synthesizer: Arc<dyn Synthesizer> = match config.synthesizer {
            SynthesizerKind::Google => Arc::new(TextToSpeech::new_google(config.tts_speed)),
            SynthesizerKind::OpenAI => Arc::new(TextToSpeech::new_openai(
                config.openai_api_key.clone().unwrap_or_default(),
                config.tts_voice.clone(),
                config.tts_model.clone(),
                config.tts_speed,
            )?),
        };

        tracing::info!(
            translator = translator.name(),
            recognizer = recognizer.name(),
            synthesizer = synthesizer.name(),
            max_attempts = policy.max_attempts,
            "service clients configured"
        );

        Ok(Self {
            translator: TranslationClient::new(translator, policy.clone()),
            recognizer: RecognitionClient::new(recognizer, policy.clone()),
            synthesizer: SynthesisClient::new(synthesizer, policy),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct EchoTranslator {
        reply: &'static str,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(
            &self,
            _text: &str,
            _source: LanguageCode,
            _target: LanguageCode,
        ) -> std::result::Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct SilentRecognizer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Recognizer for SilentRecognizer {
        async fn recognize(
            &self,
            _audio: &[u8],
            _mime: &str,
            _language: LanguageCode,
        ) -> std::result::Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("   ".to_string())
        }

        fn name(&self) -> &'static str {
            "silent"
        }
    }

    #[tokio::test]
    async fn empty_translation_is_retried_then_unavailable() {
        let backend = Arc::new(EchoTranslator {
            reply: "",
            calls: AtomicU32::new(0),
        });
        let client = TranslationClient::new(backend.clone(), RetryPolicy::immediate(2));

        let err = client
            .translate("Hello", LanguageCode::AUTO, LanguageCode::resolve("fr").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blank_transcript_is_not_understood_without_retry() {
        let backend = Arc::new(SilentRecognizer {
            calls: AtomicU32::new(0),
        });
        let client = RecognitionClient::new(backend.clone(), RetryPolicy::immediate(3));

        let err = client
            .recognize(b"RIFF", "audio/wav", LanguageCode::AUTO)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotUnderstood(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn whisper_without_key_fails_to_configure() {
        let config = ServicesConfig {
            recognizer: RecognizerKind::Whisper,
            openai_api_key: None,
            ..ServicesConfig::default()
        };
        assert!(ServiceClients::from_config(&config).is_err());
    }

    #[test]
    fn default_backends_need_no_keys() {
        assert!(ServiceClients::from_config(&ServicesConfig::default()).is_ok());
    }
}
