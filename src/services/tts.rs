//! Text-to-speech (TTS) backends

use async_trait::async_trait;

use super::Synthesizer;
use crate::error::ServiceError;
use crate::language::LanguageCode;

const GOOGLE_BASE_URL: &str = "https://translate.google.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Longest text the Google TTS endpoint accepts in one request
pub const GOOGLE_CHUNK_CHARS: usize = 100;

/// TTS provider backend
#[derive(Clone, Debug)]
enum TtsProvider {
    Google,
    OpenAI {
        api_key: String,
        voice: String,
        model: String,
    },
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    speed: f32,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a synthesizer using Google Translate's speech endpoint
    ///
    /// Speeds below 1.0 select the endpoint's slow voice.
    #[must_use]
    pub fn new_google(speed: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GOOGLE_BASE_URL.to_string(),
            speed,
            provider: TtsProvider::Google,
        }
    }

    /// Create a synthesizer using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(
        api_key: String,
        voice: String,
        model: String,
        speed: f32,
    ) -> crate::Result<Self> {
        if api_key.is_empty() {
            return Err(crate::Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            speed: speed.clamp(0.25, 4.0),
            provider: TtsProvider::OpenAI {
                api_key,
                voice,
                model,
            },
        })
    }

    /// Point the synthesizer at another host (for tests and proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Synthesize using Google, one request per chunk, MP3 frames concatenated
    async fn synthesize_google(
        &self,
        text: &str,
        language: LanguageCode,
    ) -> Result<Vec<u8>, ServiceError> {
        let chunks = split_for_tts(text, GOOGLE_CHUNK_CHARS);
        let speed = if self.speed < 1.0 { "0.3" } else { "1" };
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();

            let response = self
                .client
                .get(format!("{}/translate_tts", self.base_url))
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language.code()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                    ("ttsspeed", speed),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %status, chunk = %idx, "Google TTS error");
                return Err(ServiceError::from_status(status.as_u16(), &body));
            }

            audio.extend_from_slice(&response.bytes().await?);
        }

        Ok(audio)
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(
        &self,
        text: &str,
        api_key: &str,
        voice: &str,
        model: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model,
            input: text,
            voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "OpenAI TTS error");
            return Err(ServiceError::from_status(status.as_u16(), &body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str, language: LanguageCode) -> Result<Vec<u8>, ServiceError> {
        match &self.provider {
            TtsProvider::Google => self.synthesize_google(text, language).await,
            TtsProvider::OpenAI {
                api_key,
                voice,
                model,
            } => self.synthesize_openai(text, api_key, voice, model).await,
        }
    }

    fn name(&self) -> &'static str {
        match self.provider {
            TtsProvider::Google => "google-tts",
            TtsProvider::OpenAI { .. } => "openai-tts",
        }
    }
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Breaks after sentence punctuation or whitespace when possible; a single
/// word longer than the limit is hard-split.
#[must_use]
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while !rest.is_empty() {
        if rest.len() <= max_chars {
            chunks.push(rest.iter().collect::<String>());
            break;
        }

        let window = &rest[..max_chars];
        let cut = window
            .iter()
            .rposition(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '।' | ',' | '，'))
            .map(|i| i + 1)
            .or_else(|| window.iter().rposition(|c| c.is_whitespace()).filter(|&i| i > 0))
            .unwrap_or(max_chars);

        let chunk: String = rest[..cut].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        let remaining: String = rest[cut..].iter().collect();
        rest = remaining.trim_start().chars().collect();
    }

    chunks
}
