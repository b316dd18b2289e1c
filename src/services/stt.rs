//! Speech-to-text (STT) backends

use async_trait::async_trait;

use super::Recognizer;
use crate::audio::{self, SAMPLE_RATE};
use crate::error::ServiceError;
use crate::language::LanguageCode;

const GOOGLE_BASE_URL: &str = "https://www.google.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// One line of the Google speech API response
#[derive(serde::Deserialize)]
struct GoogleSpeechLine {
    #[serde(default)]
    result: Vec<GoogleSpeechResult>,
}

#[derive(serde::Deserialize)]
struct GoogleSpeechResult {
    #[serde(default)]
    alternative: Vec<GoogleAlternative>,
}

#[derive(serde::Deserialize)]
struct GoogleAlternative {
    transcript: String,
    confidence: Option<f64>,
}

/// STT provider backend
#[derive(Clone, Debug)]
enum SttProvider {
    Google { key: Option<String> },
    Whisper { api_key: String, model: String },
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a recognizer using the Google speech endpoint
    ///
    /// `key` is optional; without it the endpoint's anonymous quota applies.
    #[must_use]
    pub fn new_google(key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GOOGLE_BASE_URL.to_string(),
            provider: SttProvider::Google {
                key: key.filter(|k| !k.is_empty()),
            },
        }
    }

    /// Create a recognizer using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> crate::Result<Self> {
        if api_key.is_empty() {
            return Err(crate::Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            provider: SttProvider::Whisper { api_key, model },
        })
    }

    /// Point the recognizer at another host (for tests and proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Transcribe using the Google speech endpoint
    ///
    /// The endpoint only accepts raw 16 kHz linear PCM, so the WAV header
    /// is stripped first. Audio that is not canonical WAV is refused.
    async fn transcribe_google(
        &self,
        audio: &[u8],
        language: LanguageCode,
        key: Option<&str>,
    ) -> Result<String, ServiceError> {
        let pcm = audio::wav_to_pcm16(audio)
            .map_err(|e| ServiceError::InvalidInput(format!("unsupported audio: {e}")))?;

        tracing::debug!(pcm_bytes = pcm.len(), language = %language, "starting Google transcription");

        let locale = language.speech_locale();
        let mut query = vec![
            ("client", "chromium"),
            ("lang", locale.as_str()),
            ("output", "json"),
        ];
        if let Some(key) = key {
            query.push(("key", key));
        }

        let response = self
            .client
            .post(format!("{}/speech-api/v2/recognize", self.base_url))
            .query(&query)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("audio/l16; rate={SAMPLE_RATE}"),
            )
            .body(pcm)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Google speech API error");
            return Err(ServiceError::from_status(status.as_u16(), &body));
        }

        let body = response.text().await?;
        parse_google_transcript(&body)
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(
        &self,
        audio: &[u8],
        mime: &str,
        language: LanguageCode,
        api_key: &str,
        model: &str,
    ) -> Result<String, ServiceError> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let format = audio::AudioFormat::from_mime(mime);
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(mime)
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string());
        if !language.is_auto() {
            // Whisper takes ISO-639-1 codes only
            let iso = language.code().split('-').next().unwrap_or("en");
            form = form.text("language", iso.to_string());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Whisper API error");
            return Err(ServiceError::from_status(status.as_u16(), &body));
        }

        let result: WhisperResponse = response.json().await?;
        if result.text.trim().is_empty() {
            return Err(ServiceError::NotUnderstood("no speech detected".to_string()));
        }
        Ok(result.text)
    }
}

#[async_trait]
impl Recognizer for SpeechToText {
    async fn recognize(
        &self,
        audio: &[u8],
        mime: &str,
        language: LanguageCode,
    ) -> Result<String, ServiceError> {
        match &self.provider {
            SttProvider::Google { key } => {
                self.transcribe_google(audio, language, key.as_deref()).await
            }
            SttProvider::Whisper { api_key, model } => {
                self.transcribe_whisper(audio, mime, language, api_key, model)
                    .await
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.provider {
            SttProvider::Google { .. } => "google-speech",
            SttProvider::Whisper { .. } => "whisper",
        }
    }
}

/// Pick the best transcript from a newline-delimited Google response.
///
/// The first line is usually an empty `{"result":[]}`. A response with no
/// alternatives at all means the speech was not understood.
fn parse_google_transcript(body: &str) -> Result<String, ServiceError> {
    let mut best: Option<GoogleAlternative> = None;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed: GoogleSpeechLine = serde_json::from_str(line)
            .map_err(|e| ServiceError::Unavailable(format!("malformed speech response: {e}")))?;

        for alternative in parsed.result.into_iter().flat_map(|r| r.alternative) {
            if alternative.transcript.trim().is_empty() {
                continue;
            }
            let better = best.as_ref().is_none_or(|current| {
                alternative.confidence.unwrap_or(0.0) > current.confidence.unwrap_or(0.0)
            });
            if better {
                best = Some(alternative);
            }
        }
    }

    best.map(|a| a.transcript)
        .ok_or_else(|| ServiceError::NotUnderstood("no transcript returned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav() -> Vec<u8> {
        audio::samples_to_wav(&[0.1; 1600], SAMPLE_RATE).unwrap()
    }

    #[test]
    fn picks_most_confident_transcript() {
        let body = "{\"result\":[]}\n\
            {\"result\":[{\"alternative\":[{\"transcript\":\"hello world\",\"confidence\":0.92},{\"transcript\":\"hello word\"}],\"final\":true}],\"result_index\":0}\n";
        assert_eq!(parse_google_transcript(body).unwrap(), "hello world");
    }

    #[test]
    fn empty_result_is_not_understood() {
        let err = parse_google_transcript("{\"result\":[]}\n").unwrap_err();
        assert!(matches!(err, ServiceError::NotUnderstood(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn whisper_requires_key() {
        assert!(SpeechToText::new_whisper(String::new(), "whisper-1".into()).is_err());
    }

    #[tokio::test]
    async fn google_sends_linear_pcm() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/speech-api/v2/recognize")
            .match_query(mockito::Matcher::UrlEncoded("lang".into(), "fr-FR".into()))
            .match_header("content-type", "audio/l16; rate=16000")
            .with_status(200)
            .with_body("{\"result\":[]}\n{\"result\":[{\"alternative\":[{\"transcript\":\"bonjour\"}]}]}\n")
            .create_async()
            .await;

        let stt = SpeechToText::new_google(None).with_base_url(server.url());
        let text = stt
            .recognize(&wav(), "audio/wav", LanguageCode::resolve("fr").unwrap())
            .await
            .unwrap();

        assert_eq!(text, "bonjour");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn google_refuses_non_wav_without_calling_out() {
        let stt = SpeechToText::new_google(None).with_base_url("http://127.0.0.1:9");
        let err = stt
            .recognize(b"ID3 not a wav", "audio/mpeg", LanguageCode::AUTO)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn whisper_transcribes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/audio/transcriptions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(r#"{"text":"hola"}"#)
            .create_async()
            .await;

        let stt = SpeechToText::new_whisper("sk-test".into(), "whisper-1".into())
            .unwrap()
            .with_base_url(server.url());
        let text = stt
            .recognize(&wav(), "audio/wav", LanguageCode::resolve("es").unwrap())
            .await
            .unwrap();

        assert_eq!(text, "hola");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/speech-api/v2/recognize")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let stt = SpeechToText::new_google(None).with_base_url(server.url());
        let err = stt
            .recognize(&wav(), "audio/wav", LanguageCode::AUTO)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
