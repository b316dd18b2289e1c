//! Translation and speech endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::error::{ErrorKind, ServiceError};
use crate::language::{LANGUAGES, Language, LanguageCode};
use crate::pipeline::{Degradation, PipelineResult, TranscriptionRequest, TranslationRequest};
use crate::Error;

/// Build translation router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/translate", post(translate))
        .route("/speech-to-text", post(speech_to_text))
        .route("/speech-translate", post(speech_translate))
        .route("/languages", get(languages))
        .with_state(state)
}

fn default_source() -> String {
    crate::language::AUTO.to_string()
}

/// Text translation request
#[derive(Debug, Deserialize)]
pub struct TranslateBody {
    pub text: String,
    #[serde(default = "default_source")]
    pub from_lang: String,
    pub to_lang: String,
}

/// Translation response
#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub success: bool,
    pub source_text: String,
    pub translated_text: String,
    /// Base64-encoded MP3, absent when synthesis failed
    pub audio: Option<String>,
    pub elapsed_ms: u64,
    pub warnings: Vec<Degradation>,
}

impl From<PipelineResult> for TranslateResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            success: true,
            audio: result
                .audio
                .as_deref()
                .map(|audio| base64::engine::general_purpose::STANDARD.encode(audio.as_slice())),
            source_text: result.source_text,
            translated_text: result.translated_text,
            elapsed_ms: millis(result.elapsed),
            warnings: result.degradations,
        }
    }
}

/// Recognition response
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub success: bool,
    pub text: String,
    pub elapsed_ms: u64,
    pub warnings: Vec<Degradation>,
}

/// Supported languages response
#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: &'static [Language],
    pub default_source: &'static str,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Translate text and synthesize the result
async fn translate(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let Json(body) = body.map_err(|e| Error::InvalidRequest(e.body_text()))?;

    let request = TranslationRequest::new(
        &body.text,
        &body.from_lang,
        &body.to_lang,
        state.pipeline.max_text_chars(),
    )?;
    let result = state.pipeline.translate_text(request).await?;

    Ok(Json(result.into()))
}

/// Recognize uploaded speech
async fn speech_to_text(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let form = SpeechForm::read(multipart).await?;
    let language = form
        .language
        .as_deref()
        .map_or(Ok(LanguageCode::AUTO), LanguageCode::resolve)?;

    let transcription = state.pipeline.transcribe(form.audio, language).await?;

    Ok(Json(TranscribeResponse {
        success: true,
        text: transcription.text,
        elapsed_ms: millis(transcription.elapsed),
        warnings: transcription.degradations,
    }))
}

/// Recognize uploaded speech, then translate and synthesize it
async fn speech_translate(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<TranslateResponse>, ApiError> {
    let form = SpeechForm::read(multipart).await?;
    let source = form
        .from_lang
        .as_deref()
        .map_or(Ok(LanguageCode::AUTO), LanguageCode::resolve)?;
    let target = form
        .to_lang
        .as_deref()
        .ok_or_else(|| Error::InvalidRequest("missing field: to_lang".to_string()))
        .and_then(LanguageCode::resolve_target)?;

    let result = state
        .pipeline
        .transcribe_and_translate(form.audio, source, target)
        .await?;

    Ok(Json(result.into()))
}

/// List supported languages
async fn languages() -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: LANGUAGES,
        default_source: crate::language::AUTO,
    })
}

/// Fields of a speech upload form
struct SpeechForm {
    audio: TranscriptionRequest,
    language: Option<String>,
    from_lang: Option<String>,
    to_lang: Option<String>,
}

impl SpeechForm {
    async fn read(mut multipart: Multipart) -> crate::Result<Self> {
        let mut audio = None;
        let mut language = None;
        let mut from_lang = None;
        let mut to_lang = None;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "audio" => {
                    let format = field
                        .content_type()
                        .map(ToString::to_string)
                        .or_else(|| {
                            field
                                .file_name()
                                .and_then(|name| name.rsplit_once('.'))
                                .map(|(_, ext)| ext.to_string())
                        })
                        .unwrap_or_else(|| "audio/wav".to_string());
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    audio = Some(TranscriptionRequest::new(bytes.to_vec(), format));
                }
                "language" => language = Some(field.text().await.map_err(multipart_error)?),
                "from_lang" => from_lang = Some(field.text().await.map_err(multipart_error)?),
                "to_lang" => to_lang = Some(field.text().await.map_err(multipart_error)?),
                _ => {}
            }
        }

        let audio =
            audio.ok_or_else(|| Error::InvalidRequest("missing field: audio".to_string()))?;

        Ok(Self {
            audio,
            language: language.filter(|s| !s.trim().is_empty()),
            from_lang: from_lang.filter(|s| !s.trim().is_empty()),
            to_lang: to_lang.filter(|s| !s.trim().is_empty()),
        })
    }
}

fn multipart_error(e: MultipartError) -> Error {
    Error::InvalidRequest(e.body_text())
}

/// Error response for API handlers
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// HTTP status and machine-readable code
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        let code = match &self.0 {
            Error::EmptyText => "empty_text",
            Error::TextTooLong { .. } => "text_too_long",
            Error::UnsupportedLanguage(_) => "unsupported_language",
            Error::EmptyInput => "empty_audio",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Translation(e) | Error::Recognition(e) | Error::Synthesis(e) => match e {
                ServiceError::InvalidInput(_) => "rejected_by_service",
                ServiceError::NotUnderstood(_) => "not_understood",
                ServiceError::Unavailable(_) => "service_unavailable",
                ServiceError::Timeout(_) => "service_timeout",
            },
            _ => "internal_error",
        };

        let status = match self.0.kind() {
            ErrorKind::Client => StatusCode::BAD_REQUEST,
            ErrorKind::NotUnderstood => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, code)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            success: bool,
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            tracing::debug!(status = %status, error = %self.0, "request rejected");
            self.0.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: ErrorBody { code, message },
            }),
        )
            .into_response()
    }
}
