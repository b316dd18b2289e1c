//! Parley Gateway - Speech and text translation gateway
//!
//! This library provides the core functionality for the Parley gateway:
//! - Text translation with synthesized speech of the result
//! - Speech recognition of uploaded audio, optionally translated
//! - A continuous voice loop (microphone to translated speech)
//! - Remote service clients with bounded retry
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │      HTTP API     │    Voice loop    │     CLI      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Translation pipeline                   │
//! │  Normalizer  │  Scratch dir  │  Synthesis cache     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │             Remote services (retried)                │
//! │     Translate     │      STT       │      TTS       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod scratch;
pub mod services;
pub mod voice;

pub use cache::{CacheKey, SynthesisCache};
pub use config::Config;
pub use error::{Error, ErrorKind, Result, ServiceError};
pub use language::{LANGUAGES, Language, LanguageCode};
pub use pipeline::{
    Degradation, PipelineResult, Transcription, TranscriptionRequest, TranslationPipeline,
    TranslationRequest,
};
pub use scratch::{ScratchDir, ScratchFile};
pub use services::{
    RecognitionClient, Recognizer, RetryPolicy, ServiceClients, SynthesisClient, Synthesizer,
    TranslationClient, Translator,
};

/// Characters of user text kept in log lines and error messages
const PREVIEW_CHARS: usize = 40;

/// Shorten text for logging
#[must_use]
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
