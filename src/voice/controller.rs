//! Continuous listen → transcribe → translate → speak loop

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, mpsc};

use super::source::{AudioSource, SpeechOutput};
use crate::error::ErrorKind;
use crate::language::LanguageCode;
use crate::pipeline::{TranslationPipeline, TranslationRequest};
use crate::{Error, preview};

/// Default phrases that end the loop
pub const DEFAULT_STOP_COMMANDS: &[&str] = &["stop", "exit"];

/// Voice loop state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Not started
    Idle,
    /// Waiting for an utterance
    Listening,
    /// Recognizing captured speech
    Recognizing,
    /// Translating recognized text
    Translating,
    /// Playing the translation
    Speaking,
    /// Finished; terminal
    Stopped,
    /// The last iteration failed; the loop resumes listening
    Error(String),
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Listening => f.write_str("listening"),
            Self::Recognizing => f.write_str("recognizing"),
            Self::Translating => f.write_str("translating"),
            Self::Speaking => f.write_str("speaking"),
            Self::Stopped => f.write_str("stopped"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Status notifications from a running loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// The loop moved to a new state
    StateChanged(LoopState),
    /// Speech was recognized
    Recognized(String),
    /// A translation finished
    Translated {
        /// Recognized source text
        source_text: String,
        /// Translated text
        translated_text: String,
        /// Whether speech was synthesized
        has_audio: bool,
    },
    /// A partial failure that did not abort the iteration
    Warning(String),
    /// An iteration failed
    Failed {
        /// Error class
        kind: ErrorKind,
        /// Human-readable message
        message: String,
    },
}

/// Cooperative cancellation for a running loop
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    /// Create an untriggered handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop after its current step
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once a stop is requested
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Voice loop settings
#[derive(Debug, Clone)]
pub struct VoiceLoopConfig {
    /// Spoken language (may be `auto`)
    pub source: LanguageCode,
    /// Language to translate into
    pub target: LanguageCode,
    /// Recognized phrases that end the loop
    pub stop_commands: Vec<String>,
}

impl VoiceLoopConfig {
    /// Settings with the default stop commands
    #[must_use]
    pub fn new(source: LanguageCode, target: LanguageCode) -> Self {
        Self {
            source,
            target,
            stop_commands: DEFAULT_STOP_COMMANDS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Whether `text` is one of `commands`, ignoring case, surrounding
/// whitespace and trailing punctuation
#[must_use]
pub fn is_stop_command(text: &str, commands: &[String]) -> bool {
    let normalize = |s: &str| {
        s.trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation() || matches!(c, '。' | '！' | '।'))
            .trim()
            .to_lowercase()
    };

    let spoken = normalize(text);
    !spoken.is_empty() && commands.iter().any(|c| normalize(c) == spoken)
}

/// Drives the pipeline from a live audio source until stopped
pub struct VoiceLoopController<S, O> {
    pipeline: Arc<TranslationPipeline>,
    source: S,
    output: O,
    config: VoiceLoopConfig,
    state: LoopState,
    events: mpsc::UnboundedSender<LoopEvent>,
    stop: StopHandle,
}

impl<S: AudioSource, O: SpeechOutput> VoiceLoopController<S, O> {
    /// Create a controller and the receiving end of its event channel
    #[must_use]
    pub fn new(
        pipeline: Arc<TranslationPipeline>,
        source: S,
        output: O,
        config: VoiceLoopConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LoopEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            pipeline,
            source,
            output,
            config,
            state: LoopState::Idle,
            events,
            stop: StopHandle::new(),
        };
        (controller, rx)
    }

    /// Handle for stopping the loop from another task
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run until stopped; returns the final state
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> LoopState {
        tracing::info!(
            source = %self.config.source,
            target = %self.config.target,
            "voice loop started"
        );

        let stop = self.stop.clone();
        loop {
            if stop.is_stopped() {
                tracing::info!("stop requested");
                break;
            }

            self.transition(LoopState::Listening);

            let captured = tokio::select! {
                () = stop.stopped() => {
                    tracing::info!("stop requested while listening");
                    break;
                }
                captured = self.source.next_utterance() => captured,
            };

            let request = match captured {
                Ok(request) => request,
                Err(e) => {
                    self.fail(&e);
                    continue;
                }
            };

            self.transition(LoopState::Recognizing);
            let text = match self.pipeline.transcribe(request, self.config.source).await {
                Ok(transcription) => {
                    for degradation in &transcription.degradations {
                        self.emit(LoopEvent::Warning(degradation.to_string()));
                    }
                    transcription.text
                }
                Err(e) => {
                    self.fail(&e);
                    continue;
                }
            };

            self.emit(LoopEvent::Recognized(text.clone()));
            if is_stop_command(&text, &self.config.stop_commands) {
                tracing::info!(command = %text, "stop command heard");
                break;
            }

            self.transition(LoopState::Translating);
            let result = match TranslationRequest::from_codes(
                &text,
                self.config.source,
                self.config.target,
                self.pipeline.max_text_chars(),
            ) {
                Ok(request) => self.pipeline.translate_text(request).await,
                Err(e) => Err(e),
            };
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    self.fail(&e);
                    continue;
                }
            };

            for degradation in &result.degradations {
                self.emit(LoopEvent::Warning(degradation.to_string()));
            }
            self.emit(LoopEvent::Translated {
                source_text: result.source_text.clone(),
                translated_text: result.translated_text.clone(),
                has_audio: result.audio.is_some(),
            });

            if let Some(audio) = result.audio {
                self.transition(LoopState::Speaking);
                if let Err(e) = self.output.play(&audio).await {
                    self.fail(&e);
                }
            }
        }

        self.transition(LoopState::Stopped);
        tracing::info!("voice loop stopped");
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "voice loop state");
        self.state = next.clone();
        self.emit(LoopEvent::StateChanged(next));
    }

    fn fail(&mut self, error: &Error) {
        let message = error.to_string();
        tracing::warn!(state = %self.state, error = %preview(&message), "voice loop iteration failed");
        self.emit(LoopEvent::Failed {
            kind: error.kind(),
            message: message.clone(),
        });
        self.transition(LoopState::Error(message));
    }

    fn emit(&self, event: LoopEvent) {
        // A dropped receiver only means nobody is watching
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> Vec<String> {
        DEFAULT_STOP_COMMANDS.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn stop_commands_ignore_case_and_punctuation() {
        for spoken in ["stop", "Stop", " STOP. ", "exit!", "Exit?"] {
            assert!(is_stop_command(spoken, &commands()), "{spoken}");
        }
    }

    #[test]
    fn stop_command_must_be_whole_phrase() {
        for spoken in ["please stop", "stopwatch", "", "..."] {
            assert!(!is_stop_command(spoken, &commands()), "{spoken}");
        }
    }

    #[test]
    fn state_display() {
        assert_eq!(LoopState::Listening.to_string(), "listening");
        assert_eq!(LoopState::Error("boom".into()).to_string(), "error: boom");
    }

    #[tokio::test]
    async fn stop_handle_wakes_waiters() {
        let handle = StopHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.stopped().await })
        };
        tokio::task::yield_now().await;
        handle.stop();
        waiter.await.unwrap();
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn stopped_resolves_when_already_stopped() {
        let handle = StopHandle::new();
        handle.stop();
        handle.stopped().await;
    }
}
