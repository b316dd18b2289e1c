//! Live audio endpoints for the voice loop

use std::time::Duration;

use async_trait::async_trait;

use super::{AudioCapture, AudioPlayback, SpeechSegmenter};
use crate::Result;
use crate::audio::{SAMPLE_RATE, samples_to_wav};
use crate::pipeline::TranscriptionRequest;

/// Produces utterances to recognize
#[async_trait(?Send)]
pub trait AudioSource {
    /// Wait for the next complete utterance
    async fn next_utterance(&mut self) -> Result<TranscriptionRequest>;
}

/// Plays synthesized speech
#[async_trait(?Send)]
pub trait SpeechOutput {
    /// Play MP3 audio to completion
    async fn play(&mut self, mp3: &[u8]) -> Result<()>;
}

/// Microphone input split into utterances
pub struct MicrophoneSource {
    capture: AudioCapture,
    segmenter: SpeechSegmenter,
    poll_interval: Duration,
}

impl MicrophoneSource {
    /// Open the default microphone
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available
    pub fn new() -> Result<Self> {
        Ok(Self {
            capture: AudioCapture::new()?,
            segmenter: SpeechSegmenter::new(),
            poll_interval: Duration::from_millis(100),
        })
    }
}

#[async_trait(?Send)]
impl AudioSource for MicrophoneSource {
    async fn next_utterance(&mut self) -> Result<TranscriptionRequest> {
        if self.capture.is_capturing() {
            // Ignore audio heard while the previous utterance was processed
            self.capture.clear_buffer();
            self.segmenter.reset();
        } else {
            self.capture.start()?;
        }

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let samples = self.capture.take_buffer();
            if let Some(utterance) = self.segmenter.process(&samples) {
                let wav = samples_to_wav(&utterance, SAMPLE_RATE)?;
                return Ok(TranscriptionRequest::new(wav, "audio/wav"));
            }
        }
    }
}

/// Default speaker output
pub struct SpeakerOutput {
    playback: AudioPlayback,
}

impl SpeakerOutput {
    /// Open the default speaker at `volume_percent`
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new(volume_percent: u8) -> Result<Self> {
        Ok(Self {
            playback: AudioPlayback::new()?.with_volume_percent(volume_percent),
        })
    }
}

#[async_trait(?Send)]
impl SpeechOutput for SpeakerOutput {
    async fn play(&mut self, mp3: &[u8]) -> Result<()> {
        self.playback.play_mp3(mp3)
    }
}
