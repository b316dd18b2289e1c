//! Utterance segmentation
//!
//! Splits a continuous microphone stream into utterances using RMS energy.
//! The first half second of audio is treated as room noise and sets the
//! speech threshold.

use crate::audio::SAMPLE_RATE;

/// Threshold used until calibration finishes
const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Lowest threshold calibration may produce
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Speech must be this much louder than the calibrated room noise
const AMBIENT_RATIO: f32 = 1.5;

/// Audio used for ambient calibration (0.5 seconds)
const CALIBRATION_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// Minimum voiced audio in an utterance (0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.5 seconds)
const SILENCE_SAMPLES: usize = 8000;

/// Longest utterance before it is cut (15 seconds)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Measuring room noise
    Calibrating,
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speaking,
}

/// Detects utterance boundaries in 16 kHz mono audio
pub struct SpeechSegmenter {
    state: SegmenterState,
    threshold: f32,
    calibration: Vec<f32>,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl SpeechSegmenter {
    /// Create a segmenter that calibrates on its first half second of input
    #[must_use]
    pub fn new() -> Self {
        tracing::debug!("speech segmenter calibrating");
        Self {
            state: SegmenterState::Calibrating,
            threshold: DEFAULT_ENERGY_THRESHOLD,
            calibration: Vec::with_capacity(CALIBRATION_SAMPLES),
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Create a segmenter with a fixed threshold and no calibration
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            state: SegmenterState::Idle,
            threshold,
            calibration: Vec::new(),
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed captured samples; returns a finished utterance when one ends
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        match self.state {
            SegmenterState::Calibrating => {
                let needed = CALIBRATION_SAMPLES - self.calibration.len();
                let (head, rest) = samples.split_at(needed.min(samples.len()));
                self.calibration.extend_from_slice(head);

                if self.calibration.len() >= CALIBRATION_SAMPLES {
                    let ambient = calculate_energy(&self.calibration);
                    self.threshold = (ambient * AMBIENT_RATIO).max(MIN_ENERGY_THRESHOLD);
                    self.calibration = Vec::new();
                    self.state = SegmenterState::Idle;
                    tracing::debug!(ambient, threshold = self.threshold, "ambient noise calibrated");
                    return self.process(rest);
                }
                None
            }
            SegmenterState::Idle => {
                let energy = calculate_energy(samples);
                if energy > self.threshold {
                    self.state = SegmenterState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
                None
            }
            SegmenterState::Speaking => {
                let energy = calculate_energy(samples);
                self.speech_buffer.extend_from_slice(samples);

                if energy > self.threshold {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let voiced = self.speech_buffer.len().saturating_sub(self.silence_counter);

                if self.speech_buffer.len() >= MAX_UTTERANCE_SAMPLES {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance cut at limit");
                    return Some(self.finish());
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if voiced >= MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        return Some(self.finish());
                    }
                    tracing::trace!(voiced, "too short, discarding");
                    self.reset();
                }
                None
            }
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Energy above which audio counts as speech
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Drop any partial utterance and wait for speech again
    pub fn reset(&mut self) {
        if self.state != SegmenterState::Calibrating {
            self.state = SegmenterState::Idle;
        }
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    fn finish(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.speech_buffer);
        self.reset();
        utterance
    }
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
