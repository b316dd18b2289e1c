//! Speaker playback

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::audio;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
    volume: f32,
}

impl AudioPlayback {
    /// Open the default output device at full volume
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        // Prefer mono, fall back to stereo
        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| supports_rate(c) && c.channels() <= 2)
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            config,
            volume: 1.0,
        })
    }

    /// Set output volume as a percentage (clamped to 0..=100)
    #[must_use]
    pub fn with_volume_percent(mut self, percent: u8) -> Self {
        self.volume = f32::from(percent.min(100)) / 100.0;
        self
    }

    /// Play MP3 bytes, blocking until playback finishes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let (samples, rate) = audio::decode_mp3(mp3_data)?;
        let samples = if rate == PLAYBACK_SAMPLE_RATE {
            samples
        } else {
            audio::resample_audio(&samples, rate, PLAYBACK_SAMPLE_RATE)?
        };
        self.play_samples(apply_volume(samples, self.volume))
    }

    /// Play a short test tone
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn play_tone(&self, frequency: f32, duration: Duration) -> Result<()> {
        let count = (duration.as_secs_f32() * PLAYBACK_SAMPLE_RATE as f32) as usize;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
                (t * frequency * std::f32::consts::TAU).sin() * 0.3
            })
            .collect();
        self.play_samples(apply_volume(samples, self.volume))
    }

    /// Play mono samples in a blocking manner
    fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            pos = (pos + 1).min(samples.len());
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Scale samples by `volume` (0.0..=1.0)
fn apply_volume(mut samples: Vec<f32>, volume: f32) -> Vec<f32> {
    let volume = volume.clamp(0.0, 1.0);
    if (volume - 1.0).abs() > f32::EPSILON {
        for s in &mut samples {
            *s *= volume;
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_scales_samples() {
        let out = apply_volume(vec![0.5, -1.0], 0.5);
        assert!((out[0] - 0.25).abs() < f32::EPSILON);
        assert!((out[1] + 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn full_volume_is_untouched() {
        assert_eq!(apply_volume(vec![0.3, 0.7], 1.0), vec![0.3, 0.7]);
    }

    #[test]
    fn mute_silences() {
        assert!(apply_volume(vec![0.9; 10], 0.0).iter().all(|s| s.abs() < f32::EPSILON));
    }
}
