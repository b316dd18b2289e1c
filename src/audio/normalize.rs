//! Conversion of arbitrary input audio to canonical recognizer input

use std::io::Cursor;
use std::path::Path;

use super::{SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Lowest input sample rate accepted for conversion
pub const MIN_INPUT_RATE: u32 = 8_000;

/// Highest input sample rate accepted for conversion
pub const MAX_INPUT_RATE: u32 = 192_000;

/// Longest input accepted for conversion, in seconds
pub const MAX_DURATION_SECS: u32 = 600;

/// Declared container format of an audio payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    /// RIFF/WAVE, any channel count, rate or bit depth
    Wav,
    /// MPEG layer III
    Mp3,
    /// Anything else (webm, ogg, m4a...), passed through untouched
    Other(String),
}

impl AudioFormat {
    /// Parse a MIME type or bare extension (`audio/wav`, `audio/mpeg; codecs=mp3`, `wav`)
    #[must_use]
    pub fn from_mime(declared: &str) -> Self {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" | "wav" => Self::Wav,
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "mp3" => Self::Mp3,
            _ => Self::Other(essence),
        }
    }

    /// File extension used for scratch files
    #[must_use]
    pub fn extension(&self) -> &str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Other(mime) => match mime.as_str() {
                "audio/webm" => "webm",
                "audio/ogg" | "audio/opus" => "ogg",
                "audio/flac" | "audio/x-flac" => "flac",
                "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
                _ => "bin",
            },
        }
    }
}

/// Outcome of normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Input was already canonical WAV and is returned as-is
    Unchanged(Vec<u8>),
    /// Input was decoded, downmixed, resampled and re-encoded
    Converted(Vec<u8>),
    /// Input could not be decoded; original bytes are returned so the
    /// recognizer can still make a best-effort attempt
    Degraded {
        /// The untouched input
        original: Vec<u8>,
        /// Why conversion failed
        reason: String,
    },
}

impl Normalized {
    /// Bytes to hand to the recognizer
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Unchanged(b) | Self::Converted(b) | Self::Degraded { original: b, .. } => b,
        }
    }

    /// Failure reason when conversion fell back to the raw input
    #[must_use]
    pub fn degradation(&self) -> Option<&str> {
        match self {
            Self::Degraded { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Decodes input audio into mono 16kHz 16-bit WAV
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioNormalizer;

impl AudioNormalizer {
    /// Create a normalizer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Whether `bytes` is already mono 16kHz 16-bit PCM WAV
    #[must_use]
    pub fn is_canonical(bytes: &[u8]) -> bool {
        hound::WavReader::new(Cursor::new(bytes)).is_ok_and(|reader| {
            let spec = reader.spec();
            spec.channels == 1
                && spec.sample_rate == SAMPLE_RATE
                && spec.bits_per_sample == 16
                && spec.sample_format == hound::SampleFormat::Int
        })
    }

    /// Normalize an in-memory payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for an empty payload. Decode failures are
    /// not errors; they yield [`Normalized::Degraded`].
    pub fn normalize(&self, bytes: &[u8], declared_format: &str) -> Result<Normalized> {
        if bytes.is_empty() {
            return Err(Error::EmptyInput);
        }

        let format = AudioFormat::from_mime(declared_format);
        if format == AudioFormat::Wav && Self::is_canonical(bytes) {
            tracing::trace!(bytes = bytes.len(), "audio already canonical");
            return Ok(Normalized::Unchanged(bytes.to_vec()));
        }

        match convert(bytes, &format) {
            Ok(wav) => {
                tracing::debug!(
                    format = ?format,
                    input_bytes = bytes.len(),
                    output_bytes = wav.len(),
                    "audio normalized"
                );
                Ok(Normalized::Converted(wav))
            }
            Err(e) => {
                tracing::warn!(format = ?format, error = %e, "audio conversion failed, using raw input");
                Ok(Normalized::Degraded {
                    original: bytes.to_vec(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Normalize the contents of a file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is empty
    pub fn normalize_file(&self, path: &Path, declared_format: &str) -> Result<Normalized> {
        let bytes = std::fs::read(path)?;
        self.normalize(&bytes, declared_format)
    }
}

/// Decode, downmix, resample and re-encode
fn convert(bytes: &[u8], format: &AudioFormat) -> Result<Vec<u8>> {
    let (samples, sample_rate) = match format {
        AudioFormat::Wav => decode_wav(bytes)?,
        AudioFormat::Mp3 => decode_mp3(bytes)?,
        AudioFormat::Other(mime) => {
            return Err(Error::Audio(format!("no decoder for {mime}")));
        }
    };

    if samples.is_empty() {
        return Err(Error::Audio("decoded audio contains no samples".to_string()));
    }
    check_bounds(samples.len(), sample_rate)?;

    let resampled = if sample_rate == SAMPLE_RATE {
        samples
    } else {
        resample_audio(&samples, sample_rate, SAMPLE_RATE)?
    };

    samples_to_wav(&resampled, SAMPLE_RATE)
}

/// Reject rates and lengths that would make resampling blow up
fn check_bounds(frames: usize, sample_rate: u32) -> Result<()> {
    if !(MIN_INPUT_RATE..=MAX_INPUT_RATE).contains(&sample_rate) {
        return Err(Error::Audio(format!(
            "sample rate {sample_rate} Hz outside {MIN_INPUT_RATE}..={MAX_INPUT_RATE} Hz"
        )));
    }

    let max_frames = u64::from(MAX_DURATION_SECS) * u64::from(sample_rate);
    if u64::try_from(frames).unwrap_or(u64::MAX) > max_frames {
        return Err(Error::Audio(format!("audio longer than {MAX_DURATION_SECS}s")));
    }

    Ok(())
}

/// Decode WAV of any layout to mono f32
#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    // header check, before any samples are decoded
    check_bounds(usize::try_from(reader.duration()).unwrap_or(usize::MAX), spec.sample_rate)?;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
    };

    Ok((downmix(&interleaved, usize::from(spec.channels)), spec.sample_rate))
}

/// Decode MP3 to mono f32 using minimp3
#[allow(clippy::cast_sign_loss)]
pub(crate) fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(bytes);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate.get_or_insert(frame.sample_rate as u32);
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| Error::Audio("no MP3 frames found".to_string()))?;
    Ok((samples, sample_rate))
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio using rubato
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub(crate) fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let delay = resampler.output_delay();

    // Pad to whole chunks plus one extra chunk to flush the filter delay
    let mut input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let padded_len = input.len().div_ceil(chunk_size) * chunk_size + chunk_size;
    input.resize(padded_len, 0.0);

    let mut output = Vec::with_capacity(expected + delay);
    for chunk in input.chunks(chunk_size) {
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, seconds: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (sample_rate as f32 * seconds) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let v = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 8000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(v).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn parses_declared_formats() {
        assert_eq!(AudioFormat::from_mime("audio/wav"), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_mime("audio/x-wav"), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_mime("Audio/MPEG; rate=44100"), AudioFormat::Mp3);
        assert_eq!(
            AudioFormat::from_mime("audio/webm;codecs=opus"),
            AudioFormat::Other("audio/webm".to_string())
        );
        assert_eq!(AudioFormat::from_mime("audio/webm").extension(), "webm");
        assert_eq!(AudioFormat::from_mime("mp3").extension(), "mp3");
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = AudioNormalizer::new().normalize(&[], "audio/wav").unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn canonical_wav_passes_through() {
        let wav = wav_bytes(1, SAMPLE_RATE, 0.25);
        let out = AudioNormalizer::new().normalize(&wav, "audio/wav").unwrap();
        assert_eq!(out, Normalized::Unchanged(wav));
    }

    #[test]
    fn stereo_44k_is_downmixed_and_resampled() {
        let wav = wav_bytes(2, 44100, 0.5);
        let out = AudioNormalizer::new().normalize(&wav, "audio/wav").unwrap();
        assert!(matches!(out, Normalized::Converted(_)));

        let reader = hound::WavReader::new(Cursor::new(out.bytes())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        // 0.5s at 16kHz, allow rounding slack
        let len = reader.len();
        assert!((7990..=8010).contains(&len), "unexpected length {len}");
    }

    #[test]
    fn undecodable_input_degrades_to_raw_bytes() {
        let garbage = b"definitely not audio".to_vec();
        for format in ["audio/wav", "audio/mpeg", "audio/webm"] {
            let out = AudioNormalizer::new().normalize(&garbage, format).unwrap();
            assert_eq!(out.bytes(), garbage.as_slice(), "format {format}");
            assert!(out.degradation().is_some(), "format {format}");
        }
    }

    fn wav_frames(sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample(((i % 64) as i16 - 32) * 200).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn absurd_sample_rate_is_not_upsampled() {
        let wav = wav_frames(1, 2000);
        let out = AudioNormalizer::new().normalize(&wav, "audio/wav").unwrap();

        assert!(matches!(out, Normalized::Degraded { .. }));
        assert_eq!(out.bytes().len(), wav.len());
        assert!(out.degradation().unwrap().contains("sample rate"));
    }

    #[test]
    fn oversized_sample_rate_is_rejected() {
        let wav = wav_frames(MAX_INPUT_RATE + 1, 100);
        let out = AudioNormalizer::new().normalize(&wav, "audio/wav").unwrap();
        assert!(out.degradation().is_some());
    }

    #[test]
    fn overlong_audio_is_rejected() {
        assert!(check_bounds(600 * 8000, 8000).is_ok());
        let err = check_bounds(600 * 8000 + 1, 8000).unwrap_err();
        assert!(matches!(err, Error::Audio(_)));
    }

    #[test]
    fn low_rate_wav_within_bounds_converts() {
        let out = AudioNormalizer::new()
            .normalize(&wav_frames(MIN_INPUT_RATE, 800), "audio/wav")
            .unwrap();
        assert!(matches!(out, Normalized::Converted(_)));
    }

    #[test]
    fn normalizes_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, wav_bytes(1, 8000, 0.25)).unwrap();

        let out = AudioNormalizer::new().normalize_file(&path, "audio/wav").unwrap();
        assert!(AudioNormalizer::is_canonical(out.bytes()));
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }
}
