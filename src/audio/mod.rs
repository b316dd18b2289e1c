//! Audio format handling
//!
//! Normalizes uploaded or captured audio into the canonical format the
//! speech recognizer expects: mono, 16 kHz, 16-bit PCM WAV.

mod normalize;

pub use normalize::{AudioFormat, AudioNormalizer, Normalized};
pub(crate) use normalize::{decode_mp3, resample_audio};

use crate::{Error, Result};

/// Sample rate of canonical audio (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Convert f32 samples to mono 16-bit WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Extract raw little-endian 16-bit PCM from canonical WAV bytes
///
/// # Errors
///
/// Returns error if the bytes are not a 16-bit integer WAV
pub fn wav_to_pcm16(wav: &[u8]) -> Result<Vec<u8>> {
    let mut reader =
        hound::WavReader::new(std::io::Cursor::new(wav)).map_err(|e| Error::Audio(e.to_string()))?;

    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(Error::Audio(format!(
            "expected 16-bit PCM, got {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.samples::<i16>() {
        let sample = sample.map_err(|e| Error::Audio(e.to_string()))?;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(pcm)
}
