//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! Every field is optional; the file overlays the built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfigFile {
    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Request limits and cache sizing
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Remote service backends and retry policy
    #[serde(default)]
    pub services: ServicesFileConfig,

    /// Scratch directory
    #[serde(default)]
    pub scratch: ScratchFileConfig,

    /// Voice loop
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Directory of static web UI assets
    pub static_dir: Option<String>,
}

/// Pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Maximum text length in characters
    pub max_text_chars: Option<usize>,

    /// Number of synthesized clips kept in memory
    pub cache_capacity: Option<usize>,

    /// Leading characters kept in cache keys
    pub cache_key_chars: Option<usize>,
}

/// Remote services configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServicesFileConfig {
    /// Speech recognizer: "google" or "whisper"
    pub recognizer: Option<String>,

    /// Speech synthesizer: "google" or "openai"
    pub synthesizer: Option<String>,

    /// `OpenAI` API key (Whisper and `OpenAI` TTS)
    pub openai_api_key: Option<String>,

    /// Google speech API key
    pub google_speech_key: Option<String>,

    /// Whisper model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// `OpenAI` TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// `OpenAI` TTS voice (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// Speech rate multiplier
    pub tts_speed: Option<f32>,

    /// Attempts per remote call, including the first
    pub max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    pub retry_delay_ms: Option<u64>,

    /// Double the delay after every attempt
    pub exponential_backoff: Option<bool>,

    /// Per-attempt deadline in seconds
    pub timeout_secs: Option<u64>,
}

/// Scratch directory configuration
#[derive(Debug, Default, Deserialize)]
pub struct ScratchFileConfig {
    /// Directory for in-flight uploads
    pub dir: Option<String>,

    /// Age after which orphaned files are deleted, in seconds
    pub max_age_secs: Option<u64>,

    /// How often the reaper runs, in seconds
    pub reap_interval_secs: Option<u64>,
}

/// Voice loop configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Spoken language name or code
    pub source_lang: Option<String>,

    /// Translation language name or code
    pub target_lang: Option<String>,

    /// Phrases that end the loop
    pub stop_commands: Option<Vec<String>>,

    /// Playback volume, 0 to 100
    pub volume: Option<u8>,
}

/// Parse a config file body
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown keys
pub fn parse_config_file(content: &str) -> Result<ParleyConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    let Some(path) = config_file_path() else {
        return ParleyConfigFile::default();
    };

    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match load_config_file_at(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Load a config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file_at(path: &Path) -> Result<ParleyConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config_file(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let fc = parse_config_file("").unwrap();
        assert!(fc.server.port.is_none());
        assert!(fc.voice.stop_commands.is_none());
    }

    #[test]
    fn parses_sections() {
        let fc = parse_config_file(
            r#"
            [server]
            port = 8080

            [services]
            recognizer = "whisper"
            max_attempts = 3

            [voice]
            target_lang = "French"
            stop_commands = ["halt"]
            volume = 40
            "#,
        )
        .unwrap();

        assert_eq!(fc.server.port, Some(8080));
        assert_eq!(fc.services.recognizer.as_deref(), Some("whisper"));
        assert_eq!(fc.services.max_attempts, Some(3));
        assert_eq!(fc.voice.target_lang.as_deref(), Some("French"));
        assert_eq!(fc.voice.stop_commands, Some(vec!["halt".to_string()]));
        assert_eq!(fc.voice.volume, Some(40));
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(parse_config_file("[llm]\nmodel = \"x\"").is_err());
    }

    #[test]
    fn loads_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\ncache_capacity = 7\n").unwrap();

        let fc = load_config_file_at(&path).unwrap();
        assert_eq!(fc.pipeline.cache_capacity, Some(7));
    }
}
