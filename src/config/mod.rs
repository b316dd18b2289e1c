//! Configuration management for Parley gateway
//!
//! Values are layered: environment variables override the TOML file, which
//! overrides the defaults below.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_KEY_PREFIX_CHARS};
use crate::pipeline::DEFAULT_MAX_TEXT_CHARS;
use crate::services::RetryPolicy;
use crate::voice::DEFAULT_STOP_COMMANDS;
use crate::{Error, Result};

use file::ParleyConfigFile;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5000;

/// Parley gateway configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server
    pub server: ServerConfig,

    /// Request limits and cache sizing
    pub pipeline: PipelineConfig,

    /// Remote service backends
    pub services: ServicesConfig,

    /// Scratch files
    pub scratch: ScratchConfig,

    /// Voice loop
    pub voice: VoiceConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum text length in characters
    pub max_text_chars: usize,

    /// Synthesized clips kept in memory
    pub cache_capacity: usize,

    /// Leading characters kept readable in cache keys
    pub cache_key_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            cache_capacity: DEFAULT_CAPACITY,
            cache_key_chars: DEFAULT_KEY_PREFIX_CHARS,
        }
    }
}

/// Speech recognition backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizerKind {
    /// Google speech endpoint
    #[default]
    Google,
    /// `OpenAI` Whisper
    Whisper,
}

impl FromStr for RecognizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "whisper" | "openai" => Ok(Self::Whisper),
            other => Err(Error::Config(format!("unknown recognizer: {other}"))),
        }
    }
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesizerKind {
    /// Google Translate speech endpoint
    #[default]
    Google,
    /// `OpenAI` TTS
    OpenAI,
}

impl FromStr for SynthesizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown synthesizer: {other}"))),
        }
    }
}

/// Remote service configuration
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Speech recognizer
    pub recognizer: RecognizerKind,

    /// Speech synthesizer
    pub synthesizer: SynthesizerKind,

    /// `OpenAI` API key (Whisper and `OpenAI` TTS)
    pub openai_api_key: Option<String>,

    /// Google speech API key
    pub google_speech_key: Option<String>,

    /// Whisper model
    pub stt_model: String,

    /// `OpenAI` TTS model
    pub tts_model: String,

    /// `OpenAI` TTS voice
    pub tts_voice: String,

    /// Speech rate multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Attempts per remote call, including the first
    pub max_attempts: u32,

    /// Delay between attempts
    pub retry_delay: Duration,

    /// Double the delay after every attempt
    pub exponential_backoff: bool,

    /// Per-attempt deadline
    pub call_timeout: Duration,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            recognizer: RecognizerKind::default(),
            synthesizer: SynthesizerKind::default(),
            openai_api_key: None,
            google_speech_key: None,
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            max_attempts: policy.max_attempts,
            retry_delay: policy.base_delay,
            exponential_backoff: policy.exponential,
            call_timeout: policy.attempt_timeout,
        }
    }
}

impl ServicesConfig {
    /// Retry policy shared by all service clients
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: self.retry_delay,
            exponential: self.exponential_backoff,
            attempt_timeout: self.call_timeout,
            ..RetryPolicy::default()
        }
    }
}

/// Scratch directory configuration
#[derive(Debug, Clone)]
pub struct ScratchConfig {
    /// Directory for in-flight uploads
    pub dir: PathBuf,

    /// Age after which orphaned files are deleted
    pub max_age: Duration,

    /// How often the reaper runs
    pub reap_interval: Duration,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: default_scratch_dir(),
            max_age: Duration::from_secs(600),
            reap_interval: Duration::from_secs(300),
        }
    }
}

/// Default scratch directory: `~/.cache/parley/scratch/`
fn default_scratch_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || std::env::temp_dir().join("parley"),
        |d| d.cache_dir().join("parley").join("scratch"),
    )
}

/// Voice loop configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Spoken language name or code (`auto` allowed)
    pub source_lang: String,

    /// Translation language name or code
    pub target_lang: String,

    /// Phrases that end the loop
    pub stop_commands: Vec<String>,

    /// Playback volume, 0 to 100
    pub volume: u8,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            source_lang: "auto".to_string(),
            target_lang: "en".to_string(),
            stop_commands: DEFAULT_STOP_COMMANDS.iter().map(ToString::to_string).collect(),
            volume: 100,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the default config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric value is invalid
    pub fn from_sources(
        fc: ParleyConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        // Server (env > toml > default)
        let server = ServerConfig {
            port: parse_env(&env, "PARLEY_PORT")?
                .or(parse_env(&env, "PORT")?)
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
            static_dir: env("PARLEY_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let pipeline = PipelineConfig {
            max_text_chars: parse_env(&env, "PARLEY_MAX_TEXT_CHARS")?
                .or(fc.pipeline.max_text_chars)
                .unwrap_or(defaults.pipeline.max_text_chars),
            cache_capacity: parse_env(&env, "PARLEY_CACHE_CAPACITY")?
                .or(fc.pipeline.cache_capacity)
                .unwrap_or(defaults.pipeline.cache_capacity),
            cache_key_chars: fc
                .pipeline
                .cache_key_chars
                .unwrap_or(defaults.pipeline.cache_key_chars),
        };

        if pipeline.max_text_chars == 0 {
            return Err(Error::Config("max_text_chars must be positive".to_string()));
        }

        let fs = fc.services;
        let ds = defaults.services;
        let services = ServicesConfig {
            recognizer: env("PARLEY_RECOGNIZER")
                .or(fs.recognizer)
                .map(|s| s.parse::<RecognizerKind>())
                .transpose()?
                .unwrap_or(ds.recognizer),
            synthesizer: env("PARLEY_SYNTHESIZER")
                .or(fs.synthesizer)
                .map(|s| s.parse::<SynthesizerKind>())
                .transpose()?
                .unwrap_or(ds.synthesizer),
            openai_api_key: env("OPENAI_API_KEY").or(fs.openai_api_key),
            google_speech_key: env("PARLEY_GOOGLE_SPEECH_KEY").or(fs.google_speech_key),
            stt_model: env("PARLEY_STT_MODEL")
                .or(fs.stt_model)
                .unwrap_or(ds.stt_model),
            tts_model: env("PARLEY_TTS_MODEL")
                .or(fs.tts_model)
                .unwrap_or(ds.tts_model),
            tts_voice: env("PARLEY_TTS_VOICE")
                .or(fs.tts_voice)
                .unwrap_or(ds.tts_voice),
            tts_speed: parse_env(&env, "PARLEY_TTS_SPEED")?
                .or(fs.tts_speed)
                .unwrap_or(ds.tts_speed)
                .clamp(0.25, 4.0),
            max_attempts: parse_env(&env, "PARLEY_MAX_ATTEMPTS")?
                .or(fs.max_attempts)
                .unwrap_or(ds.max_attempts)
                .max(1),
            retry_delay: parse_env(&env, "PARLEY_RETRY_DELAY_MS")?
                .or(fs.retry_delay_ms)
                .map_or(ds.retry_delay, Duration::from_millis),
            exponential_backoff: fs.exponential_backoff.unwrap_or(ds.exponential_backoff),
            call_timeout: parse_env(&env, "PARLEY_TIMEOUT_SECS")?
                .or(fs.timeout_secs)
                .map_or(ds.call_timeout, Duration::from_secs),
        };

        let scratch = ScratchConfig {
            dir: env("PARLEY_SCRATCH_DIR")
                .or(fc.scratch.dir)
                .map_or(defaults.scratch.dir, PathBuf::from),
            max_age: fc
                .scratch
                .max_age_secs
                .map_or(defaults.scratch.max_age, Duration::from_secs),
            reap_interval: fc
                .scratch
                .reap_interval_secs
                .map_or(defaults.scratch.reap_interval, Duration::from_secs),
        };

        let voice = VoiceConfig {
            source_lang: env("PARLEY_SOURCE_LANG")
                .or(fc.voice.source_lang)
                .unwrap_or(defaults.voice.source_lang),
            target_lang: env("PARLEY_TARGET_LANG")
                .or(fc.voice.target_lang)
                .unwrap_or(defaults.voice.target_lang),
            stop_commands: fc
                .voice
                .stop_commands
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.voice.stop_commands),
            volume: parse_env(&env, "PARLEY_VOLUME")?
                .or(fc.voice.volume)
                .unwrap_or(defaults.voice.volume)
                .min(100),
        };

        Ok(Self {
            server,
            pipeline,
            services,
            scratch,
            voice,
        })
    }
}

/// Parse an optional environment variable
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}")))
        })
        .transpose()
}
