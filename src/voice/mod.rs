//! Voice mode
//!
//! Microphone capture, utterance segmentation, speaker playback and the
//! controller that runs the translation pipeline continuously.

mod capture;
mod controller;
mod playback;
mod segmenter;
mod source;

pub use capture::AudioCapture;
pub use controller::{
    DEFAULT_STOP_COMMANDS, LoopEvent, LoopState, StopHandle, VoiceLoopConfig, VoiceLoopController,
    is_stop_command,
};
pub use playback::AudioPlayback;
pub use segmenter::{SegmenterState, SpeechSegmenter, calculate_energy};
pub use source::{AudioSource, MicrophoneSource, SpeakerOutput, SpeechOutput};
