//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_gateway::audio::samples_to_wav;
use parley_gateway::services::{
    RecognitionClient, Recognizer, RetryPolicy, ServiceClients, SynthesisClient, Synthesizer,
    TranslationClient, Translator,
};
use parley_gateway::{LanguageCode, ScratchDir, ServiceError, SynthesisCache, TranslationPipeline};
use tempfile::TempDir;

/// Translator stub
pub struct StubTranslator {
    reply: Result<Option<String>, ServiceError>,
    calls: AtomicUsize,
}

impl StubTranslator {
    /// Returns the input unchanged
    pub fn identity() -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always returns `text`
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(Some(text.to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always fails with `error`
    pub fn failing(error: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(
        &self,
        text: &str,
        _source: LanguageCode,
        _target: LanguageCode,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(Some(reply)) => Ok(reply.clone()),
            Ok(None) => Ok(text.to_string()),
            Err(e) => Err(e.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "stub-translator"
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Recognizer stub that plays back a script, then keeps failing with `NotUnderstood`
pub struct StubRecognizer {
    script: Mutex<VecDeque<Result<String, ServiceError>>>,
    fallback: ServiceError,
    calls: AtomicUsize,
    mimes: Mutex<Vec<String>>,
    on_call: Mutex<Option<Hook>>,
}

impl StubRecognizer {
    pub fn scripted(script: Vec<Result<String, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: ServiceError::NotUnderstood("no speech".to_string()),
            calls: AtomicUsize::new(0),
            mimes: Mutex::new(Vec::new()),
            on_call: Mutex::new(None),
        })
    }

    /// Always returns `text`
    pub fn replying(text: &str) -> Arc<Self> {
        Self::always(Ok(text.to_string()))
    }

    /// Always fails with `error`
    pub fn failing(error: ServiceError) -> Arc<Self> {
        Self::always(Err(error))
    }

    fn always(reply: Result<String, ServiceError>) -> Arc<Self> {
        let fallback = reply.clone().err().unwrap_or(ServiceError::Unavailable(String::new()));
        Arc::new(Self {
            script: Mutex::new(std::iter::repeat_n(reply, 64).collect()),
            fallback,
            calls: AtomicUsize::new(0),
            mimes: Mutex::new(Vec::new()),
            on_call: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Run `hook` inside every call, before it returns
    pub fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    /// MIME types received, in call order
    pub fn mimes(&self) -> Vec<String> {
        self.mimes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recognizer for StubRecognizer {
    async fn recognize(
        &self,
        _audio: &[u8],
        mime: &str,
        _language: LanguageCode,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mimes.lock().unwrap().push(mime.to_string());
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook();
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(self.fallback.clone()))
    }

    fn name(&self) -> &'static str {
        "stub-recognizer"
    }
}

/// Synthesizer stub
pub struct StubSynthesizer {
    reply: Result<Vec<u8>, ServiceError>,
    calls: AtomicUsize,
}

impl StubSynthesizer {
    /// Always returns `audio`
    pub fn replying(audio: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(audio.to_vec()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always fails with `error`
    pub fn failing(error: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _language: LanguageCode,
    ) -> Result<Vec<u8>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }

    fn name(&self) -> &'static str {
        "stub-synthesizer"
    }
}

/// A pipeline wired to stubs, with its scratch directory
pub struct TestPipeline {
    pub pipeline: Arc<TranslationPipeline>,
    pub translator: Arc<StubTranslator>,
    pub recognizer: Arc<StubRecognizer>,
    pub synthesizer: Arc<StubSynthesizer>,
    pub scratch: TempDir,
}

impl TestPipeline {
    /// Build a pipeline with two immediate attempts per call
    pub fn new(
        translator: Arc<StubTranslator>,
        recognizer: Arc<StubRecognizer>,
        synthesizer: Arc<StubSynthesizer>,
    ) -> Self {
        let policy = RetryPolicy::immediate(2);
        let clients = ServiceClients {
            translator: TranslationClient::new(translator.clone(), policy.clone()),
            recognizer: RecognitionClient::new(recognizer.clone(), policy.clone()),
            synthesizer: SynthesisClient::new(synthesizer.clone(), policy),
        };

        let scratch = tempfile::tempdir().expect("failed to create scratch dir");
        let pipeline = TranslationPipeline::new(
            clients,
            Arc::new(SynthesisCache::new(8, 100)),
            Arc::new(ScratchDir::new(scratch.path())),
        );

        Self {
            pipeline: Arc::new(pipeline),
            translator,
            recognizer,
            synthesizer,
            scratch,
        }
    }

    /// Identity translator, recognizer replying `heard`, synthesizer replying `[1, 2, 3, 4]`
    pub fn hearing(heard: &str) -> Self {
        Self::new(
            StubTranslator::identity(),
            StubRecognizer::replying(heard),
            StubSynthesizer::replying(&[1, 2, 3, 4]),
        )
    }

    /// Files left in the scratch directory
    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Half a second of canonical (mono 16 kHz 16-bit) WAV
pub fn canonical_wav() -> Vec<u8> {
    let samples: Vec<f32> = (0..8000)
        .map(|i| (i as f32 * 0.05).sin() * 0.2)
        .collect();
    samples_to_wav(&samples, 16_000).expect("failed to encode wav")
}
