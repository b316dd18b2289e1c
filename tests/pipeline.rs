//! Translation pipeline integration tests
//!
//! Runs the pipeline against in-process service stubs

use parley_gateway::pipeline::{Degradation, TranscriptionRequest, TranslationRequest};
use parley_gateway::{Error, LanguageCode, ServiceError};

mod common;
use common::{
    StubRecognizer, StubSynthesizer, StubTranslator, TestPipeline, canonical_wav,
};

fn lang(code: &str) -> LanguageCode {
    LanguageCode::resolve(code).unwrap()
}

#[tokio::test]
async fn same_language_translation_returns_text_with_audio() {
    let t = TestPipeline::hearing("unused");

    for text in ["Bonjour le monde", "é", "Ça va? Oui, très bien."] {
        let request = TranslationRequest::new(text, "fr", "fr", 5000).unwrap();
        let result = t.pipeline.translate_text(request).await.unwrap();

        assert_eq!(result.translated_text, text);
        assert_eq!(result.source_text, text);
        assert!(result.audio.is_some());
        assert!(result.degradations.is_empty());
    }
}

#[tokio::test]
async fn whitespace_text_makes_no_calls() {
    let t = TestPipeline::hearing("unused");

    for text in ["", "   ", "\n\t "] {
        let err = TranslationRequest::new(text, "auto", "fr", t.pipeline.max_text_chars())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyText));
    }

    assert_eq!(t.translator.calls(), 0);
    assert_eq!(t.recognizer.calls(), 0);
    assert_eq!(t.synthesizer.calls(), 0);
}

#[tokio::test]
async fn hello_becomes_bonjour_with_audio() {
    let t = TestPipeline::new(
        StubTranslator::replying("Bonjour"),
        StubRecognizer::replying("unused"),
        StubSynthesizer::replying(&[1, 2, 3, 4]),
    );

    let request = TranslationRequest::new("Hello", "en", "fr", 5000).unwrap();
    let result = t.pipeline.translate_text(request).await.unwrap();

    assert_eq!(result.source_text, "Hello");
    assert_eq!(result.translated_text, "Bonjour");
    assert_eq!(result.audio.as_deref().map(Vec::as_slice), Some(&[1u8, 2, 3, 4][..]));
    assert_eq!(t.translator.calls(), 1);
}

#[tokio::test]
async fn unavailable_translator_is_tried_exactly_twice() {
    let t = TestPipeline::new(
        StubTranslator::failing(ServiceError::Unavailable("HTTP 503".into())),
        StubRecognizer::replying("unused"),
        StubSynthesizer::replying(&[1]),
    );

    let request = TranslationRequest::new("Hello", "en", "fr", 5000).unwrap();
    let err = t.pipeline.translate_text(request).await.unwrap_err();

    assert!(matches!(err, Error::Translation(ServiceError::Unavailable(_))));
    assert_eq!(t.translator.calls(), 2);
    assert_eq!(t.synthesizer.calls(), 0);
}

#[tokio::test]
async fn not_understood_is_never_retried() {
    let t = TestPipeline::new(
        StubTranslator::identity(),
        StubRecognizer::failing(ServiceError::NotUnderstood("no speech".into())),
        StubSynthesizer::replying(&[1]),
    );

    let err = t
        .pipeline
        .transcribe(TranscriptionRequest::new(canonical_wav(), "audio/wav"), LanguageCode::AUTO)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Recognition(ServiceError::NotUnderstood(_))));
    assert_eq!(t.recognizer.calls(), 1);
}

#[tokio::test]
async fn synthesis_failure_degrades_to_text_only() {
    let t = TestPipeline::new(
        StubTranslator::replying("Bonjour"),
        StubRecognizer::replying("unused"),
        StubSynthesizer::failing(ServiceError::Unavailable("HTTP 502".into())),
    );

    let request = TranslationRequest::new("Hello", "en", "fr", 5000).unwrap();
    let result = t.pipeline.translate_text(request).await.unwrap();

    assert_eq!(result.translated_text, "Bonjour");
    assert!(result.audio.is_none());
    assert!(matches!(
        result.degradations.as_slice(),
        [Degradation::SynthesisFailed(_)]
    ));
    assert_eq!(t.synthesizer.calls(), 2);
}

#[tokio::test]
async fn repeated_translation_is_synthesized_once() {
    let t = TestPipeline::new(
        StubTranslator::replying("Bonjour"),
        StubRecognizer::replying("unused"),
        StubSynthesizer::replying(&[9, 9]),
    );

    for _ in 0..3 {
        let request = TranslationRequest::new("Hello", "en", "fr", 5000).unwrap();
        let result = t.pipeline.translate_text(request).await.unwrap();
        assert_eq!(result.audio.as_deref().map(Vec::len), Some(2));
    }

    assert_eq!(t.translator.calls(), 3);
    assert_eq!(t.synthesizer.calls(), 1);
    assert_eq!(t.pipeline.cache().len(), 1);
}

#[tokio::test]
async fn concurrent_misses_for_one_key_add_one_entry() {
    let t = TestPipeline::hearing("unused");
    let fr = lang("fr");

    let (a, b) = tokio::join!(
        t.pipeline.speak("Bonjour", fr),
        t.pipeline.speak("Bonjour", fr)
    );

    assert_eq!(a.unwrap().as_slice(), &[1, 2, 3, 4]);
    assert_eq!(b.unwrap().as_slice(), &[1, 2, 3, 4]);
    assert_eq!(t.pipeline.cache().len(), 1);
}

#[tokio::test]
async fn transcription_cleans_up_scratch_files() {
    let t = TestPipeline::hearing("hola");

    let transcription = t
        .pipeline
        .transcribe(TranscriptionRequest::new(canonical_wav(), "audio/wav"), lang("es"))
        .await
        .unwrap();

    assert_eq!(transcription.text, "hola");
    assert!(transcription.degradations.is_empty());
    assert_eq!(t.recognizer.mimes(), vec!["audio/wav".to_string()]);
    assert_eq!(t.scratch_files(), 0);
}

#[tokio::test]
async fn failed_recognition_also_cleans_up_scratch_files() {
    let t = TestPipeline::new(
        StubTranslator::identity(),
        StubRecognizer::failing(ServiceError::Unavailable("down".into())),
        StubSynthesizer::replying(&[1]),
    );

    let result = t
        .pipeline
        .transcribe(TranscriptionRequest::new(canonical_wav(), "audio/wav"), LanguageCode::AUTO)
        .await;

    assert!(result.is_err());
    assert_eq!(t.scratch_files(), 0);
}

#[tokio::test]
async fn undecodable_upload_is_sent_raw_with_warning() {
    let t = TestPipeline::hearing("guten tag");

    let transcription = t
        .pipeline
        .transcribe(
            TranscriptionRequest::new(b"\x1aE\xdf\xa3 not really webm".to_vec(), "audio/webm"),
            lang("de"),
        )
        .await
        .unwrap();

    assert_eq!(transcription.text, "guten tag");
    assert!(matches!(
        transcription.degradations.as_slice(),
        [Degradation::FormatConversion(_)]
    ));
    assert_eq!(t.recognizer.mimes(), vec!["audio/webm".to_string()]);
}

#[tokio::test]
async fn empty_upload_is_rejected_before_recognition() {
    let t = TestPipeline::hearing("unused");

    let err = t
        .pipeline
        .transcribe(TranscriptionRequest::new(Vec::new(), "audio/wav"), LanguageCode::AUTO)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyInput));
    assert_eq!(t.recognizer.calls(), 0);
}

#[tokio::test]
async fn speech_translation_chains_recognition_and_translation() {
    let t = TestPipeline::new(
        StubTranslator::replying("Good morning"),
        StubRecognizer::replying("Buenos días"),
        StubSynthesizer::replying(&[7]),
    );

    let result = t
        .pipeline
        .transcribe_and_translate(
            TranscriptionRequest::new(canonical_wav(), "audio/wav"),
            lang("es"),
            lang("en"),
        )
        .await
        .unwrap();

    assert_eq!(result.source_text, "Buenos días");
    assert_eq!(result.translated_text, "Good morning");
    assert!(result.audio.is_some());
}

#[tokio::test]
async fn speech_translation_rejects_auto_target() {
    let t = TestPipeline::hearing("hello");

    let err = t
        .pipeline
        .transcribe_and_translate(
            TranscriptionRequest::new(canonical_wav(), "audio/wav"),
            LanguageCode::AUTO,
            LanguageCode::AUTO,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedLanguage(_)));
    assert_eq!(t.recognizer.calls(), 0);
}
