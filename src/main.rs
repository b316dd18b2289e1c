use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley_gateway::api::ApiServerBuilder;
use parley_gateway::voice::{
    AudioCapture, AudioPlayback, LoopEvent, MicrophoneSource, SpeakerOutput, VoiceLoopConfig,
    VoiceLoopController, calculate_energy,
};
use parley_gateway::{
    Config, LANGUAGES, LanguageCode, ScratchDir, ServiceClients, SynthesisCache,
    TranslationPipeline, TranslationRequest,
};

/// Parley - Speech and text translation gateway
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Translate speech from the microphone continuously
    Listen {
        /// Spoken language (name or code, "auto" to detect)
        #[arg(long)]
        from: Option<String>,
        /// Language to translate into
        #[arg(long)]
        to: Option<String>,
    },
    /// Translate a piece of text once
    Translate {
        /// Text to translate
        text: String,
        /// Source language
        #[arg(long, default_value = "auto")]
        from: String,
        /// Target language
        #[arg(long)]
        to: String,
        /// Write the synthesized MP3 here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List supported languages
    Languages,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley_gateway=info",
        1 => "info,parley_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(port).await,
        Command::Listen { from, to } => listen(from, to).await,
        Command::Translate {
            text,
            from,
            to,
            output,
        } => translate_once(&text, &from, &to, output).await,
        Command::Languages => {
            list_languages();
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker(),
    }
}

/// Build the shared pipeline from configuration
fn build_pipeline(
    config: &Config,
    scratch: Arc<ScratchDir>,
) -> anyhow::Result<Arc<TranslationPipeline>> {
    let clients = ServiceClients::from_config(&config.services)?;
    let cache = Arc::new(SynthesisCache::new(
        config.pipeline.cache_capacity,
        config.pipeline.cache_key_chars,
    ));

    Ok(Arc::new(
        TranslationPipeline::new(clients, cache, scratch)
            .with_max_text_chars(config.pipeline.max_text_chars),
    ))
}

/// Run the HTTP API until ctrl-c
async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load()?;

    let scratch = Arc::new(ScratchDir::new(&config.scratch.dir));
    let pipeline = build_pipeline(&config, Arc::clone(&scratch))?;
    let reaper = scratch.spawn_reaper(config.scratch.reap_interval, config.scratch.max_age);

    let port = port.unwrap_or(config.server.port);
    tracing::info!(port, "starting parley gateway");

    let server = ApiServerBuilder::new(pipeline)
        .port(port)
        .static_dir(config.server.static_dir.clone())
        .build();

    let result = server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await;

    reaper.abort();
    result?;
    Ok(())
}

/// Run the voice loop until ctrl-c or a stop command
#[allow(clippy::future_not_send)]
async fn listen(from: Option<String>, to: Option<String>) -> anyhow::Result<()> {
    let config = Config::load()?;

    let source = LanguageCode::resolve(from.as_deref().unwrap_or(&config.voice.source_lang))?;
    let target =
        LanguageCode::resolve_target(to.as_deref().unwrap_or(&config.voice.target_lang))?;

    let scratch = Arc::new(ScratchDir::new(&config.scratch.dir));
    let pipeline = build_pipeline(&config, Arc::clone(&scratch))?;
    let reaper = scratch.spawn_reaper(config.scratch.reap_interval, config.scratch.max_age);
    let microphone = MicrophoneSource::new()?;
    let speaker = SpeakerOutput::new(config.voice.volume)?;

    let mut loop_config = VoiceLoopConfig::new(source, target);
    loop_config.stop_commands.clone_from(&config.voice.stop_commands);

    let (controller, mut events) =
        VoiceLoopController::new(pipeline, microphone, speaker, loop_config);

    let stop = controller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                LoopEvent::StateChanged(state) => tracing::debug!(%state, "voice loop state"),
                LoopEvent::Recognized(text) => println!("> {text}"),
                LoopEvent::Translated {
                    translated_text, ..
                } => println!("< {translated_text}"),
                LoopEvent::Warning(message) => println!("! {message}"),
                LoopEvent::Failed { kind, message } => println!("! {kind:?}: {message}"),
            }
        }
    });

    println!(
        "Listening ({} -> {}). Say \"{}\" or press ctrl-c to stop.",
        source.name(),
        target.name(),
        config.voice.stop_commands.first().map_or("stop", String::as_str)
    );

    let final_state = controller.run().await;
    let _ = printer.await;
    reaper.abort();

    tracing::info!(state = %final_state, "voice loop finished");
    Ok(())
}

/// Translate text once and print the result
async fn translate_once(
    text: &str,
    from: &str,
    to: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let pipeline = build_pipeline(&config, Arc::new(ScratchDir::new(&config.scratch.dir)))?;

    let request = TranslationRequest::new(text, from, to, pipeline.max_text_chars())?;
    let result = pipeline.translate_text(request).await?;

    println!("{}", result.translated_text);
    for warning in &result.degradations {
        eprintln!("warning: {warning}");
    }

    if let Some(path) = output {
        match &result.audio {
            Some(audio) => {
                tokio::fs::write(&path, audio.as_slice()).await?;
                eprintln!("wrote {} bytes to {}", audio.len(), path.display());
            }
            None => anyhow::bail!("no audio was synthesized"),
        }
    }

    Ok(())
}

/// Print the supported languages
fn list_languages() {
    println!("{:<12} CODE", "LANGUAGE");
    for language in LANGUAGES {
        println!("{:<12} {}", language.name, language.code);
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;
    playback.play_tone(440.0, Duration::from_secs(2))?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: aplay -l (to list devices)");
    println!("  2. Check the system output volume");

    Ok(())
}
