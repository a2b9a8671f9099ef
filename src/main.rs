//! Record one voice memo from the system microphone and print its transcript.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use voice_memo::audio::cpal_source::{list_input_devices, CpalAudioSource};
use voice_memo::{ClassifiedError, Platform, RecorderCallbacks, RecorderConfig, VoiceRecorder};

#[derive(Debug, Parser)]
#[command(name = "voice-memo", version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/voice-memo/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transcription gateway base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Input device name
    #[arg(long)]
    device: Option<String>,

    /// Treat the capture context as insecure
    #[arg(long)]
    insecure: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_devices {
        for name in list_input_devices() {
            println!("{}", name);
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RecorderConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.stt.endpoint = endpoint;
        config.validate()?;
    }
    let max_secs = config.max_duration_secs;

    let (tx, mut outcomes) = mpsc::unbounded_channel::<Result<String, ClassifiedError>>();
    let error_tx = tx.clone();
    let callbacks = RecorderCallbacks::new(
        move |text| {
            let _ = tx.send(Ok(text));
        },
        move |error| {
            let _ = error_tx.send(Err(error));
        },
    );

    let platform = Platform::new(!cli.insecure)
        .with_audio(Arc::new(CpalAudioSource::with_device_name(cli.device)));
    let recorder = VoiceRecorder::from_config(config, platform, callbacks)?;

    recorder.start_recording().await;
    if !recorder.is_recording() {
        return match outcomes.recv().await {
            Some(Err(error)) => Err(error.into()),
            _ => Err("recording did not start".into()),
        };
    }

    eprintln!("Recording... press Enter to stop (stops on its own after {}s)", max_secs);
    // A detached thread, so an auto-stop does not wait on stdin at exit.
    let (enter_tx, enter) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = enter_tx.send(());
    });

    let finished_early = tokio::select! {
        _ = enter => None,
        outcome = outcomes.recv() => Some(outcome),
    };
    let outcome = match finished_early {
        Some(outcome) => outcome,
        None => {
            recorder.stop_recording().await;
            outcomes.recv().await
        }
    };

    match outcome {
        Some(Ok(text)) => {
            println!("{}", text);
            Ok(())
        }
        Some(Err(error)) => Err(error.into()),
        None => Err("recorder closed without a result".into()),
    }
}
