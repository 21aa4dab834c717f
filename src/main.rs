use anyhow::{Context as _, bail};
use dotenvy::dotenv;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod audio;
mod diarize;
mod preflight;
mod settings;
mod source;
mod transcribe;
mod transcript;
mod worker;

use diarize::{DecisionHandler, DiarizationError, FinalChoice, PrimaryChoice, PyannoteRunner};
use settings::{Settings, SettingsStore, SharedSettings};
use source::{SourceResolver, YtDlpDownloader};
use transcribe::{WhisperSize, WhisperTranscriber};
use worker::{Job, JobOptions, TranscriptionWorker};

const USAGE: &str = "\
Usage: scriven [OPTIONS] <INPUT>...

Turn local media files or YouTube URLs into text transcripts.

Options:
  --timestamps        Prefix each line with [start - end] timestamps
  --diarize           Attempt speaker diarization (needs a HuggingFace token)
  --model <SIZE>      Whisper model: tiny, base, small, medium, large
  --output-dir <DIR>  Where transcripts are written
  -h, --help          Show this help";

#[derive(Debug, Default)]
struct CliArgs {
    inputs: Vec<String>,
    timestamps: bool,
    diarize: bool,
    model: Option<String>,
    output_dir: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--timestamps" => cli.timestamps = true,
            "--diarize" => cli.diarize = true,
            "--model" => {
                cli.model = Some(args.next().ok_or("--model requires a value")?);
            }
            "--output-dir" => {
                cli.output_dir = Some(PathBuf::from(
                    args.next().ok_or("--output-dir requires a value")?,
                ));
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {}", other));
            }
            _ => cli.inputs.push(arg),
        }
    }

    Ok(cli)
}

/// Console renderer for worker callbacks. Terminal callbacks are forwarded
/// so main can wait for the batch to drain.
struct ConsoleEvents {
    tx: mpsc::UnboundedSender<bool>,
}

impl ConsoleEvents {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<bool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl worker::EventSink for ConsoleEvents {
    fn on_status(&self, text: &str) {
        println!("{}", text);
    }

    fn on_error(&self, text: &str) {
        eprintln!("Error: {}", text);
        let _ = self.tx.send(false);
    }

    fn on_complete(&self, output_path: &Path) {
        println!("Saved transcript: {}", output_path.display());
        let _ = self.tx.send(true);
    }

    fn log(&self, text: &str) {
        debug!("{}", text);
    }
}

/// Interactive stdin prompt for diarization failures.
struct ConsolePrompt;

fn read_choice() -> Option<String> {
    print!("> ");
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn print_hint(error: &DiarizationError) {
    match error {
        DiarizationError::Auth(_) | DiarizationError::GatedModel(_) => {
            println!(
                "Hint: accept the terms of the diarization models on HuggingFace \
                 and make sure your token has read access."
            );
        }
        DiarizationError::Connectivity(_) => {
            println!("Hint: check your internet connection.");
        }
        _ => {}
    }
}

impl DecisionHandler for ConsolePrompt {
    fn on_primary_failure(&self, error: &DiarizationError) -> PrimaryChoice {
        println!("\nDiarization failed: {}", error);
        print_hint(error);
        println!("  [1] Continue without diarization");
        println!("  [2] Try alternative method");
        println!("  [3] Cancel transcription");

        loop {
            match read_choice().as_deref() {
                Some("1") => return PrimaryChoice::ContinueWithout,
                Some("2") => return PrimaryChoice::TryAlternative,
                Some("3") | None => return PrimaryChoice::CancelJob,
                Some(_) => println!("Please enter 1, 2 or 3."),
            }
        }
    }

    fn on_alternative_failure(&self, error: &DiarizationError) -> FinalChoice {
        println!("\nAlternative diarization also failed: {}", error);
        println!("  [1] Continue without diarization");
        println!("  [2] Cancel transcription");

        loop {
            match read_choice().as_deref() {
                Some("1") => return FinalChoice::ContinueWithout,
                Some("2") | None => return FinalChoice::CancelJob,
                Some(_) => println!("Please enter 1 or 2."),
            }
        }
    }
}

/// Transcript destination for one input.
fn derive_output_path(input: &str, output_dir: &Path, index: usize) -> PathBuf {
    if source::is_remote_reference(input) {
        let stamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
        output_dir.join(format!("transcript_{}_{}.txt", stamp, index + 1))
    } else {
        let stem = Path::new(input)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("transcript");
        output_dir.join(format!("{}.txt", stem))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if cli.inputs.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    let settings_file = settings::settings_path();
    let mut settings = Settings::load(&settings_file);
    if cli.timestamps {
        settings.include_timestamps = true;
    }
    if cli.diarize {
        settings.use_diarization = true;
    }
    if let Some(model) = &cli.model {
        settings.model_size = model.clone();
    }

    let shared = SharedSettings::new(settings);
    let store: Arc<dyn SettingsStore> = Arc::new(shared.clone());

    let model_size: WhisperSize = store
        .model_size()
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let snapshot = shared.snapshot();
    let options = JobOptions {
        include_timestamps: snapshot.include_timestamps,
        diarize: snapshot.use_diarization,
    };

    let output_dir = cli
        .output_dir
        .clone()
        .or_else(|| {
            let dir = snapshot.output_directory.trim();
            (!dir.is_empty()).then(|| PathBuf::from(dir))
        })
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    // Early warnings; the worker itself just fails the job if a tool is gone
    if !preflight::ffmpeg_available() {
        warn!("ffmpeg not found on PATH; audio conversion will fail");
    }
    if cli.inputs.iter().any(|i| source::is_remote_reference(i)) && !preflight::ytdlp_available() {
        warn!("yt-dlp not found on PATH; URL inputs will fail");
    }
    let diarizer = PyannoteRunner::from_env();
    if options.diarize && !diarizer.is_available() {
        warn!("diarization runner unavailable; speaker labels may fail");
    }

    let (events, mut terminals) = ConsoleEvents::new();
    let resolver = SourceResolver::new(Arc::new(YtDlpDownloader::new()));
    let (handle, worker_loop) = TranscriptionWorker::new(
        resolver,
        Arc::new(WhisperTranscriber::new(model_size)),
        Arc::new(diarizer),
        Arc::new(ConsolePrompt),
        store,
        events,
    );
    let worker_task = tokio::spawn(worker_loop.run());

    let total = cli.inputs.len();
    for (index, input) in cli.inputs.iter().enumerate() {
        let output_path = derive_output_path(input, &output_dir, index);
        info!("Queued {} -> {}", input, output_path.display());
        handle.enqueue(Job {
            input: input.clone(),
            output_path,
            options,
        });
    }

    let mut failures = 0usize;
    for _ in 0..total {
        match terminals.recv().await {
            Some(true) => {}
            Some(false) => failures += 1,
            None => break,
        }
    }

    handle.stop();
    worker_task.await.context("worker task panicked")?;

    for input in &cli.inputs {
        if !source::is_remote_reference(input) {
            shared.update(|s| s.push_recent(input));
        }
    }
    let mut snapshot = shared.snapshot();
    if let Err(e) = snapshot.save(&settings_file) {
        warn!("Failed to save settings: {}", e);
    }

    if failures > 0 {
        bail!("{} of {} jobs failed", failures, total);
    }
    Ok(())
}
