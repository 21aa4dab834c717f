//! The background transcription loop.
//!
//! One worker task owns the whole pipeline; callers only ever touch the
//! non-blocking [`WorkerHandle`] and the callback sink.

use crate::diarize::{
    DecisionHandler, DiarizationError, DiarizationModel, DiarizationOutcome, DiarizationPipeline,
};
use crate::settings::SettingsStore;
use crate::source::{SourceError, SourceResolver};
use crate::transcribe::{ModelError, TranscriptionModel};
use crate::transcript::{self, RenderOptions};
use crate::worker::events::EventSink;
use crate::worker::scratch::JobScratch;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Bounded wait on the queue so the loop can observe the stop flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-job switches, fixed at enqueue time.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    pub include_timestamps: bool,
    pub diarize: bool,
}

/// One unit of work: an input reference, where the transcript goes, and how
/// to render it. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub output_path: PathBuf,
    pub options: JobOptions,
}

/// Everything that can end a job early. Caught at the job boundary; never
/// propagates out of the worker loop.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Diarization(#[from] DiarizationError),
    #[error("failed to write transcript: {0}")]
    Write(#[from] std::io::Error),
    #[error("transcription cancelled by user")]
    Cancelled,
}

/// Caller-side handle to the queue.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Job>,
    stop: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Append a job to the FIFO. Never blocks; returns false when the
    /// worker has already shut down.
    pub fn enqueue(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }

    /// Ask the loop to exit after its current job. In-flight work is never
    /// interrupted.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

pub struct TranscriptionWorker {
    resolver: SourceResolver,
    transcriber: Arc<dyn TranscriptionModel>,
    diarizer: Arc<dyn DiarizationModel>,
    decisions: Arc<dyn DecisionHandler>,
    settings: Arc<dyn SettingsStore>,
    events: Arc<dyn EventSink>,
    rx: mpsc::UnboundedReceiver<Job>,
    stop: Arc<AtomicBool>,
}

impl TranscriptionWorker {
    pub fn new(
        resolver: SourceResolver,
        transcriber: Arc<dyn TranscriptionModel>,
        diarizer: Arc<dyn DiarizationModel>,
        decisions: Arc<dyn DecisionHandler>,
        settings: Arc<dyn SettingsStore>,
        events: Arc<dyn EventSink>,
    ) -> (WorkerHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = WorkerHandle { tx, stop: stop.clone() };
        let worker = Self {
            resolver,
            transcriber,
            diarizer,
            decisions,
            settings,
            events,
            rx,
            stop,
        };

        (handle, worker)
    }

    /// The worker loop. Runs until stopped or until every handle is gone;
    /// jobs are processed strictly one at a time, in submission order.
    pub async fn run(mut self) {
        info!("Transcription worker started");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested, transcription worker exiting");
                break;
            }

            match timeout(POLL_INTERVAL, self.rx.recv()).await {
                Ok(Some(job)) => self.process_job(job).await,
                Ok(None) => {
                    info!("Job channel closed, transcription worker exiting");
                    break;
                }
                // Poll timeout: go around and re-check the stop flag
                Err(_) => {}
            }
        }
    }

    /// Job boundary: exactly one terminal callback fires, and scratch is
    /// cleaned whichever way the job ends. Cleanup runs before the terminal
    /// callback so no artifact outlives the job from the caller's view.
    async fn process_job(&mut self, job: Job) {
        info!("Processing job: {} -> {}", job.input, job.output_path.display());
        let mut scratch = JobScratch::new();

        let outcome = self.run_pipeline(&job, &mut scratch).await;
        scratch.cleanup(self.events.as_ref());

        match outcome {
            Ok(()) => self.events.on_complete(&job.output_path),
            Err(e) => {
                error!("Job failed: {}", e);
                self.events.log(&format!("Error details: {}", e));
                self.events.on_error(&e.to_string());
            }
        }
    }

    async fn run_pipeline(&self, job: &Job, scratch: &mut JobScratch) -> Result<(), JobError> {
        let source = self
            .resolver
            .resolve(&job.input, scratch, self.events.as_ref())
            .await?;
        if source.is_temp {
            debug!("Working from temp artifact {}", source.path.display());
        }

        self.events.on_status("Transcribing audio...");
        let mut result = self.transcriber.transcribe(&source.path).await?;

        let mut outcome = DiarizationOutcome::Disabled;
        if job.options.diarize {
            self.events.on_status("Processing speaker diarization...");
            let pipeline = DiarizationPipeline::new(
                self.diarizer.clone(),
                self.decisions.clone(),
                self.events.clone(),
            );
            // Credential is read fresh at job start, never cached
            let token = self.settings.hf_token();
            outcome = pipeline
                .run(&mut result, &source.path, token.as_deref(), scratch)
                .await?;
        }

        self.events.on_status("Saving transcript...");
        let render = RenderOptions {
            timestamps: job.options.include_timestamps,
            speakers: outcome == DiarizationOutcome::Succeeded,
        };
        transcript::write_transcript(&result, &job.output_path, render)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diarize::{DiarizationTurn, FinalChoice, PrimaryChoice};
    use crate::source::Downloader;
    use crate::transcript::{Segment, TranscriptionResult};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum Terminal {
        Complete(PathBuf),
        Error(String),
    }

    struct RecordingSink {
        statuses: Mutex<Vec<String>>,
        logs: Mutex<Vec<String>>,
        tx: mpsc::UnboundedSender<Terminal>,
    }

    impl RecordingSink {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Terminal>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let sink = Arc::new(Self {
                statuses: Mutex::new(Vec::new()),
                logs: Mutex::new(Vec::new()),
                tx,
            });
            (sink, rx)
        }

        fn logged_download_path(&self) -> Option<PathBuf> {
            self.logs
                .lock()
                .unwrap()
                .iter()
                .find_map(|l| l.strip_prefix("Download completed: ").map(PathBuf::from))
        }
    }

    impl EventSink for RecordingSink {
        fn on_status(&self, text: &str) {
            self.statuses.lock().unwrap().push(text.to_string());
        }
        fn on_error(&self, text: &str) {
            let _ = self.tx.send(Terminal::Error(text.to_string()));
        }
        fn on_complete(&self, output_path: &Path) {
            let _ = self.tx.send(Terminal::Complete(output_path.to_path_buf()));
        }
        fn log(&self, text: &str) {
            self.logs.lock().unwrap().push(text.to_string());
        }
    }

    struct FakeTranscriber {
        fail: bool,
    }

    #[async_trait]
    impl TranscriptionModel for FakeTranscriber {
        async fn transcribe(&self, _audio: &Path) -> Result<TranscriptionResult, ModelError> {
            if self.fail {
                return Err(ModelError::Inference("decode failed".into()));
            }
            Ok(TranscriptionResult::from_segments(vec![
                Segment::new(0.0, 1.0, "hi"),
                Segment::new(1.0, 2.0, "there"),
            ]))
        }
    }

    struct FakeDiarizer {
        response: Result<Vec<DiarizationTurn>, DiarizationError>,
    }

    #[async_trait]
    impl DiarizationModel for FakeDiarizer {
        async fn run(
            &self,
            _audio: &Path,
            _token: &str,
        ) -> Result<Vec<DiarizationTurn>, DiarizationError> {
            self.response.clone()
        }
    }

    struct FixedChoice {
        primary: PrimaryChoice,
    }

    impl DecisionHandler for FixedChoice {
        fn on_primary_failure(&self, _error: &DiarizationError) -> PrimaryChoice {
            self.primary
        }
        fn on_alternative_failure(&self, _error: &DiarizationError) -> FinalChoice {
            FinalChoice::CancelJob
        }
    }

    struct TestSettings {
        token: Option<&'static str>,
    }

    impl SettingsStore for TestSettings {
        fn hf_token(&self) -> Option<String> {
            self.token.map(str::to_string)
        }
        fn model_size(&self) -> String {
            "base".to_string()
        }
    }

    /// Downloader that either fails or drops an mp3 next to the stem.
    struct StubDownloader {
        fail: bool,
    }

    #[async_trait]
    impl Downloader for StubDownloader {
        async fn fetch(
            &self,
            _url: &str,
            output_stem: &Path,
            _events: &dyn EventSink,
        ) -> Result<(), SourceError> {
            if self.fail {
                return Err(SourceError::Download("network unreachable".into()));
            }
            let mut name = output_stem.as_os_str().to_os_string();
            name.push(".mp3");
            std::fs::write(PathBuf::from(name), b"audio").map_err(SourceError::Io)
        }
    }

    struct WorkerFixture {
        handle: WorkerHandle,
        sink: Arc<RecordingSink>,
        terminals: mpsc::UnboundedReceiver<Terminal>,
        task: tokio::task::JoinHandle<()>,
        dir: tempfile::TempDir,
    }

    fn spawn_worker(
        download_fails: bool,
        transcriber_fails: bool,
        diarizer: FakeDiarizer,
        primary: PrimaryChoice,
        token: Option<&'static str>,
    ) -> WorkerFixture {
        let (sink, terminals) = RecordingSink::new();
        let resolver = SourceResolver::new(Arc::new(StubDownloader { fail: download_fails }));
        let (handle, worker) = TranscriptionWorker::new(
            resolver,
            Arc::new(FakeTranscriber { fail: transcriber_fails }),
            Arc::new(diarizer),
            Arc::new(FixedChoice { primary }),
            Arc::new(TestSettings { token }),
            sink.clone(),
        );
        let task = tokio::spawn(worker.run());
        let dir = tempfile::tempdir().unwrap();
        WorkerFixture { handle, sink, terminals, task, dir }
    }

    impl WorkerFixture {
        /// 16 kHz mono WAV so diarization jobs skip the ffmpeg path.
        fn input_wav(&self) -> PathBuf {
            let path = self.dir.path().join("input.wav");
            let mut writer = hound::WavWriter::create(
                &path,
                hound::WavSpec {
                    channels: 1,
                    sample_rate: 16_000,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                },
            )
            .unwrap();
            for _ in 0..160 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
            path
        }

        fn output(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn job(&self, input: &Path, output: &str, options: JobOptions) -> Job {
            Job {
                input: input.to_string_lossy().into_owned(),
                output_path: self.output(output),
                options,
            }
        }

        async fn shutdown(mut self) {
            self.handle.stop();
            self.terminals.close();
            self.task.await.unwrap();
        }
    }

    fn ok_diarizer() -> FakeDiarizer {
        FakeDiarizer {
            response: Ok(vec![DiarizationTurn {
                start: 0.0,
                end: 2.5,
                speaker: "SPEAKER_00".to_string(),
            }]),
        }
    }

    fn failing_diarizer() -> FakeDiarizer {
        FakeDiarizer {
            response: Err(DiarizationError::GatedModel("accept the model terms".into())),
        }
    }

    #[tokio::test]
    async fn plain_job_writes_expected_output() {
        let mut fx = spawn_worker(false, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(&input, "out.txt", JobOptions::default()));

        let terminal = fx.terminals.recv().await.unwrap();
        assert_eq!(terminal, Terminal::Complete(fx.output("out.txt")));
        assert_eq!(std::fs::read_to_string(fx.output("out.txt")).unwrap(), "hi\nthere\n");

        let statuses = fx.sink.statuses.lock().unwrap().clone();
        assert!(statuses.iter().any(|s| s == "Transcribing audio..."));
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn successful_diarization_groups_speakers() {
        let mut fx = spawn_worker(
            false,
            false,
            ok_diarizer(),
            PrimaryChoice::CancelJob,
            Some("hf_token"),
        );
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(
            &input,
            "out.txt",
            JobOptions { include_timestamps: false, diarize: true },
        ));

        let terminal = fx.terminals.recv().await.unwrap();
        assert!(matches!(terminal, Terminal::Complete(_)));

        let text = std::fs::read_to_string(fx.output("out.txt")).unwrap();
        assert_eq!(text, "SPEAKER 1\nhi\nthere\n");
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn degraded_diarization_completes_without_headers() {
        let mut fx = spawn_worker(
            false,
            false,
            failing_diarizer(),
            PrimaryChoice::ContinueWithout,
            Some("hf_token"),
        );
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(
            &input,
            "out.txt",
            JobOptions { include_timestamps: false, diarize: true },
        ));

        let terminal = fx.terminals.recv().await.unwrap();
        assert!(matches!(terminal, Terminal::Complete(_)));

        let text = std::fs::read_to_string(fx.output("out.txt")).unwrap();
        assert!(!text.contains("SPEAKER"));
        assert_eq!(text, "hi\nthere\n");
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_choice_fails_job_but_queue_continues() {
        let mut fx = spawn_worker(
            false,
            false,
            failing_diarizer(),
            PrimaryChoice::CancelJob,
            Some("hf_token"),
        );
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(
            &input,
            "cancelled.txt",
            JobOptions { include_timestamps: false, diarize: true },
        ));
        fx.handle.enqueue(fx.job(&input, "next.txt", JobOptions::default()));

        match fx.terminals.recv().await.unwrap() {
            Terminal::Error(msg) => assert!(msg.contains("cancelled")),
            other => panic!("expected error terminal, got {:?}", other),
        }
        assert_eq!(
            fx.terminals.recv().await.unwrap(),
            Terminal::Complete(fx.output("next.txt"))
        );
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn missing_token_aborts_diarization_job() {
        let mut fx = spawn_worker(false, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(
            &input,
            "out.txt",
            JobOptions { include_timestamps: false, diarize: true },
        ));

        match fx.terminals.recv().await.unwrap() {
            Terminal::Error(msg) => assert!(msg.contains("token")),
            other => panic!("expected error terminal, got {:?}", other),
        }
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn download_failure_reports_error_and_next_job_runs() {
        let mut fx = spawn_worker(true, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        fx.handle.enqueue(Job {
            input: "https://youtu.be/abc".to_string(),
            output_path: fx.output("remote.txt"),
            options: JobOptions::default(),
        });
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(&input, "local.txt", JobOptions::default()));

        match fx.terminals.recv().await.unwrap() {
            Terminal::Error(msg) => assert!(msg.contains("download failed")),
            other => panic!("expected error terminal, got {:?}", other),
        }
        assert_eq!(
            fx.terminals.recv().await.unwrap(),
            Terminal::Complete(fx.output("local.txt"))
        );
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn downloaded_temp_artifact_is_cleaned_on_success() {
        let mut fx = spawn_worker(false, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        fx.handle.enqueue(Job {
            input: "https://youtu.be/abc".to_string(),
            output_path: fx.output("remote.txt"),
            options: JobOptions::default(),
        });

        assert!(matches!(fx.terminals.recv().await.unwrap(), Terminal::Complete(_)));
        let downloaded = fx.sink.logged_download_path().expect("download path logged");
        assert!(!downloaded.exists());
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn downloaded_temp_artifact_is_cleaned_on_failure() {
        let mut fx = spawn_worker(false, true, ok_diarizer(), PrimaryChoice::CancelJob, None);
        fx.handle.enqueue(Job {
            input: "https://youtu.be/abc".to_string(),
            output_path: fx.output("remote.txt"),
            options: JobOptions::default(),
        });

        match fx.terminals.recv().await.unwrap() {
            Terminal::Error(msg) => assert!(msg.contains("decode failed")),
            other => panic!("expected error terminal, got {:?}", other),
        }
        let downloaded = fx.sink.logged_download_path().expect("download path logged");
        assert!(!downloaded.exists());
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn jobs_complete_in_submission_order() {
        let mut fx = spawn_worker(false, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        let input = fx.input_wav();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fx.handle.enqueue(fx.job(&input, name, JobOptions::default()));
        }

        for name in ["a.txt", "b.txt", "c.txt"] {
            assert_eq!(
                fx.terminals.recv().await.unwrap(),
                Terminal::Complete(fx.output(name))
            );
        }
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let fx = spawn_worker(false, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        fx.handle.stop();
        // run() observes the flag within one poll interval
        fx.shutdown().await;
    }

    #[tokio::test]
    async fn timestamped_output_uses_two_decimal_prefixes() {
        let mut fx = spawn_worker(false, false, ok_diarizer(), PrimaryChoice::CancelJob, None);
        let input = fx.input_wav();
        fx.handle.enqueue(fx.job(
            &input,
            "out.txt",
            JobOptions { include_timestamps: true, diarize: false },
        ));

        assert!(matches!(fx.terminals.recv().await.unwrap(), Terminal::Complete(_)));
        let text = std::fs::read_to_string(fx.output("out.txt")).unwrap();
        assert_eq!(text, "[0.00s - 1.00s] hi\n[1.00s - 2.00s] there\n");
        fx.shutdown().await;
    }
}
