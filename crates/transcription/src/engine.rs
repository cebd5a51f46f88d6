use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::asr::RecognizerFactory;
use crate::audio::{self, AudioBuffer};
use crate::config::TranscriptionConfig;
use crate::dispatcher::{ChunkFailure, Dispatcher, ProgressEvent};
use crate::error::{TranscribeError, TranscribeResult};
use crate::pool::{DeviceMode, WorkerPool};
use crate::segment::SegmentOptimizer;
use crate::session::Session;
use crate::vad::SpeechDetector;
use crate::worker::{DeviceId, ModelConfig};
use crate::{normalize_language, TaskKind, TranscriptSegment, SAMPLE_RATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptOutcome {
    /// At least one chunk produced a result.
    Transcribed,
    /// Nothing recognizable: no speech, or only chunks too short to recognize.
    NoSpeech,
    /// Speech was found but every recognized chunk failed.
    AllFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptStats {
    /// None when no session was needed.
    pub session_id: Option<String>,
    pub device_mode: DeviceMode,
    pub devices: Vec<DeviceId>,
    pub chunk_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub segment_count: usize,
    pub audio_duration_secs: f64,
    pub elapsed_secs: f64,
    /// Seconds of audio per second of wall time.
    pub realtime_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub stats: TranscriptStats,
    pub outcome: TranscriptOutcome,
    pub failures: Vec<ChunkFailure>,
}

/// A progress event tagged with the session it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session_id: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Long-audio transcription: VAD, chunking, and parallel recognition on
/// pooled workers.
///
/// Created once at startup and shared via `Arc`. Every call runs in its own
/// [`Session`].
pub struct TranscriptionService {
    config: TranscriptionConfig,
    model: ModelConfig,
    pool: WorkerPool,
    detector: Arc<dyn SpeechDetector>,
    optimizer: SegmentOptimizer,
    progress_tx: broadcast::Sender<SessionProgress>,
}

impl TranscriptionService {
    pub fn new(
        config: TranscriptionConfig,
        factory: Arc<dyn RecognizerFactory>,
        detector: Arc<dyn SpeechDetector>,
    ) -> TranscribeResult<Self> {
        config.validate()?;
        let optimizer = SegmentOptimizer::new(config.min_chunk_secs, config.max_chunk_secs)?;
        let pool = WorkerPool::new(config.pool_config(), factory)?;
        let (progress_tx, _) = broadcast::channel(256);

        info!(
            model = %config.model_config(),
            devices = ?config.device_ids,
            detector = detector.name(),
            "Transcription service created"
        );

        Ok(Self {
            model: config.model_config(),
            config,
            pool,
            detector,
            optimizer,
            progress_tx,
        })
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Returns a new receiver for per-chunk progress across all sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionProgress> {
        self.progress_tx.subscribe()
    }

    /// Transcribes a WAV file.
    ///
    /// `language` of `None` falls back to the configured default; `"auto"` forces detection.
    pub async fn transcribe_file(
        &self,
        path: &Path,
        language: Option<&str>,
        task: TaskKind,
        use_multi_device: bool,
    ) -> TranscribeResult<Transcript> {
        let started = Instant::now();
        let path_buf = path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || audio::load_wav(&path_buf))
            .await
            .map_err(|e| TranscribeError::Audio(format!("Audio loader task failed: {}", e)))??;

        info!(path = %path.display(), duration_secs = audio.duration_secs(), "Audio loaded");
        self.run(audio, language, task, use_multi_device, started).await
    }

    /// Transcribes in-memory mono audio at any sample rate.
    pub async fn transcribe_samples(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        language: Option<&str>,
        task: TaskKind,
        use_multi_device: bool,
    ) -> TranscribeResult<Transcript> {
        let started = Instant::now();
        let audio = AudioBuffer::new(samples, sample_rate);
        let audio = if audio.sample_rate == SAMPLE_RATE {
            audio
        } else {
            tokio::task::spawn_blocking(move || audio.into_sample_rate(SAMPLE_RATE))
                .await
                .map_err(|e| TranscribeError::Audio(format!("Resampler task failed: {}", e)))??
        };
        self.run(audio, language, task, use_multi_device, started).await
    }

    /// Retires idle workers and refuses new work.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    async fn run(
        &self,
        audio: AudioBuffer,
        language: Option<&str>,
        task: TaskKind,
        use_multi_device: bool,
        started: Instant,
    ) -> TranscribeResult<Transcript> {
        let mode = if use_multi_device {
            DeviceMode::Multi
        } else {
            DeviceMode::Single
        };
        let language = match language {
            Some(requested) => normalize_language(Some(requested)),
            None => normalize_language(self.config.language.as_deref()),
        };
        let audio_duration = audio.duration_secs();

        let detector = self.detector.clone();
        let (audio, detected) = tokio::task::spawn_blocking(move || {
            let detected = detector.detect_speech(&audio.samples, audio.sample_rate);
            (audio, detected)
        })
        .await
        .map_err(|e| TranscribeError::Vad(format!("Detector task failed: {}", e)))?;
        let intervals = detected.map_err(|e| TranscribeError::Vad(format!("{:#}", e)))?;
        debug!(intervals = intervals.len(), detector = self.detector.name(), "Speech detected");

        let chunks = self.optimizer.optimize(&intervals, &audio.samples, audio.sample_rate)?;
        drop(audio);

        if chunks.is_empty() {
            info!(audio_duration_secs = audio_duration, "No speech detected");
            return Ok(Transcript {
                segments: Vec::new(),
                stats: stats(None, mode, Vec::new(), 0, 0, 0, 0, audio_duration, started),
                outcome: TranscriptOutcome::NoSpeech,
                failures: Vec::new(),
            });
        }

        let mut session = Session::open(&self.config.scratch_dir)?;
        let lease = self.pool.acquire(mode, &self.model).await?;
        session.attach_lease(lease);

        let session_id = session.id().to_string();
        let devices: Vec<DeviceId> = session.workers().iter().map(|w| w.device()).collect();
        let tx = self.progress_tx.clone();
        let progress_session = session_id.clone();
        let mut dispatcher = Dispatcher::new(session.workers().to_vec()).with_progress(Arc::new(
            move |event: &ProgressEvent| {
                let _ = tx.send(SessionProgress {
                    session_id: progress_session.clone(),
                    event: event.clone(),
                });
            },
        ));
        if let Some(dir) = session.scratch_path() {
            dispatcher = dispatcher.with_scratch_dir(dir);
        }

        let report = dispatcher
            .transcribe(chunks, language.as_deref(), task, audio_duration)
            .await;
        drop(dispatcher);
        session.close()?;

        let outcome = report.outcome();
        let stats = stats(
            Some(session_id),
            mode,
            devices,
            report.chunk_count,
            report.failed_count(),
            report.skipped_count,
            report.segments.len(),
            audio_duration,
            started,
        );
        match outcome {
            TranscriptOutcome::AllFailed => warn!(
                session_id = ?stats.session_id,
                chunks = stats.chunk_count,
                "Every chunk failed recognition"
            ),
            _ => info!(
                session_id = ?stats.session_id,
                mode = %mode,
                chunks = stats.chunk_count,
                failed = stats.failed_count,
                skipped = stats.skipped_count,
                segments = stats.segment_count,
                elapsed_secs = stats.elapsed_secs,
                realtime_factor = stats.realtime_factor,
                "Transcription complete"
            ),
        }

        Ok(Transcript {
            segments: report.segments,
            stats,
            outcome,
            failures: report.failures,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn stats(
    session_id: Option<String>,
    device_mode: DeviceMode,
    devices: Vec<DeviceId>,
    chunk_count: usize,
    failed_count: usize,
    skipped_count: usize,
    segment_count: usize,
    audio_duration_secs: f64,
    started: Instant,
) -> TranscriptStats {
    let elapsed_secs = started.elapsed().as_secs_f64();
    TranscriptStats {
        session_id,
        device_mode,
        devices,
        chunk_count,
        failed_count,
        skipped_count,
        segment_count,
        audio_duration_secs,
        elapsed_secs,
        realtime_factor: if elapsed_secs > 0.0 {
            audio_duration_secs / elapsed_secs
        } else {
            0.0
        },
    }
}
