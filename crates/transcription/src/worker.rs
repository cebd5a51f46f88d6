use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::asr::{RecognitionInput, Recognizer, RecognizerFactory};
use crate::audio::ChunkArtifact;
use crate::error::{TranscribeError, TranscribeResult};
use crate::segment::Chunk;
use crate::{TaskKind, TranscriptSegment};

/// Chunks shorter than this are not worth a recognizer call.
pub const MIN_RECOGNIZABLE_SECS: f64 = 0.1;

/// Accelerator ordinal a worker is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    #[default]
    Float16,
    Int8,
    Float32,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Float16 => "float16",
            ComputeType::Int8 => "int8",
            ComputeType::Float32 => "float32",
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeType {
    type Err = TranscribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float16" | "fp16" => Ok(ComputeType::Float16),
            "int8" => Ok(ComputeType::Int8),
            "float32" | "fp32" => Ok(ComputeType::Float32),
            other => Err(TranscribeError::Config(format!("Unsupported compute type '{}'", other))),
        }
    }
}

/// Identity of a loaded model. Workers are reused only for an equal config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_size: String,
    pub compute_type: ComputeType,
}

impl ModelConfig {
    pub fn new(model_size: impl Into<String>, compute_type: ComputeType) -> Self {
        Self {
            model_size: model_size.into(),
            compute_type,
        }
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model_size, self.compute_type)
    }
}

/// One chunk's recognition job.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub index: usize,
    pub chunk: Chunk,
    pub language: Option<String>,
    pub task: TaskKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Ok { segments: Vec<TranscriptSegment> },
    Failed { error: String },
    Skipped,
}

/// Result of exactly one [`ChunkTask`], segments already on the global timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub index: usize,
    pub device_id: DeviceId,
    pub outcome: ChunkOutcome,
}

impl WorkerResult {
    pub fn ok(index: usize, device_id: DeviceId, segments: Vec<TranscriptSegment>) -> Self {
        Self {
            index,
            device_id,
            outcome: ChunkOutcome::Ok { segments },
        }
    }

    pub fn failed(index: usize, device_id: DeviceId, error: impl Into<String>) -> Self {
        Self {
            index,
            device_id,
            outcome: ChunkOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn skipped(index: usize, device_id: DeviceId) -> Self {
        Self {
            index,
            device_id,
            outcome: ChunkOutcome::Skipped,
        }
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        match &self.outcome {
            ChunkOutcome::Ok { segments } => segments,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ChunkOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self.outcome {
            ChunkOutcome::Ok { .. } => "ok",
            ChunkOutcome::Failed { .. } => "failed",
            ChunkOutcome::Skipped => "skipped",
        }
    }
}

struct Job {
    task: ChunkTask,
    scratch_dir: Option<PathBuf>,
    reply: oneshot::Sender<WorkerResult>,
}

/// A recognizer pinned to one device, running on its own OS thread.
///
/// Jobs are executed one at a time in submission order. Dropping the last
/// handle closes the queue; the thread finishes queued jobs and exits.
pub struct Worker {
    device: DeviceId,
    config: ModelConfig,
    backend: String,
    loaded_at: DateTime<Utc>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl Worker {
    /// Starts the worker thread and waits for its model to load.
    pub async fn spawn(
        device: DeviceId,
        config: ModelConfig,
        factory: Arc<dyn RecognizerFactory>,
    ) -> TranscribeResult<Self> {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String, String>>();

        let thread_config = config.clone();
        std::thread::Builder::new()
            .name(format!("worker-dev{}", device.0))
            .spawn(move || run_worker(device, thread_config, factory, jobs_rx, ready_tx))
            .map_err(|e| TranscribeError::WorkerInit {
                device,
                message: format!("Failed to spawn worker thread: {}", e),
            })?;

        let backend = match ready_rx.await {
            Ok(Ok(backend)) => backend,
            Ok(Err(message)) => return Err(TranscribeError::WorkerInit { device, message }),
            Err(_) => {
                return Err(TranscribeError::WorkerInit {
                    device,
                    message: "Worker thread exited during model load".to_string(),
                });
            }
        };

        info!(device = %device, model = %config, backend = %backend, "Worker ready");
        Ok(Self {
            device,
            config,
            backend,
            loaded_at: Utc::now(),
            jobs: jobs_tx,
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Queues a task. The receiver always yields exactly one result unless
    /// the worker thread dies mid-job.
    pub fn submit(&self, task: ChunkTask, scratch_dir: Option<PathBuf>) -> oneshot::Receiver<WorkerResult> {
        let (reply, rx) = oneshot::channel();
        let index = task.index;
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(Job {
            task,
            scratch_dir,
            reply,
        }) {
            warn!(device = %self.device, index, "Worker queue closed, failing task");
            let _ = job
                .reply
                .send(WorkerResult::failed(index, self.device, "Worker thread has stopped"));
        }
        rx
    }

    /// Submits a task and waits for its result.
    pub async fn recognize(&self, task: ChunkTask, scratch_dir: Option<PathBuf>) -> WorkerResult {
        let index = task.index;
        match self.submit(task, scratch_dir).await {
            Ok(result) => result,
            Err(_) => WorkerResult::failed(index, self.device, "Worker dropped the task without a result"),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("device", &self.device)
            .field("config", &self.config)
            .field("backend", &self.backend)
            .finish()
    }
}

fn run_worker(
    device: DeviceId,
    config: ModelConfig,
    factory: Arc<dyn RecognizerFactory>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    ready: oneshot::Sender<Result<String, String>>,
) {
    info!(device = %device, model = %config, factory = factory.name(), "Loading model");
    let mut recognizer = match panic::catch_unwind(AssertUnwindSafe(|| factory.load(device, &config))) {
        Ok(Ok(recognizer)) => recognizer,
        Ok(Err(e)) => {
            let _ = ready.send(Err(format!("{:#}", e)));
            return;
        }
        Err(payload) => {
            let _ = ready.send(Err(format!("model load panicked: {}", panic_message(&payload))));
            return;
        }
    };

    if ready.send(Ok(recognizer.name().to_string())).is_err() {
        debug!(device = %device, "Worker abandoned before it became ready");
        return;
    }

    while let Some(job) = jobs.blocking_recv() {
        // The session that queued this job is gone; don't make the next lease wait on it.
        if job.reply.is_closed() {
            debug!(device = %device, index = job.task.index, "Dropping job abandoned by its session");
            continue;
        }
        let result = process_task(device, recognizer.as_mut(), job.task, job.scratch_dir.as_deref());
        let _ = job.reply.send(result);
    }

    debug!(device = %device, model = %config, "Worker thread exiting");
}

fn process_task(
    device: DeviceId,
    recognizer: &mut dyn Recognizer,
    task: ChunkTask,
    scratch_dir: Option<&Path>,
) -> WorkerResult {
    let ChunkTask {
        index,
        chunk,
        language,
        task,
    } = task;

    if chunk.samples.is_empty() || chunk.duration() < MIN_RECOGNIZABLE_SECS {
        debug!(device = %device, index, duration = chunk.duration(), "Skipping chunk too short to recognize");
        return WorkerResult::skipped(index, device);
    }

    // Removed on drop, after the recognizer is done with it.
    let artifact = match (recognizer.wants_file(), scratch_dir) {
        (true, Some(dir)) => match ChunkArtifact::write(dir, index, &chunk.samples, chunk.sample_rate) {
            Ok(artifact) => Some(artifact),
            Err(e) => return WorkerResult::failed(index, device, e.to_string()),
        },
        (true, None) => {
            return WorkerResult::failed(index, device, "Recognizer needs a file but no scratch directory was given");
        }
        (false, _) => None,
    };

    let input = RecognitionInput {
        index,
        samples: &chunk.samples,
        sample_rate: chunk.sample_rate,
        wav_path: artifact.as_ref().map(|a| a.path()),
    };

    let recognized = panic::catch_unwind(AssertUnwindSafe(|| {
        recognizer.recognize(input, language.as_deref(), task)
    }));
    drop(artifact);

    let local = match recognized {
        Ok(Ok(segments)) => segments,
        Ok(Err(e)) => {
            warn!(device = %device, index, "Chunk recognition failed: {:#}", e);
            return WorkerResult::failed(index, device, format!("{:#}", e));
        }
        Err(payload) => {
            warn!(device = %device, index, "Recognizer panicked");
            return WorkerResult::failed(index, device, format!("recognizer panicked: {}", panic_message(&payload)));
        }
    };

    let segments = local
        .into_iter()
        .filter_map(|seg| {
            let text = seg.text.trim();
            if text.is_empty() {
                return None;
            }
            let start = seg.start.max(0.0);
            let end = seg.end.max(start);
            Some(TranscriptSegment {
                start: chunk.start + start,
                end: chunk.start + end,
                text: text.to_string(),
            })
        })
        .collect();

    WorkerResult::ok(index, device, segments)
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
