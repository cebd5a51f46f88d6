use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::TranscriptOutcome;
use crate::segment::Chunk;
use crate::worker::{ChunkOutcome, ChunkTask, DeviceId, Worker, WorkerResult};
use crate::{TaskKind, TranscriptSegment};

/// Emitted once per finished chunk, in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub index: usize,
    pub device_id: DeviceId,
    pub status: String,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// A chunk that produced no transcript because recognition failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub device_id: DeviceId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub segments: Vec<TranscriptSegment>,
    pub failures: Vec<ChunkFailure>,
    pub chunk_count: usize,
    pub succeeded_count: usize,
    pub skipped_count: usize,
}

impl DispatchReport {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Only a recognized chunk makes a run `Transcribed`. Skipped chunks count
    /// as neither success nor failure, so an all-skipped run is `NoSpeech`.
    pub fn outcome(&self) -> TranscriptOutcome {
        if self.succeeded_count > 0 {
            TranscriptOutcome::Transcribed
        } else if self.failures.is_empty() {
            TranscriptOutcome::NoSpeech
        } else {
            TranscriptOutcome::AllFailed
        }
    }
}

/// Fans chunks out over a worker set round-robin and gathers the results.
pub struct Dispatcher {
    workers: Vec<Arc<Worker>>,
    scratch_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl Dispatcher {
    pub fn new(workers: Vec<Arc<Worker>>) -> Self {
        Self {
            workers,
            scratch_dir: None,
            progress: None,
        }
    }

    /// Where chunk WAVs go for recognizers that read files.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs every chunk exactly once. Chunk `i` goes to worker `i % W`.
    ///
    /// Results come back sorted by chunk index. A failed chunk never stops its siblings.
    pub async fn dispatch(&self, chunks: Vec<Chunk>, language: Option<&str>, task: TaskKind) -> Vec<WorkerResult> {
        let total = chunks.len();
        if total == 0 {
            return Vec::new();
        }
        if self.workers.is_empty() {
            warn!(chunks = total, "No workers to dispatch to");
            return (0..total)
                .map(|index| WorkerResult::failed(index, DeviceId(0), "No workers available"))
                .collect();
        }

        info!(chunks = total, workers = self.workers.len(), "Dispatching chunks");
        let mut pending: FuturesUnordered<_> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let worker = &self.workers[index % self.workers.len()];
                let device = worker.device();
                let rx = worker.submit(
                    ChunkTask {
                        index,
                        chunk,
                        language: language.map(str::to_string),
                        task,
                    },
                    self.scratch_dir.clone(),
                );
                async move {
                    rx.await.unwrap_or_else(|_| {
                        WorkerResult::failed(index, device, "Worker dropped the task without a result")
                    })
                }
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        while let Some(result) = pending.next().await {
            let event = ProgressEvent {
                completed: results.len() + 1,
                total,
                index: result.index,
                device_id: result.device_id,
                status: result.status().to_string(),
            };
            debug!(
                completed = event.completed,
                total,
                index = event.index,
                device = %event.device_id,
                status = %event.status,
                "Chunk finished"
            );
            if let Some(progress) = &self.progress {
                progress(&event);
            }
            results.push(result);
        }

        results.sort_by_key(|r| r.index);
        results
    }

    /// Dispatches and merges into an ordered transcript.
    pub async fn transcribe(
        &self,
        chunks: Vec<Chunk>,
        language: Option<&str>,
        task: TaskKind,
        audio_duration: f64,
    ) -> DispatchReport {
        let results = self.dispatch(chunks, language, task).await;
        merge_results(results, audio_duration)
    }
}

/// Merges per-chunk results into one transcript on the global timeline.
///
/// Independent of completion order: results are ordered by chunk index, the
/// merged segments by start time, then clamped to `[0, audio_duration]`.
pub fn merge_results(mut results: Vec<WorkerResult>, audio_duration: f64) -> DispatchReport {
    results.sort_by_key(|r| r.index);
    let limit = audio_duration.max(0.0);

    let mut report = DispatchReport {
        chunk_count: results.len(),
        ..Default::default()
    };

    for result in results {
        match result.outcome {
            ChunkOutcome::Ok { mut segments } => {
                segments.sort_by(|a, b| a.start.total_cmp(&b.start));
                report.segments.extend(segments);
                report.succeeded_count += 1;
            }
            ChunkOutcome::Failed { error } => report.failures.push(ChunkFailure {
                index: result.index,
                device_id: result.device_id,
                error,
            }),
            ChunkOutcome::Skipped => report.skipped_count += 1,
        }
    }

    report.segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    for seg in &mut report.segments {
        seg.start = seg.start.max(0.0).min(limit);
        seg.end = seg.end.max(seg.start).min(limit);
    }

    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            chunks = report.chunk_count,
            "Some chunks failed recognition"
        );
    }
    report
}
