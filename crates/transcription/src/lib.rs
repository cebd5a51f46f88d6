pub mod asr;
pub mod audio;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod pool;
pub mod segment;
pub mod session;
pub mod vad;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

use std::fmt;
use std::str::FromStr;

pub use asr::{LocalSegment, RecognitionInput, Recognizer, RecognizerFactory};
pub use audio::AudioBuffer;
pub use config::TranscriptionConfig;
pub use dispatcher::{ChunkFailure, DispatchReport, Dispatcher, ProgressEvent};
pub use engine::{SessionProgress, Transcript, TranscriptOutcome, TranscriptStats, TranscriptionService};
pub use error::{TranscribeError, TranscribeResult};
pub use pool::{BrokerStatus, DeviceMode, LeaseId, PoolConfig, PoolStatus, WorkerLease, WorkerPool};
pub use segment::{Chunk, SegmentOptimizer};
pub use session::Session;
pub use vad::{EnergyDetector, SpeechDetector, SpeechParams};
pub use worker::{ComputeType, DeviceId, ModelConfig, Worker, WorkerResult};

use serde::{Deserialize, Serialize};

/// Sample rate every recognizer and detector receives (16kHz mono f32).
pub const SAMPLE_RATE: u32 = 16_000;

/// A stretch of detected speech on the global timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechInterval {
    pub start: f64,
    pub end: f64,
}

impl SpeechInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// `start < end` with both ends finite.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start < self.end
    }
}

/// One line of the final transcript, on the global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Seconds from the start of the source audio.
    pub start: f64,
    /// Seconds from the start of the source audio.
    pub end: f64,
    pub text: String,
}

/// What the recognizer is asked to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Transcribe,
    /// Speech in any language rendered as English text.
    Translate,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Transcribe => "transcribe",
            TaskKind::Translate => "translate",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TranscribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transcribe" => Ok(TaskKind::Transcribe),
            "translate" => Ok(TaskKind::Translate),
            other => Err(TranscribeError::Config(format!("Unknown task '{}'", other))),
        }
    }
}

/// Maps the UI's language choice to a recognizer hint.
///
/// `"auto"` and blank values mean auto-detect.
pub fn normalize_language(language: Option<&str>) -> Option<String> {
    language
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("auto"))
        .map(|l| l.to_string())
}
