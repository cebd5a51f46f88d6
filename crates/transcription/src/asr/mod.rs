#[cfg(feature = "local-whisper")]
pub mod local_whisper;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::TaskKind;
use crate::worker::{DeviceId, ModelConfig};

/// Audio handed to a recognizer for one chunk.
pub struct RecognitionInput<'a> {
    /// Position of the chunk in the dispatch order.
    pub index: usize,
    /// PCM audio at 16kHz mono, f32 normalized [-1.0, 1.0].
    pub samples: &'a [f32],
    pub sample_rate: u32,
    /// The same audio as a WAV file, present when [`Recognizer::wants_file`] is true.
    pub wav_path: Option<&'a Path>,
}

/// A recognized segment with timestamps relative to the chunk start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl LocalSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A loaded speech recognition model bound to one device.
///
/// Only ever called from its worker's thread, one chunk at a time.
pub trait Recognizer: Send {
    fn recognize(
        &mut self,
        input: RecognitionInput<'_>,
        language: Option<&str>,
        task: TaskKind,
    ) -> anyhow::Result<Vec<LocalSegment>>;

    /// Whether the recognizer reads `wav_path` instead of `samples`.
    fn wants_file(&self) -> bool {
        false
    }

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Loads recognizers for the worker pool.
pub trait RecognizerFactory: Send + Sync + 'static {
    /// Loads `config` onto `device`. Called on the worker's own thread.
    fn load(&self, device: DeviceId, config: &ModelConfig) -> anyhow::Result<Box<dyn Recognizer>>;

    fn name(&self) -> &str;
}
