use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TranscribeError, TranscribeResult};
use crate::pool::PoolConfig;
use crate::worker::{ComputeType, DeviceId, ModelConfig};

/// Configuration for the transcription system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Whisper model name (e.g. "large-v3", "large-v3-turbo").
    pub model_size: String,
    /// Numeric precision the model is loaded with.
    pub compute_type: ComputeType,
    /// Default language hint for ASR (e.g. "en", "zh"). None = auto-detect.
    pub language: Option<String>,
    /// Accelerator devices. Single-device mode uses the first one.
    pub device_ids: Vec<u32>,
    /// Maximum number of workers in single-device mode.
    pub max_workers: usize,
    /// How long a request waits for a free worker before giving up.
    pub acquire_timeout_secs: u64,
    /// Lower bound on chunk duration in seconds (best effort).
    pub min_chunk_secs: f64,
    /// Upper bound on chunk duration in seconds.
    pub max_chunk_secs: f64,
    /// Root under which every session creates its scratch directory.
    pub scratch_dir: PathBuf,
    /// Directory holding GGML Whisper model files (for local_whisper backend).
    pub whisper_model_dir: Option<String>,
    /// Path to the Silero VAD ONNX model file. None = energy detector.
    pub vad_model_path: Option<String>,
    /// VAD speech threshold (0.0-1.0).
    pub vad_threshold: f32,
    /// Speech shorter than this is discarded by the detector.
    pub vad_min_speech_ms: u32,
    /// Silence shorter than this does not end a speech region.
    pub vad_min_silence_ms: u32,
    /// Padding added on both sides of each detected region.
    pub vad_speech_pad_ms: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model_size: "large-v3-turbo".to_string(),
            compute_type: ComputeType::Float16,
            language: None,
            device_ids: vec![0],
            max_workers: 2,
            acquire_timeout_secs: 300,
            min_chunk_secs: 15.0,
            max_chunk_secs: 45.0,
            scratch_dir: std::env::temp_dir().join("whisperfleet"),
            whisper_model_dir: None,
            vad_model_path: None,
            vad_threshold: 0.5,
            vad_min_speech_ms: 250,
            vad_min_silence_ms: 100,
            vad_speech_pad_ms: 30,
        }
    }
}

impl TranscriptionConfig {
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.model_size.clone(), self.compute_type)
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.device_ids.iter().copied().map(DeviceId).collect()
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            device_ids: self.devices(),
            max_workers: self.max_workers,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }

    /// Rejects settings that can never produce a working pipeline.
    pub fn validate(&self) -> TranscribeResult<()> {
        if self.model_size.trim().is_empty() {
            return Err(TranscribeError::Config("model_size must not be empty".into()));
        }
        if self.device_ids.is_empty() {
            return Err(TranscribeError::Config("device_ids must list at least one device".into()));
        }
        let unique: HashSet<u32> = self.device_ids.iter().copied().collect();
        if unique.len() != self.device_ids.len() {
            return Err(TranscribeError::Config(format!(
                "device_ids contains duplicates: {:?}",
                self.device_ids
            )));
        }
        if self.max_workers == 0 {
            return Err(TranscribeError::Config("max_workers must be at least 1".into()));
        }
        if !(self.min_chunk_secs > 0.0 && self.min_chunk_secs <= self.max_chunk_secs) {
            return Err(TranscribeError::Config(format!(
                "chunk bounds must satisfy 0 < min <= max (min={}, max={})",
                self.min_chunk_secs, self.max_chunk_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(TranscribeError::Config(format!(
                "vad_threshold must be within 0.0-1.0, got {}",
                self.vad_threshold
            )));
        }
        Ok(())
    }
}
