use std::path::PathBuf;

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{LocalSegment, RecognitionInput, Recognizer, RecognizerFactory};
use crate::TaskKind;
use crate::worker::{ComputeType, DeviceId, ModelConfig};

/// Loads whisper.cpp models (GGML files) via whisper-rs.
pub struct WhisperFactory {
    model_dir: PathBuf,
}

impl WhisperFactory {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// `ggml-<size>.bin`, or the `-q8_0` quantized file for int8.
    pub fn model_path(&self, config: &ModelConfig) -> PathBuf {
        let file = match config.compute_type {
            ComputeType::Int8 => format!("ggml-{}-q8_0.bin", config.model_size),
            ComputeType::Float16 | ComputeType::Float32 => format!("ggml-{}.bin", config.model_size),
        };
        self.model_dir.join(file)
    }
}

impl RecognizerFactory for WhisperFactory {
    fn load(&self, device: DeviceId, config: &ModelConfig) -> anyhow::Result<Box<dyn Recognizer>> {
        let model_path = self.model_path(config);
        let model_path_str = model_path.to_string_lossy().to_string();
        info!(model_path = %model_path_str, device = %device, "Loading Whisper model");

        let mut params = WhisperContextParameters::default();
        params.use_gpu(true).gpu_device(device.0 as i32);

        let ctx = WhisperContext::new_with_params(&model_path_str, params)
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model '{}': {}", model_path_str, e))?;
        info!(device = %device, "Whisper model loaded");

        Ok(Box::new(LocalWhisperRecognizer { ctx, device }))
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}

/// Whisper context pinned to one GPU.
pub struct LocalWhisperRecognizer {
    ctx: WhisperContext,
    device: DeviceId,
}

impl Recognizer for LocalWhisperRecognizer {
    fn recognize(
        &mut self,
        input: RecognitionInput<'_>,
        language: Option<&str>,
        task: TaskKind,
    ) -> anyhow::Result<Vec<LocalSegment>> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create Whisper state: {}", e))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(language);
        params.set_translate(task == TaskKind::Translate);

        // Suppress non-speech output
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, input.samples)
            .map_err(|e| anyhow::anyhow!("Whisper transcription failed: {}", e))?;

        let n_segments = state.full_n_segments();
        let mut segments = Vec::new();
        for i in 0..n_segments {
            if let Some(segment) = state.get_segment(i) {
                if let Ok(text) = segment.to_str() {
                    // Timestamps are in centiseconds.
                    segments.push(LocalSegment::new(
                        segment.start_timestamp() as f64 / 100.0,
                        segment.end_timestamp() as f64 / 100.0,
                        text,
                    ));
                }
            }
        }

        debug!(device = %self.device, index = input.index, segments = segments.len(), "Whisper chunk complete");
        Ok(segments)
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}
