use ndarray::{Array0, Array1, Array2, Array3};
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{speech_intervals_from_probs, SpeechDetector, SpeechParams, WINDOW_SAMPLES};
use crate::SpeechInterval;

const SAMPLE_RATE: i64 = 16000;

/// Silero VAD v4: separate h/c states, hidden size 64
const V4_HIDDEN_SIZE: usize = 64;
/// Silero VAD v5: combined state, hidden size 128
const V5_HIDDEN_SIZE: usize = 128;

/// Which Silero VAD model version we detected.
#[derive(Debug, Clone, Copy)]
enum ModelVersion {
    /// v4: inputs (input, sr, h, c), outputs (output, hn, cn)
    V4,
    /// v5: inputs (input, state, sr), outputs (output, stateN)
    V5,
}

/// Recurrent state carried from one window to the next.
struct RecurrentState {
    h: Array3<f32>,
    c: Array3<f32>,
    combined: Array3<f32>,
}

impl RecurrentState {
    fn new() -> Self {
        Self {
            h: Array3::zeros((2, 1, V4_HIDDEN_SIZE)),
            c: Array3::zeros((2, 1, V4_HIDDEN_SIZE)),
            combined: Array3::zeros((2, 1, V5_HIDDEN_SIZE)),
        }
    }
}

/// Silero VAD over ONNX Runtime, run over a whole 16kHz recording.
///
/// Auto-detects v4 vs v5 model format. The session is shared, so calls are
/// serialized.
pub struct SileroVad {
    session: Mutex<Session>,
    version: ModelVersion,
    params: SpeechParams,
}

impl SileroVad {
    /// Creates a new Silero VAD from an ONNX model file.
    pub fn new(model_path: &str, params: SpeechParams) -> anyhow::Result<Self> {
        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("Failed to create ORT session builder: {}", e))?
            .with_intra_threads(1)
            .map_err(|e| anyhow::anyhow!("Failed to set intra threads: {}", e))?
            .commit_from_file(model_path)
            .map_err(|e| anyhow::anyhow!("Failed to load VAD model '{}': {}", model_path, e))?;

        // Detect model version by inspecting input names
        let input_names: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let version = if input_names.iter().any(|n| n == "state") {
            ModelVersion::V5
        } else {
            ModelVersion::V4
        };

        info!(?version, ?input_names, "Silero VAD model loaded");

        Ok(Self {
            session: Mutex::new(session),
            version,
            params,
        })
    }

    fn speech_probs(&self, samples: &[f32]) -> anyhow::Result<Vec<f32>> {
        let mut session = self.session.lock();
        let mut state = RecurrentState::new();
        let mut probs = Vec::with_capacity(samples.len() / WINDOW_SAMPLES + 1);

        for window in samples.chunks(WINDOW_SAMPLES) {
            let mut chunk = window.to_vec();
            chunk.resize(WINDOW_SAMPLES, 0.0);
            let input = Array2::from_shape_vec((1, WINDOW_SAMPLES), chunk)
                .map_err(|e| anyhow::anyhow!("Input array shape error: {}", e))?;
            let input_val = Tensor::from_array(input)
                .map_err(|e| anyhow::anyhow!("Input tensor error: {}", e))?;

            let prob = match self.version {
                ModelVersion::V5 => run_inference_v5(&mut session, &mut state, input_val)?,
                ModelVersion::V4 => run_inference_v4(&mut session, &mut state, input_val)?,
            };
            probs.push(prob);
        }

        Ok(probs)
    }
}

impl SpeechDetector for SileroVad {
    fn detect_speech(&self, samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<SpeechInterval>> {
        if sample_rate as i64 != SAMPLE_RATE {
            anyhow::bail!("Silero VAD expects {}Hz audio, got {}Hz", SAMPLE_RATE, sample_rate);
        }

        let probs = self.speech_probs(samples)?;
        let intervals = speech_intervals_from_probs(&probs, WINDOW_SAMPLES, sample_rate, &self.params, samples.len());
        debug!(windows = probs.len(), intervals = intervals.len(), "Silero VAD complete");
        Ok(intervals)
    }

    fn name(&self) -> &str {
        "silero"
    }
}

/// Silero VAD v5: inputs (input, state, sr), outputs (output, stateN)
fn run_inference_v5(session: &mut Session, state: &mut RecurrentState, input_val: Tensor<f32>) -> anyhow::Result<f32> {
    let state_val = Tensor::from_array(state.combined.clone())
        .map_err(|e| anyhow::anyhow!("State tensor error: {}", e))?;
    // sr must be a 0-d int64 scalar
    let sr = Array0::from_elem((), SAMPLE_RATE);
    let sr_val = Tensor::from_array(sr).map_err(|e| anyhow::anyhow!("SR tensor error: {}", e))?;

    let outputs = session
        .run(ort::inputs!("input" => input_val, "state" => state_val, "sr" => sr_val))
        .map_err(|e| anyhow::anyhow!("VAD v5 inference error: {}", e))?;

    let (_shape, output_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| anyhow::anyhow!("Output extraction error: {}", e))?;
    let speech_prob = output_data.first().copied().unwrap_or(0.0);

    if let Ok((_shape, state_data)) = outputs[1].try_extract_tensor::<f32>() {
        if let Ok(next) = Array3::from_shape_vec((2, 1, V5_HIDDEN_SIZE), state_data.to_vec()) {
            state.combined = next;
        }
    }

    Ok(speech_prob)
}

/// Silero VAD v4: inputs (input, sr, h, c), outputs (output, hn, cn)
fn run_inference_v4(session: &mut Session, state: &mut RecurrentState, input_val: Tensor<f32>) -> anyhow::Result<f32> {
    let sr = Array1::from_vec(vec![SAMPLE_RATE]);
    let sr_val = Tensor::from_array(sr).map_err(|e| anyhow::anyhow!("SR tensor error: {}", e))?;
    let h_val = Tensor::from_array(state.h.clone()).map_err(|e| anyhow::anyhow!("H tensor error: {}", e))?;
    let c_val = Tensor::from_array(state.c.clone()).map_err(|e| anyhow::anyhow!("C tensor error: {}", e))?;

    let outputs = session
        .run(ort::inputs![input_val, sr_val, h_val, c_val])
        .map_err(|e| anyhow::anyhow!("VAD v4 inference error: {}", e))?;

    let (_shape, output_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| anyhow::anyhow!("Output extraction error: {}", e))?;
    let speech_prob = output_data.first().copied().unwrap_or(0.0);

    if let Ok((_shape, hn_data)) = outputs[1].try_extract_tensor::<f32>() {
        if let Ok(next) = Array3::from_shape_vec((2, 1, V4_HIDDEN_SIZE), hn_data.to_vec()) {
            state.h = next;
        }
    }
    if let Ok((_shape, cn_data)) = outputs[2].try_extract_tensor::<f32>() {
        if let Ok(next) = Array3::from_shape_vec((2, 1, V4_HIDDEN_SIZE), cn_data.to_vec()) {
            state.c = next;
        }
    }

    Ok(speech_prob)
}
