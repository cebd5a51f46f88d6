use tracing::debug;

use super::{speech_intervals_from_probs, SpeechDetector, SpeechParams, WINDOW_SAMPLES};
use crate::SpeechInterval;

/// RMS level at or above which a window counts as voiced.
pub const DEFAULT_RMS_THRESHOLD: f32 = 0.01;

/// Model-free detector: a window is speech when its RMS energy clears a
/// fixed level. Used when no Silero model is configured.
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    rms_threshold: f32,
    params: SpeechParams,
}

impl EnergyDetector {
    pub fn new(params: SpeechParams) -> Self {
        Self {
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            params,
        }
    }

    pub fn with_rms_threshold(mut self, rms_threshold: f32) -> Self {
        self.rms_threshold = rms_threshold;
        self
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(SpeechParams::default())
    }
}

impl SpeechDetector for EnergyDetector {
    fn detect_speech(&self, samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<SpeechInterval>> {
        if sample_rate == 0 {
            anyhow::bail!("sample rate must be positive");
        }

        let probs: Vec<f32> = samples
            .chunks(WINDOW_SAMPLES)
            .map(|frame| {
                let rms = (frame.iter().map(|&x| x * x).sum::<f32>() / frame.len() as f32).sqrt();
                if rms >= self.rms_threshold { 1.0 } else { 0.0 }
            })
            .collect();

        let intervals = speech_intervals_from_probs(&probs, WINDOW_SAMPLES, sample_rate, &self.params, samples.len());
        debug!(
            windows = probs.len(),
            voiced = probs.iter().filter(|&&p| p > 0.0).count(),
            intervals = intervals.len(),
            "Energy VAD complete"
        );
        Ok(intervals)
    }

    fn name(&self) -> &str {
        "energy"
    }
}
