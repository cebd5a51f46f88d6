pub mod energy;
#[cfg(feature = "vad")]
pub mod silero;

pub use energy::EnergyDetector;
#[cfg(feature = "vad")]
pub use silero::SileroVad;

use crate::config::TranscriptionConfig;
use crate::SpeechInterval;

/// VAD window: 512 samples at 16kHz = 32ms per probability.
pub const WINDOW_SAMPLES: usize = 512;

/// Finds speech in a whole recording.
///
/// Called from a blocking thread; implementations may be CPU heavy.
pub trait SpeechDetector: Send + Sync + 'static {
    /// Returns speech intervals in seconds, ascending by start.
    fn detect_speech(&self, samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<SpeechInterval>>;

    fn name(&self) -> &str;
}

/// Thresholds shared by every detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechParams {
    /// Probability at or above which a window counts as speech.
    pub threshold: f32,
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,
    pub speech_pad_ms: u32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_ms: 250,
            min_silence_ms: 100,
            speech_pad_ms: 30,
        }
    }
}

impl From<&TranscriptionConfig> for SpeechParams {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            threshold: config.vad_threshold,
            min_speech_ms: config.vad_min_speech_ms,
            min_silence_ms: config.vad_min_silence_ms,
            speech_pad_ms: config.vad_speech_pad_ms,
        }
    }
}

/// Converts per-window speech probabilities into padded speech intervals.
///
/// Speech starts at the first window reaching `threshold` and ends once the
/// probability stays below `threshold - 0.15` for `min_silence_ms`. Regions
/// shorter than `min_speech_ms` are discarded, the rest are padded by
/// `speech_pad_ms` without overlapping their neighbours.
pub fn speech_intervals_from_probs(
    probs: &[f32],
    window: usize,
    sample_rate: u32,
    params: &SpeechParams,
    total_samples: usize,
) -> Vec<SpeechInterval> {
    if sample_rate == 0 || window == 0 {
        return Vec::new();
    }
    let ms = |v: u32| (sample_rate as u64 * v as u64 / 1000) as usize;
    let min_speech = ms(params.min_speech_ms);
    let min_silence = ms(params.min_silence_ms);
    let pad = ms(params.speech_pad_ms);
    let neg_threshold = (params.threshold - 0.15).max(0.01);

    // (start, end) in samples
    let mut regions: Vec<(usize, usize)> = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut silence_start: Option<usize> = None;

    for (i, &prob) in probs.iter().enumerate() {
        let pos = i * window;
        if prob >= params.threshold {
            silence_start = None;
            if current_start.is_none() {
                current_start = Some(pos);
            }
            continue;
        }

        let Some(start) = current_start else {
            continue;
        };
        if prob < neg_threshold {
            let silence_from = *silence_start.get_or_insert(pos);
            if pos - silence_from >= min_silence {
                if silence_from - start > min_speech {
                    regions.push((start, silence_from));
                }
                current_start = None;
                silence_start = None;
            }
        }
    }
    if let Some(start) = current_start {
        if total_samples.saturating_sub(start) > min_speech {
            regions.push((start, total_samples));
        }
    }

    // Pad, splitting short silences between neighbours.
    let count = regions.len();
    for i in 0..count {
        if i == 0 {
            regions[i].0 = regions[i].0.saturating_sub(pad);
        }
        if i + 1 < count {
            let silence = regions[i + 1].0.saturating_sub(regions[i].1);
            if silence < 2 * pad {
                regions[i].1 += silence / 2;
                regions[i + 1].0 = regions[i + 1].0.saturating_sub(silence / 2);
            } else {
                regions[i].1 = (regions[i].1 + pad).min(total_samples);
                regions[i + 1].0 = regions[i + 1].0.saturating_sub(pad);
            }
        } else {
            regions[i].1 = (regions[i].1 + pad).min(total_samples);
        }
    }

    let rate = sample_rate as f64;
    regions
        .into_iter()
        .map(|(start, end)| SpeechInterval::new(start as f64 / rate, end as f64 / rate))
        .filter(|iv| iv.is_valid())
        .collect()
}
