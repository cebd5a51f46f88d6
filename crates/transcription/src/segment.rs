use tracing::debug;

use crate::error::{TranscribeError, TranscribeResult};
use crate::SpeechInterval;

/// Intervals closer than this are merged into one chunk.
pub const MERGE_GAP_SECS: f64 = 1.0;
/// Detected speech shorter than this is treated as noise.
pub const MIN_INTERVAL_SECS: f64 = 0.5;

/// A dispatch-ready slice of audio with absolute timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub start: f64,
    pub end: f64,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Chunk {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Turns raw VAD intervals into chunks of bounded duration.
///
/// `max_duration` is a hard upper bound. `min_duration` is validated and
/// reported but not enforced: short isolated speech is emitted as its own
/// chunk rather than padded or dropped.
#[derive(Debug, Clone, Copy)]
pub struct SegmentOptimizer {
    min_duration: f64,
    max_duration: f64,
}

impl SegmentOptimizer {
    pub fn new(min_duration: f64, max_duration: f64) -> TranscribeResult<Self> {
        if !(min_duration > 0.0 && min_duration <= max_duration && max_duration.is_finite()) {
            return Err(TranscribeError::Config(format!(
                "chunk bounds must satisfy 0 < min <= max (min={}, max={})",
                min_duration, max_duration
            )));
        }
        Ok(Self {
            min_duration,
            max_duration,
        })
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    /// Computes chunk boundaries without touching audio.
    pub fn plan(&self, intervals: &[SpeechInterval]) -> Vec<SpeechInterval> {
        let mut sorted: Vec<SpeechInterval> = intervals.iter().copied().filter(|i| i.is_valid()).collect();
        if sorted.is_empty() {
            return Vec::new();
        }
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut kept: Vec<SpeechInterval> = sorted
            .iter()
            .copied()
            .filter(|i| i.duration() >= MIN_INTERVAL_SECS)
            .collect();
        if kept.is_empty() {
            // Everything is below the noise floor; keep the strongest candidate.
            if let Some(longest) = sorted.iter().copied().max_by(|a, b| a.duration().total_cmp(&b.duration())) {
                kept.push(longest);
            }
        }

        let merged = self.merge(&kept);
        let planned: Vec<SpeechInterval> = merged.iter().flat_map(|iv| self.split(*iv)).collect();

        debug!(
            intervals = intervals.len(),
            kept = kept.len(),
            merged = merged.len(),
            chunks = planned.len(),
            "Segments optimized"
        );
        planned
    }

    /// Plans chunk boundaries and slices `audio` accordingly.
    pub fn optimize(&self, intervals: &[SpeechInterval], audio: &[f32], sample_rate: u32) -> TranscribeResult<Vec<Chunk>> {
        if sample_rate == 0 {
            return Err(TranscribeError::Config("sample_rate must be positive".into()));
        }

        let chunks = self
            .plan(intervals)
            .into_iter()
            .map(|iv| {
                let from = sample_index(iv.start, sample_rate, audio.len());
                let to = sample_index(iv.end, sample_rate, audio.len()).max(from);
                Chunk {
                    start: iv.start,
                    end: iv.end,
                    sample_rate,
                    samples: audio[from..to].to_vec(),
                }
            })
            .collect();
        Ok(chunks)
    }

    fn merge(&self, intervals: &[SpeechInterval]) -> Vec<SpeechInterval> {
        let mut merged = Vec::with_capacity(intervals.len());
        let mut iter = intervals.iter().copied();
        let Some(mut current) = iter.next() else {
            return merged;
        };

        for next in iter {
            let gap = next.start - current.end;
            let combined = next.end.max(current.end) - current.start;
            // Overlaps always merge; the split pass restores the bound.
            if gap <= 0.0 || (gap < MERGE_GAP_SECS && combined <= self.max_duration) {
                current.end = current.end.max(next.end);
            } else {
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);
        merged
    }

    fn split(&self, interval: SpeechInterval) -> Vec<SpeechInterval> {
        let duration = interval.duration();
        if duration <= self.max_duration {
            return vec![interval];
        }

        // Tolerance keeps an exact multiple of max from gaining a sliver piece.
        let pieces = ((duration / self.max_duration) - 1e-9).ceil().max(1.0) as usize;
        let piece = duration / pieces as f64;
        (0..pieces)
            .map(|i| {
                let start = interval.start + i as f64 * piece;
                let end = if i + 1 == pieces {
                    interval.end
                } else {
                    interval.start + (i + 1) as f64 * piece
                };
                SpeechInterval::new(start, end)
            })
            .collect()
    }
}

/// Convenience wrapper over [`SegmentOptimizer::optimize`].
pub fn optimize(
    intervals: &[SpeechInterval],
    audio: &[f32],
    sample_rate: u32,
    min_duration: f64,
    max_duration: f64,
) -> TranscribeResult<Vec<Chunk>> {
    SegmentOptimizer::new(min_duration, max_duration)?.optimize(intervals, audio, sample_rate)
}

fn sample_index(seconds: f64, sample_rate: u32, len: usize) -> usize {
    let index = (seconds * sample_rate as f64).round();
    if index <= 0.0 {
        0
    } else {
        (index as usize).min(len)
    }
}
