pub mod resampler;

pub use resampler::Resampler;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TranscribeError, TranscribeResult};
use crate::SAMPLE_RATE;

/// Mono PCM audio, f32 normalized [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Converts to `target` Hz, returning `self` untouched when already there.
    pub fn into_sample_rate(self, target: u32) -> TranscribeResult<Self> {
        if self.sample_rate == target {
            return Ok(self);
        }
        if self.sample_rate == 0 || target == 0 {
            return Err(TranscribeError::Audio(format!(
                "Cannot resample {}Hz audio to {}Hz",
                self.sample_rate, target
            )));
        }

        debug!(from = self.sample_rate, to = target, samples = self.samples.len(), "Resampling audio");
        let mut resampler = Resampler::new(self.sample_rate, target, 1024)
            .map_err(|e| TranscribeError::Audio(e.to_string()))?;
        let samples = resampler
            .resample_all(&self.samples)
            .map_err(|e| TranscribeError::Audio(e.to_string()))?;
        Ok(Self::new(samples, target))
    }
}

/// Reads a PCM WAV file as 16kHz mono.
///
/// Multi-channel input is averaged down to mono; other sample rates are resampled.
pub fn load_wav(path: &Path) -> TranscribeResult<AudioBuffer> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        TranscribeError::Audio(format!("Failed to open '{}': {}", path.display(), e))
    })?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.bits_per_sample == 0 {
        return Err(TranscribeError::Audio(format!(
            "'{}' declares {} channels at {} bits",
            path.display(),
            spec.channels,
            spec.bits_per_sample
        )));
    }

    let interleaved: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };
    let interleaved = interleaved.map_err(|e| {
        TranscribeError::Audio(format!("Failed to decode '{}': {}", path.display(), e))
    })?;

    let mono = downmix(&interleaved, spec.channels as usize);
    debug!(
        path = %path.display(),
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        samples = mono.len(),
        "WAV loaded"
    );

    AudioBuffer::new(mono, spec.sample_rate).into_sample_rate(SAMPLE_RATE)
}

/// Writes mono samples as 16-bit PCM WAV.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> TranscribeResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_audio_err =
        |e: hound::Error| TranscribeError::Audio(format!("Failed to write '{}': {}", path.display(), e));

    let mut writer = hound::WavWriter::create(path, spec).map_err(to_audio_err)?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(pcm).map_err(to_audio_err)?;
    }
    writer.finalize().map_err(to_audio_err)
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// A chunk's audio spilled to disk for a file-based recognizer.
///
/// The file is removed when the artifact is dropped, whatever the recognition outcome.
#[derive(Debug)]
pub struct ChunkArtifact {
    path: PathBuf,
}

impl ChunkArtifact {
    pub fn write(dir: &Path, index: usize, samples: &[f32], sample_rate: u32) -> TranscribeResult<Self> {
        let path = dir.join(format!("chunk-{:05}.wav", index));
        if let Err(e) = write_wav(&path, samples, sample_rate) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ChunkArtifact {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "Could not delete chunk file: {}", e);
            }
        }
    }
}
