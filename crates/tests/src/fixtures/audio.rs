use std::path::{Path, PathBuf};

/// Rate the synthetic fixtures are written at.
pub const FIXTURE_RATE: u32 = 16_000;

/// Builds mono audio from `(seconds, amplitude)` pieces of a 220 Hz tone.
///
/// An amplitude of 0.0 gives digital silence.
pub fn tone_pattern(pieces: &[(f64, f32)]) -> Vec<f32> {
    let mut samples = Vec::new();
    for &(secs, amplitude) in pieces {
        let count = (secs * FIXTURE_RATE as f64).round() as usize;
        samples.extend((0..count).map(|i| {
            let t = i as f32 / FIXTURE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
        }));
    }
    samples
}

/// Writes `samples` as a 16-bit mono WAV named `name` inside `dir`.
pub fn write_wav(dir: &Path, name: &str, samples: &[f32]) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: FIXTURE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("Failed to create WAV fixture");
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).expect("Failed to write WAV sample");
    }
    writer.finalize().expect("Failed to finalize WAV fixture");
    path
}

/// Two bursts of tone separated by three seconds of silence.
pub fn two_bursts() -> Vec<f32> {
    tone_pattern(&[(0.5, 0.0), (2.0, 0.5), (3.0, 0.0), (2.0, 0.5), (0.5, 0.0)])
}
