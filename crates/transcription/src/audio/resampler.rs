use rubato::{
    Async as AsyncResampler, FixedAsync, Resampler as RubatoResampler,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use audioadapter_buffers::direct::InterleavedSlice;

/// Resamples mono audio between two fixed rates using sinc interpolation.
pub struct Resampler {
    inner: AsyncResampler<f32>,
    /// Accumulator for input samples that don't fill a complete chunk.
    pending: Vec<f32>,
    /// Number of input frames the resampler expects per process() call.
    chunk_size: usize,
    ratio: f64,
}

impl Resampler {
    /// Creates a mono resampler from `from_rate` Hz to `to_rate` Hz.
    ///
    /// `chunk_size` is the number of input frames per resampling call.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            anyhow::bail!("Sample rates must be non-zero ({} -> {})", from_rate, to_rate);
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = to_rate as f64 / from_rate as f64;

        let inner = AsyncResampler::<f32>::new_sinc(
            ratio,
            2.0,               // max relative ratio
            &params,
            chunk_size,
            1,                 // mono channel
            FixedAsync::Input, // fixed input size
        )
        .map_err(|e| anyhow::anyhow!("Failed to create resampler: {}", e))?;

        Ok(Self {
            inner,
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            ratio,
        })
    }

    /// Feeds mono samples and returns whatever resampled output is ready.
    ///
    /// Buffers internally if input doesn't fill a complete resampler chunk.
    pub fn process(&mut self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();

        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            let frames = chunk.len(); // mono: 1 sample = 1 frame
            let input_adapter = InterleavedSlice::new(&chunk, 1, frames)
                .map_err(|e| anyhow::anyhow!("Input adapter error: {}", e))?;

            let resampled = self
                .inner
                .process(&input_adapter, 0, None)
                .map_err(|e| anyhow::anyhow!("Resample error: {}", e))?;

            output.extend(resampled.take_data());
        }

        Ok(output)
    }

    /// Flushes any remaining buffered samples (with zero-padding).
    pub fn flush(&mut self) -> anyhow::Result<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        self.pending.resize(self.chunk_size, 0.0);
        self.process(&[])
    }

    /// Resamples a whole buffer with the filter delay removed, so output
    /// sample `i` lines up with input time `i / ratio`. The output length is
    /// exactly `round(input.len() * ratio)`.
    pub fn resample_all(&mut self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        let expected = (input.len() as f64 * self.ratio).round() as usize;
        let delay = self.inner.output_delay();

        let mut output = self.process(input)?;
        output.extend(self.flush()?);
        // Push silence through until the delayed tail has come out.
        let silence = vec![0.0; self.chunk_size];
        while output.len() < delay + expected {
            let more = self.process(&silence)?;
            if more.is_empty() {
                break;
            }
            output.extend(more);
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }
}
