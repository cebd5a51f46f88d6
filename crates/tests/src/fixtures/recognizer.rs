use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use whisperfleet_transcription::{
    DeviceId, LocalSegment, ModelConfig, RecognitionInput, Recognizer, RecognizerFactory,
    TaskKind,
};

/// Recognizer stand-in that echoes its inputs back as text.
///
/// Every chunk yields one segment spanning the chunk, reading
/// `"{language}:{task}"` with `auto` when no hint reached the recognizer.
#[derive(Clone, Default)]
pub struct EchoFactory {
    loads: Arc<AtomicUsize>,
}

impl EchoFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of models loaded so far, across all devices.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl RecognizerFactory for EchoFactory {
    fn load(&self, _device: DeviceId, _config: &ModelConfig) -> anyhow::Result<Box<dyn Recognizer>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EchoRecognizer))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

struct EchoRecognizer;

impl Recognizer for EchoRecognizer {
    fn recognize(
        &mut self,
        input: RecognitionInput<'_>,
        language: Option<&str>,
        task: TaskKind,
    ) -> anyhow::Result<Vec<LocalSegment>> {
        let duration = input.samples.len() as f64 / input.sample_rate as f64;
        let text = format!("{}:{}", language.unwrap_or("auto"), task);
        Ok(vec![LocalSegment::new(0.0, duration, text)])
    }

    fn name(&self) -> &str {
        "echo"
    }
}
