use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::asr::{LocalSegment, RecognitionInput, Recognizer, RecognizerFactory};
use crate::worker::{DeviceId, ModelConfig};
use crate::vad::SpeechDetector;
use crate::{SpeechInterval, TaskKind};

/// Scripted recognizer behaviour for one chunk index.
#[derive(Debug, Clone)]
pub enum Script {
    /// Chunk-local (start, end, text) segments.
    Segments(Vec<(f64, f64, &'static str)>),
    Fail(&'static str),
    Panic,
}

/// In-memory recognizer factory. Unscripted chunks yield one segment
/// spanning the chunk with text `chunk <index>`.
#[derive(Clone, Default)]
pub struct FakeFactory {
    scripts: Arc<HashMap<usize, Script>>,
    failing: Arc<HashSet<DeviceId>>,
    load_delay: Duration,
    recognize_delay: Duration,
    wants_file: bool,
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    seen_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, index: usize, script: Script) -> Self {
        Arc::make_mut(&mut self.scripts).insert(index, script);
        self
    }

    pub fn failing_on(mut self, device: DeviceId) -> Self {
        Arc::make_mut(&mut self.failing).insert(device);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Every recognize call sleeps this long first.
    pub fn with_recognize_delay(mut self, delay: Duration) -> Self {
        self.recognize_delay = delay;
        self
    }

    pub fn wanting_files(mut self) -> Self {
        self.wants_file = true;
        self
    }

    /// Number of chunks that reached a recognizer.
    pub fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn load_count(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }

    /// WAV paths that existed when the recognizer was called.
    pub fn seen_paths(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        self.seen_paths.clone()
    }
}

impl RecognizerFactory for FakeFactory {
    fn load(&self, device: DeviceId, _config: &ModelConfig) -> anyhow::Result<Box<dyn Recognizer>> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if self.failing.contains(&device) {
            anyhow::bail!("out of memory on device {}", device);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRecognizer {
            factory: self.clone(),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeRecognizer {
    factory: FakeFactory,
}

impl Recognizer for FakeRecognizer {
    fn recognize(
        &mut self,
        input: RecognitionInput<'_>,
        _language: Option<&str>,
        _task: TaskKind,
    ) -> anyhow::Result<Vec<LocalSegment>> {
        self.factory.calls.fetch_add(1, Ordering::SeqCst);
        if !self.factory.recognize_delay.is_zero() {
            std::thread::sleep(self.factory.recognize_delay);
        }
        if let Some(path) = input.wav_path {
            if path.exists() {
                self.factory.seen_paths.lock().push(path.to_path_buf());
            }
        }

        match self.factory.scripts.get(&input.index) {
            Some(Script::Segments(segments)) => Ok(segments
                .iter()
                .map(|&(start, end, text)| LocalSegment::new(start, end, text))
                .collect()),
            Some(Script::Fail(message)) => anyhow::bail!("{}", message),
            Some(Script::Panic) => panic!("recognizer crashed on chunk {}", input.index),
            None => {
                let duration = input.samples.len() as f64 / input.sample_rate as f64;
                Ok(vec![LocalSegment::new(0.0, duration, format!("chunk {}", input.index))])
            }
        }
    }

    fn wants_file(&self) -> bool {
        self.factory.wants_file
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Detector that reports the same intervals for any audio.
pub struct FixedDetector {
    intervals: Vec<SpeechInterval>,
}

impl FixedDetector {
    pub fn new(intervals: Vec<SpeechInterval>) -> Self {
        Self { intervals }
    }
}

impl SpeechDetector for FixedDetector {
    fn detect_speech(&self, _samples: &[f32], _sample_rate: u32) -> anyhow::Result<Vec<SpeechInterval>> {
        Ok(self.intervals.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
