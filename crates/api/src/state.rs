use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use whisperfleet_config::{Settings, TranscriptionSettings};
use whisperfleet_transcription::{
    EnergyDetector, RecognizerFactory, SpeechDetector, SpeechParams, TranscribeError,
    TranscribeResult, TranscriptionConfig, TranscriptionService,
};

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub service: Arc<TranscriptionService>,
}

impl AppState {
    pub fn new(settings: Settings, service: Arc<TranscriptionService>) -> Self {
        Self { settings, service }
    }

    /// Builds the service with the recognizer and detector compiled into this binary.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let config = transcription_config(&settings.transcription)?;
        let factory = recognizer_factory(&config)?;
        let detector = speech_detector(&config)?;
        let service = TranscriptionService::new(config, factory, detector)?;
        Ok(Self::new(settings, Arc::new(service)))
    }
}

/// Maps layered settings onto the core configuration.
pub fn transcription_config(settings: &TranscriptionSettings) -> TranscribeResult<TranscriptionConfig> {
    let defaults = TranscriptionConfig::default();
    let config = TranscriptionConfig {
        model_size: settings.model_size.clone(),
        compute_type: settings.compute_type.parse()?,
        language: settings.language.clone(),
        device_ids: settings.device_ids.clone(),
        max_workers: settings.max_workers,
        acquire_timeout_secs: settings.acquire_timeout_secs,
        min_chunk_secs: settings.min_chunk_secs,
        max_chunk_secs: settings.max_chunk_secs,
        scratch_dir: settings
            .scratch_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or(defaults.scratch_dir),
        whisper_model_dir: settings.whisper_model_dir.clone(),
        vad_model_path: settings.vad_model_path.clone(),
        vad_threshold: settings.vad_threshold,
        vad_min_speech_ms: settings.vad_min_speech_ms,
        vad_min_silence_ms: settings.vad_min_silence_ms,
        vad_speech_pad_ms: settings.vad_speech_pad_ms,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "local-whisper")]
fn recognizer_factory(config: &TranscriptionConfig) -> anyhow::Result<Arc<dyn RecognizerFactory>> {
    use whisperfleet_transcription::asr::local_whisper::WhisperFactory;

    let model_dir = config.whisper_model_dir.clone().unwrap_or_else(|| "models".to_string());
    info!(%model_dir, "Using local Whisper recognizer");
    Ok(Arc::new(WhisperFactory::new(model_dir)))
}

#[cfg(not(feature = "local-whisper"))]
fn recognizer_factory(_config: &TranscriptionConfig) -> anyhow::Result<Arc<dyn RecognizerFactory>> {
    Err(TranscribeError::Config(
        "no recognizer backend compiled in; rebuild with --features local-whisper".to_string(),
    )
    .into())
}

fn speech_detector(config: &TranscriptionConfig) -> anyhow::Result<Arc<dyn SpeechDetector>> {
    let params = SpeechParams::from(config);

    #[cfg(feature = "vad")]
    if let Some(path) = &config.vad_model_path {
        let vad = whisperfleet_transcription::vad::SileroVad::new(path, params)?;
        info!(model_path = %path, "Using Silero VAD");
        return Ok(Arc::new(vad));
    }

    if config.vad_model_path.is_some() && !cfg!(feature = "vad") {
        warn!("vad_model_path is set but the vad feature is disabled; using energy VAD");
    }
    info!("Using energy VAD");
    Ok(Arc::new(EnergyDetector::new(params)))
}
