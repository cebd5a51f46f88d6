use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub transcription: TranscriptionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionSettings {
    pub model_size: String,
    /// "float16", "int8" or "float32".
    pub compute_type: String,
    /// Default language hint; "auto" or unset means detect.
    pub language: Option<String>,
    pub device_ids: Vec<u32>,
    pub max_workers: usize,
    pub acquire_timeout_secs: u64,
    pub min_chunk_secs: f64,
    pub max_chunk_secs: f64,
    /// Session scratch root. Unset means the system temp dir.
    pub scratch_dir: Option<String>,
    pub whisper_model_dir: Option<String>,
    /// Silero ONNX model; unset falls back to the energy detector.
    pub vad_model_path: Option<String>,
    pub vad_threshold: f32,
    pub vad_min_speech_ms: u32,
    pub vad_min_silence_ms: u32,
    pub vad_speech_pad_ms: u32,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    /// Layered sources: `config/default`, `config/local`, then `WHISPERFLEET__*`
    /// environment variables (`transcription.device_ids` as a comma list).
    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("WHISPERFLEET")
                    .prefix_separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("transcription.device_ids"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("transcription.model_size", "large-v3-turbo")?
            .set_default("transcription.compute_type", "float16")?
            .set_default("transcription.language", None::<String>)?
            .set_default("transcription.device_ids", vec![0])?
            .set_default("transcription.max_workers", 2)?
            .set_default("transcription.acquire_timeout_secs", 300)?
            .set_default("transcription.min_chunk_secs", 15.0)?
            .set_default("transcription.max_chunk_secs", 45.0)?
            .set_default("transcription.scratch_dir", None::<String>)?
            .set_default("transcription.whisper_model_dir", "models")?
            .set_default("transcription.vad_model_path", None::<String>)?
            .set_default("transcription.vad_threshold", 0.5)?
            .set_default("transcription.vad_min_speech_ms", 250)?
            .set_default("transcription.vad_min_silence_ms", 100)?
            .set_default("transcription.vad_speech_pad_ms", 30)
    }
}
