use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::net::TcpListener;
use whisperfleet_api::{build_router, state::{AppState, transcription_config}};
use whisperfleet_config::{AppSettings, Settings, TranscriptionSettings};
use whisperfleet_transcription::{EnergyDetector, SpeechParams, TranscriptionService};

use super::audio;
use super::recognizer::EchoFactory;

/// A running API server backed by the echo recognizer and the energy VAD.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub client: reqwest::Client,
    pub service: Arc<TranscriptionService>,
    pub factory: EchoFactory,
    /// Holds WAV fixtures and session scratch space for this app.
    pub workdir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn a test server with customized settings.
    ///
    /// The `mutator` closure receives a `&mut Settings` after defaults are applied.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let workdir = TempDir::new().expect("Failed to create test workdir");

        let mut settings = test_settings();
        settings.transcription.scratch_dir =
            Some(workdir.path().join("scratch").to_string_lossy().into_owned());
        mutator(&mut settings);

        let config = transcription_config(&settings.transcription)
            .expect("Invalid test transcription settings");
        let factory = EchoFactory::new();
        let detector = EnergyDetector::new(SpeechParams::from(&config));
        let service = Arc::new(
            TranscriptionService::new(config, Arc::new(factory.clone()), Arc::new(detector))
                .expect("Failed to create TranscriptionService"),
        );

        let app_state = AppState::new(settings.clone(), service.clone());
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            addr,
            base_url,
            settings,
            client,
            service,
            factory,
            workdir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Writes a WAV fixture into this app's workdir and returns its path.
    pub fn wav(&self, name: &str, samples: &[f32]) -> PathBuf {
        audio::write_wav(self.workdir.path(), name, samples)
    }

    pub async fn transcribe(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/transcribe"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Number of session directories still present under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        match std::fs::read_dir(self.workdir.path().join("scratch")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}

fn test_settings() -> Settings {
    Settings {
        app: AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        transcription: TranscriptionSettings {
            model_size: "tiny".to_string(),
            compute_type: "int8".to_string(),
            language: Some("en".to_string()),
            device_ids: vec![0, 1],
            max_workers: 2,
            acquire_timeout_secs: 5,
            min_chunk_secs: 1.0,
            max_chunk_secs: 5.0,
            scratch_dir: None,
            whisper_model_dir: None,
            vad_model_path: None,
            vad_threshold: 0.5,
            vad_min_speech_ms: 250,
            vad_min_silence_ms: 100,
            vad_speech_pad_ms: 30,
        },
    }
}
