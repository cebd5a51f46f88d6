use std::time::Duration;

use thiserror::Error;

use crate::worker::DeviceId;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Worker on device {device} failed to load model: {message}")]
    WorkerInit { device: DeviceId, message: String },
    #[error("No worker became available within {waited:?}")]
    PoolExhausted { waited: Duration },
    #[error("Worker pool is shut down")]
    PoolShutdown,
    #[error("Audio error: {0}")]
    Audio(String),
    #[error("Voice activity detection failed: {0}")]
    Vad(String),
    #[error("Session storage error: {0}")]
    Session(#[from] std::io::Error),
}

pub type TranscribeResult<T> = Result<T, TranscribeError>;
