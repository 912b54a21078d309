use thiserror::Error;

#[derive(Error, Debug)]
pub enum TarjimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Library database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Audio extraction error: {0}")]
    Transcode(String),

    #[error("Transcription error: {0}")]
    Transcribe(String),

    #[error("Translation error: {0}")]
    Translate(String),

    #[error("Subtitle error: {0}")]
    Subtitle(String),

    #[error("Status store error: {0}")]
    Status(String),

    #[error("Another batch job is already running: {0}")]
    Conflict(String),

    #[error("Orchestrator fault: {0}")]
    Orchestrator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, TarjimError>;
