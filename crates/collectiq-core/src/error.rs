use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectIqError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Payer error: {0}")]
    Payer(String),

    #[error("Carrier error: {0}")]
    Carrier(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CollectIqError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Payer(_) => "payer",
            Self::Carrier(_) => "carrier",
            Self::Speech(_) => "speech",
            Self::Transcription(_) => "transcription",
            Self::Persistence(_) => "persistence",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectIqError>;
