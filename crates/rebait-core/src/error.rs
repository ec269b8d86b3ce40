use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebaitError {
    #[error("Could not extract video ID from input: {input}")]
    IdentifierNotFound { input: String },

    #[error("No transcripts available for video {video_id}")]
    NoTranscriptAvailable { video_id: String },

    #[error("All metadata methods failed for video {video_id}: {last_error}")]
    AllMetadataMethodsFailed { video_id: String, last_error: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("{provider} request failed with status {status} ({code}): {message}")]
    ProviderError {
        provider: String,
        status: u16,
        code: String,
        message: String,
    },

    #[error("Extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RebaitError>;
