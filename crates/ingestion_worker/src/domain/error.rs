use thiserror::Error;

/// Reasons an inbound body cannot be decoded into an envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("protocol version must be an integer, got {0}")]
    InvalidVersion(String),
}

pub type EnvelopeResult<T> = std::result::Result<T, EnvelopeError>;
