use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Backend returned {status}: {message}")]
    BackendError { status: u16, message: String },
    #[error("Decode error: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("STK push rejected: {0}")]
    StkPushRejected(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Transport error: {0}")]
    TransportError(String),
}

pub type Result<T> = std::result::Result<T, PollError>;
