use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShareError>;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Incomplete frame: expected {expected} bytes, got {got}")]
    IncompleteFrame { expected: usize, got: usize },

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Failed to bind socket: {0}")]
    BindFailure(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Transfer incomplete: {0}")]
    IncompleteTransfer(String),

    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ShareError {
    fn from(err: std::io::Error) -> Self {
        ShareError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(err: serde_json::Error) -> Self {
        ShareError::Serialization(err.to_string())
    }
}
