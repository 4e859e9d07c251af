use shared::error::ValidationError;
use thiserror::Error;

/// The upload endpoint could not turn the attachment into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Network(String),
    #[error("upload rejected with HTTP status {status}")]
    Rejected { status: u16 },
    #[error("upload response is malformed: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("failed to open channel {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("channel closed before it opened")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("a session is already connecting or open")]
    AlreadyActive,
    #[error("the pending attachment is already being uploaded")]
    UploadInFlight,
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}
