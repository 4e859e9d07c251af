use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("display name must not be empty")]
    EmptyDisplayName,
    #[error("display name '{name}' is reserved")]
    ReservedDisplayName { name: String },
    #[error("message must carry text or an image")]
    EmptyMessage,
    #[error("unsupported file type: {}", .media_type.as_deref().unwrap_or("unknown"))]
    UnsupportedType { media_type: Option<String> },
    #[error("file is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

/// A malformed inbound frame. Callers log and drop it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has neither text nor image")]
    EmptyBody,
}
