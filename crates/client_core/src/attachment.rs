use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{error::ValidationError, protocol::UploadResponse};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::UploadError;

pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const UPLOAD_FIELD_NAME: &str = "image";

#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(
        file_name: impl Into<String>,
        media_type: Option<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type,
            bytes: bytes.into(),
        }
    }

    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read image file '{}'", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        let media_type = mime_guess::from_path(path).first_raw().map(str::to_string);
        Ok(Self {
            file_name,
            media_type,
            bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPreview {
    pub attachment_id: Uuid,
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub data_url: String,
}

#[derive(Debug, Clone)]
pub struct PendingAttachment {
    id: Uuid,
    bytes: Vec<u8>,
    preview: AttachmentPreview,
}

impl PendingAttachment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.preview.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.preview.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn preview(&self) -> &AttachmentPreview {
        &self.preview
    }
}

pub fn select_image(file: ImageFile) -> Result<PendingAttachment, ValidationError> {
    let size = file.bytes.len() as u64;
    if size > MAX_IMAGE_BYTES {
        return Err(ValidationError::TooLarge {
            size,
            limit: MAX_IMAGE_BYTES,
        });
    }

    let media_type = match file.media_type.as_deref().map(normalize_media_type) {
        Some(media_type) if is_image_media_type(&media_type) => media_type,
        _ => {
            return Err(ValidationError::UnsupportedType {
                media_type: file.media_type,
            })
        }
    };

    let id = Uuid::new_v4();
    let data_url = format!("data:{media_type};base64,{}", STANDARD.encode(&file.bytes));
    Ok(PendingAttachment {
        id,
        preview: AttachmentPreview {
            attachment_id: id,
            file_name: file.file_name,
            media_type,
            size_bytes: size,
            data_url,
        },
        bytes: file.bytes,
    })
}

fn normalize_media_type(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

#[async_trait]
pub trait UploadEndpoint: Send + Sync {
    async fn upload(&self, attachment: &PendingAttachment) -> Result<String, UploadError>;
}

pub struct HttpUploadEndpoint {
    http: Client,
    endpoint: Url,
}

impl HttpUploadEndpoint {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl UploadEndpoint for HttpUploadEndpoint {
    async fn upload(&self, attachment: &PendingAttachment) -> Result<String, UploadError> {
        info!(
            attachment_id = %attachment.id(),
            file_name = attachment.file_name(),
            size_bytes = attachment.bytes().len(),
            endpoint = %self.endpoint,
            "chat: uploading attachment"
        );

        let part = Part::bytes(attachment.bytes().to_vec())
            .file_name(attachment.file_name().to_string())
            .mime_str(attachment.media_type())
            .map_err(|err| UploadError::Network(format!("invalid media type: {err}")))?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat: upload rejected");
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| UploadError::Network(err.to_string()))?;
        let parsed: UploadResponse = serde_json::from_slice(&body)
            .map_err(|err| UploadError::MalformedResponse(err.to_string()))?;
        if parsed.image_url.trim().is_empty() {
            return Err(UploadError::MalformedResponse(
                "imageUrl is empty".to_string(),
            ));
        }

        Ok(parsed.image_url)
    }
}

#[cfg(test)]
#[path = "tests/attachment_tests.rs"]
mod tests;
