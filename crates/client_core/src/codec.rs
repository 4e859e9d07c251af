use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde_json::Value;
use shared::{
    domain::{Message, Sender, Timestamp},
    error::{DecodeError, ValidationError},
    protocol::{FrameKind, InboundFrame, OutboundFrame},
};

pub const IMAGE_PLACEHOLDER_TEXT: &str = "Image";

pub fn encode_outbound(
    text: &str,
    attachment_url: Option<&str>,
) -> Result<OutboundFrame, ValidationError> {
    match attachment_url {
        Some(url) => {
            let text = if text.trim().is_empty() {
                IMAGE_PLACEHOLDER_TEXT.to_string()
            } else {
                text.to_string()
            };
            Ok(OutboundFrame {
                text,
                kind: FrameKind::Image,
                image_url: Some(url.to_string()),
            })
        }
        None if text.trim().is_empty() => Err(ValidationError::EmptyMessage),
        None => Ok(OutboundFrame {
            text: text.to_string(),
            kind: FrameKind::Text,
            image_url: None,
        }),
    }
}

/// `arrival` is recorded only when the frame has no `time` of its own.
pub fn decode_inbound(raw: &str, arrival: DateTime<Utc>) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    // Serde would otherwise fill the struct positionally from an array.
    if !value.is_object() {
        return Err(serde_json::Error::custom("frame is not a JSON object").into());
    }
    let frame: InboundFrame = serde_json::from_value(value)?;

    let sender = match frame.nickname.as_deref().map(str::trim) {
        Some(nickname) if !nickname.is_empty() => Sender::from_nickname(nickname),
        _ => Sender::Unknown,
    };
    let body = frame.text.unwrap_or_default();
    let timestamp = match frame.time {
        Some(time) => Timestamp::Origin(time),
        None => Timestamp::Arrival(arrival),
    };

    let is_image = frame
        .kind
        .as_ref()
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.eq_ignore_ascii_case("image"));

    if is_image {
        let url = frame.image_url.filter(|url| !url.is_empty());
        if body.is_empty() && url.is_none() {
            return Err(DecodeError::EmptyBody);
        }
        Ok(Message::image(sender, body, url, timestamp))
    } else {
        if body.is_empty() {
            return Err(DecodeError::EmptyBody);
        }
        Ok(Message::text(sender, body, timestamp))
    }
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
