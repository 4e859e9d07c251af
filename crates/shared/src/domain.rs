use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const SYSTEM_NICKNAME: &str = "System";

/// Name an operator connects under. Trimmed, non-empty, never the system sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyDisplayName);
        }
        if trimmed.eq_ignore_ascii_case(SYSTEM_NICKNAME) {
            return Err(ValidationError::ReservedDisplayName {
                name: trimmed.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sender {
    System,
    User(String),
    /// The frame named nobody.
    Unknown,
}

impl Sender {
    pub fn from_nickname(nickname: &str) -> Self {
        if nickname == SYSTEM_NICKNAME {
            Self::System
        } else {
            Self::User(nickname.to_string())
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    pub fn nickname(&self) -> Option<&str> {
        match self {
            Self::System => Some(SYSTEM_NICKNAME),
            Self::User(name) => Some(name),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
}

/// When a message happened. Origin values are whatever the server sent and are
/// kept verbatim; arrival time is only recorded when the frame carried none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    Origin(String),
    Arrival(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorship {
    System,
    Own,
    Other,
}

/// A chat record as it sits in the message log. Fields are read-only; the kind
/// is fixed by the constructor that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: Sender,
    body: String,
    attachment: Option<AttachmentRef>,
    kind: MessageKind,
    timestamp: Timestamp,
}

impl Message {
    pub fn text(sender: Sender, body: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            sender,
            body: body.into(),
            attachment: None,
            kind: MessageKind::Text,
            timestamp,
        }
    }

    /// An image message. The URL may be missing when the server relayed an
    /// image frame without one; renderers degrade to the body text.
    pub fn image(
        sender: Sender,
        body: impl Into<String>,
        url: Option<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender,
            body: body.into(),
            attachment: url.map(|url| AttachmentRef { url }),
            kind: MessageKind::Image,
            timestamp,
        }
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachment(&self) -> Option<&AttachmentRef> {
        self.attachment.as_ref()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn authorship(&self, local: &DisplayName) -> Authorship {
        match &self.sender {
            Sender::System => Authorship::System,
            Sender::User(name) if name == local.as_str() => Authorship::Own,
            Sender::User(_) | Sender::Unknown => Authorship::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}
