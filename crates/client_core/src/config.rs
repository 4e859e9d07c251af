use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use shared::domain::DisplayName;
use url::Url;

use crate::error::TransportError;

pub const DEFAULT_SETTINGS_FILE: &str = "chat.toml";

// Same unreserved characters as JavaScript's `encodeURIComponent`, minus `'`,
// which the url crate escapes in ws/wss queries anyway.
const NICKNAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub ws_path: String,
    pub upload_path: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            ws_path: "/ws".into(),
            upload_path: "/upload".into(),
        }
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

/// Defaults, then the flat TOML file at `path` if readable, then environment.
pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("ws_path") {
                settings.ws_path = v.clone();
            }
            if let Some(v) = file_cfg.get("upload_path") {
                settings.upload_path = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__WS_PATH") {
        settings.ws_path = v;
    }
    if let Ok(v) = std::env::var("APP__UPLOAD_PATH") {
        settings.upload_path = v;
    }

    settings
}

impl ClientSettings {
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    fn base_url(&self) -> anyhow::Result<Url> {
        let raw = self.server_url.trim().trim_end_matches('/');
        let url = Url::parse(raw).with_context(|| format!("invalid server url '{raw}'"))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(anyhow!(
                "server_url must start with http:// or https://, got '{other}://'"
            )),
        }
    }

    /// http becomes ws, https becomes wss. The display name is percent-encoded
    /// (`%20` for spaces) into the `nickname` query parameter.
    pub fn ws_url(&self, name: &DisplayName) -> Result<Url, TransportError> {
        let base = self
            .base_url()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let mut url = base
            .join(&self.ws_path)
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
        let query = format!(
            "nickname={}",
            utf8_percent_encode(name.as_str(), NICKNAME_ENCODE_SET)
        );
        url.set_query(Some(&query));
        Ok(url)
    }

    pub fn upload_url(&self) -> anyhow::Result<Url> {
        let base = self.base_url()?;
        base.join(&self.upload_path)
            .with_context(|| format!("invalid upload path '{}'", self.upload_path))
    }

    pub fn resolve_media_url(&self, raw: &str) -> Option<Url> {
        if let Ok(url) = Url::parse(raw) {
            return Some(url);
        }
        self.base_url().ok()?.join(raw).ok()
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
