use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use shared::{
    domain::{ConnectionState, DisplayName, Message},
    error::ValidationError,
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod attachment;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod message_log;
pub mod transport;

pub use attachment::{
    AttachmentPreview, HttpUploadEndpoint, ImageFile, PendingAttachment, UploadEndpoint,
};
pub use config::ClientSettings;
pub use error::{SessionError, TransportError, UploadError};
pub use message_log::MessageLog;
pub use transport::{ChannelConnector, ChannelHandle, TransportEvent, WebSocketConnector};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    MessageAppended { index: usize, message: Message },
    SessionEnded { reason: Option<String> },
    PendingAttachmentChanged(Option<AttachmentPreview>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    NotConnected,
}

struct PendingSlot {
    attachment: PendingAttachment,
    uploading: bool,
}

struct SessionState {
    display_name: Option<DisplayName>,
    connection: ConnectionState,
    // Bumped on every connect so a superseded channel cannot touch state.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound_task: Option<JoinHandle<()>>,
    pending: Option<PendingSlot>,
    log: MessageLog,
}

/// Client side of one chat connection at a time: channel lifecycle, the
/// single pending attachment slot, and the log of received messages.
///
/// Sent messages are not appended locally; they show up in the log when the
/// server echoes them back.
pub struct ChatSession {
    settings: ClientSettings,
    connector: Arc<dyn ChannelConnector>,
    uploader: Arc<dyn UploadEndpoint>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(settings: ClientSettings) -> Result<Arc<Self>> {
        let uploader = HttpUploadEndpoint::new(settings.upload_url()?);
        Ok(Self::new_with_dependencies(
            settings,
            Arc::new(WebSocketConnector),
            Arc::new(uploader),
        ))
    }

    pub fn new_with_dependencies(
        settings: ClientSettings,
        connector: Arc<dyn ChannelConnector>,
        uploader: Arc<dyn UploadEndpoint>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            settings,
            connector,
            uploader,
            inner: Mutex::new(SessionState {
                display_name: None,
                connection: ConnectionState::Disconnected,
                generation: 0,
                outbound: None,
                inbound_task: None,
                pending: None,
                log: MessageLog::new(),
            }),
            events,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.connection
    }

    pub async fn display_name(&self) -> Option<DisplayName> {
        self.inner.lock().await.display_name.clone()
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().await.log.snapshot()
    }

    pub async fn pending_attachment(&self) -> Option<AttachmentPreview> {
        let guard = self.inner.lock().await;
        guard
            .pending
            .as_ref()
            .map(|slot| slot.attachment.preview().clone())
    }

    /// Invalid names fail before any state changes. A channel that fails to
    /// open leaves the session `Closed`.
    pub async fn connect(self: &Arc<Self>, raw_name: &str) -> Result<(), SessionError> {
        let name = DisplayName::parse(raw_name)?;
        let url = self.settings.ws_url(&name)?;

        let generation = {
            let mut guard = self.inner.lock().await;
            if guard.connection.is_active() {
                return Err(SessionError::AlreadyActive);
            }
            guard.generation += 1;
            guard.display_name = Some(name.clone());
            guard.outbound = None;
            // The log is per connection; the server replays history on join.
            guard.log = MessageLog::new();
            self.set_state(&mut guard, ConnectionState::Connecting);
            guard.generation
        };
        info!(nickname = %name, %url, "chat: connecting");

        let handle = match self.connector.open(url).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(nickname = %name, %err, "chat: channel failed to open");
                let mut guard = self.inner.lock().await;
                if guard.generation == generation && guard.connection.is_active() {
                    self.close_locked(&mut guard, Some(err.to_string()));
                }
                return Err(err.into());
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.generation != generation || guard.connection != ConnectionState::Connecting {
            debug!(nickname = %name, "chat: channel opened after the session ended; dropping it");
            return Err(TransportError::Closed.into());
        }
        guard.outbound = Some(handle.outbound);
        let session = Arc::clone(self);
        guard.inbound_task = Some(tokio::spawn(
            session.pump_inbound(generation, handle.inbound),
        ));
        self.set_state(&mut guard, ConnectionState::Open);
        info!(nickname = %name, "chat: channel open");
        Ok(())
    }

    pub async fn disconnect(&self) {
        let mut guard = self.inner.lock().await;
        if !guard.connection.is_active() {
            return;
        }
        if let Some(task) = guard.inbound_task.take() {
            task.abort();
        }
        info!("chat: disconnecting");
        self.close_locked(&mut guard, None);
    }

    pub async fn send(
        &self,
        text: &str,
        attachment_url: Option<&str>,
    ) -> Result<SendOutcome, SessionError> {
        let guard = self.inner.lock().await;
        if !guard.connection.is_open() {
            debug!(state = %guard.connection, "chat: send ignored while not connected");
            return Ok(SendOutcome::NotConnected);
        }
        let Some(outbound) = guard.outbound.as_ref() else {
            return Ok(SendOutcome::NotConnected);
        };

        let frame = codec::encode_outbound(text, attachment_url)?;
        let payload = serde_json::to_string(&frame)?;
        if outbound.send(payload).is_err() {
            warn!("chat: channel writer is gone; dropping outbound frame");
            return Ok(SendOutcome::NotConnected);
        }
        debug!(kind = ?frame.kind, "chat: frame sent");
        Ok(SendOutcome::Sent)
    }

    /// Sends what the operator composed: uploads the pending attachment first
    /// when there is one. A failed upload sends nothing and keeps the
    /// attachment pending so the operator can retry.
    pub async fn submit(&self, text: &str) -> Result<SendOutcome, SessionError> {
        let attachment = {
            let mut guard = self.inner.lock().await;
            if !guard.connection.is_open() {
                return Ok(SendOutcome::NotConnected);
            }
            match guard.pending.as_mut() {
                None => None,
                Some(slot) if slot.uploading => return Err(SessionError::UploadInFlight),
                Some(slot) => {
                    slot.uploading = true;
                    Some(slot.attachment.clone())
                }
            }
        };

        let Some(attachment) = attachment else {
            return self.send(text, None).await;
        };

        let url = match self.uploader.upload(&attachment).await {
            Ok(url) => url,
            Err(err) => {
                warn!(
                    attachment_id = %attachment.id(),
                    %err,
                    "chat: attachment upload failed; keeping it pending"
                );
                self.finish_upload(attachment.id(), false).await;
                return Err(err.into());
            }
        };

        let outcome = self.send(text, Some(&url)).await;
        let consumed = matches!(outcome, Ok(SendOutcome::Sent));
        self.finish_upload(attachment.id(), consumed).await;
        outcome
    }

    pub async fn select_image(&self, file: ImageFile) -> Result<AttachmentPreview, ValidationError> {
        let attachment = attachment::select_image(file)?;
        let preview = attachment.preview().clone();

        let mut guard = self.inner.lock().await;
        guard.pending = Some(PendingSlot {
            attachment,
            uploading: false,
        });
        let _ = self
            .events
            .send(SessionEvent::PendingAttachmentChanged(Some(preview.clone())));
        Ok(preview)
    }

    pub async fn clear_pending(&self) {
        let mut guard = self.inner.lock().await;
        if guard.pending.take().is_some() {
            let _ = self
                .events
                .send(SessionEvent::PendingAttachmentChanged(None));
        }
    }

    async fn finish_upload(&self, attachment_id: Uuid, consumed: bool) {
        let mut guard = self.inner.lock().await;
        let still_pending = guard
            .pending
            .as_ref()
            .is_some_and(|slot| slot.attachment.id() == attachment_id);
        if !still_pending {
            return;
        }

        if consumed {
            guard.pending = None;
            let _ = self
                .events
                .send(SessionEvent::PendingAttachmentChanged(None));
        } else if let Some(slot) = guard.pending.as_mut() {
            slot.uploading = false;
        }
    }

    async fn pump_inbound(
        self: Arc<Self>,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Frame(raw) => self.handle_inbound_frame(generation, &raw).await,
                TransportEvent::Closed { reason } => {
                    self.handle_channel_closed(generation, reason).await;
                    return;
                }
            }
        }
        self.handle_channel_closed(generation, None).await;
    }

    async fn handle_inbound_frame(&self, generation: u64, raw: &str) {
        let message = match codec::decode_inbound(raw, Utc::now()) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "chat: dropping malformed inbound frame");
                return;
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.generation != generation || !guard.connection.is_open() {
            debug!("chat: dropping frame from a channel that is no longer current");
            return;
        }
        let index = guard.log.append(message.clone());
        let _ = self
            .events
            .send(SessionEvent::MessageAppended { index, message });
    }

    async fn handle_channel_closed(&self, generation: u64, reason: Option<String>) {
        let mut guard = self.inner.lock().await;
        if guard.generation != generation || !guard.connection.is_active() {
            return;
        }
        // This runs on the inbound task itself; detach rather than abort.
        guard.inbound_task = None;
        info!(
            reason = reason.as_deref().unwrap_or("none"),
            "chat: channel closed"
        );
        self.close_locked(&mut guard, reason);
    }

    fn close_locked(&self, guard: &mut SessionState, reason: Option<String>) {
        guard.outbound = None;
        self.set_state(guard, ConnectionState::Closed);
        let _ = self.events.send(SessionEvent::SessionEnded { reason });
    }

    fn set_state(&self, guard: &mut SessionState, state: ConnectionState) {
        guard.connection = state;
        let _ = self.events.send(SessionEvent::StateChanged(state));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
