//! A connector hands back a pair of queues: frames written to `outbound` are
//! sent as single text frames, and everything the channel delivers (frames,
//! then exactly one close) arrives on `inbound` in order. Dropping the
//! outbound sender closes the channel.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed { reason: Option<String> },
}

pub struct ChannelHandle {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, url: Url) -> Result<ChannelHandle, TransportError>;
}

pub struct WebSocketConnector;

/// Shared by both socket halves; whichever fails first reports the close and
/// nothing is forwarded after it.
#[derive(Clone)]
struct InboundSink {
    closed: Arc<AtomicBool>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl InboundSink {
    fn frame(&self, text: String) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.inbound.send(TransportEvent::Frame(text)).is_ok()
    }

    fn close(&self, reason: Option<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inbound.send(TransportEvent::Closed { reason });
        }
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn open(&self, url: Url) -> Result<ChannelHandle, TransportError> {
        let (ws_stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|err| TransportError::Connect {
                    url: url.to_string(),
                    reason: err.to_string(),
                })?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let reader_sink = InboundSink {
            closed: Arc::new(AtomicBool::new(false)),
            inbound: inbound_tx,
        };
        let writer_sink = reader_sink.clone();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(Message::Text(frame)).await {
                    warn!(%err, "chat: websocket send failed");
                    writer_sink.close(Some(err.to_string()));
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match ws_reader.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if !reader_sink.frame(text) {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if !reader_sink.frame(text) {
                                return;
                            }
                        }
                        Err(_) => debug!("chat: ignoring non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Some(err.to_string()),
                    None => break None,
                }
            };
            reader_sink.close(reason);
        });

        Ok(ChannelHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
