use bytes::Bytes;
use serde_json::Value;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

/// Message fanned out to every connected SSE client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseMessage {
    Data(String),
    /// Ends every open stream.
    Shutdown,
}

/// One broadcast channel, one receiver per connected browser.
#[derive(Debug, Clone)]
pub struct SseStreams {
    tx: broadcast::Sender<SseMessage>,
}

impl Default for SseStreams {
    fn default() -> Self {
        SseStreams::new(100)
    }
}

impl SseStreams {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        SseStreams { tx }
    }

    /// Returns how many clients received the message.
    pub fn broadcast<S: Into<String>>(&self, data: S) -> usize {
        self.tx.send(SseMessage::Data(data.into())).unwrap_or(0)
    }

    pub fn broadcast_json(&self, value: &Value) -> usize {
        self.broadcast(value.to_string())
    }

    pub fn close(&self) {
        let _ = self.tx.send(SseMessage::Shutdown);
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// A new client stream of `data: <payload>\n\n\n` frames. Ends on [`SseStreams::close`].
    pub fn subscribe(&self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe())
            .take_while(|message| !matches!(message, Ok(SseMessage::Shutdown)))
            .filter_map(|message| match message {
                Ok(SseMessage::Data(data)) => Some(Ok(frame(&data))),
                Ok(SseMessage::Shutdown) => None,
                Err(lagged) => {
                    tracing::debug!("[SSE] client fell behind: {}", lagged);
                    None
                }
            })
    }
}

pub fn frame(data: &str) -> Bytes {
    Bytes::from(format!("data: {data}\n\n\n"))
}
