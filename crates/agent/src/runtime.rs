use std::collections::HashMap;
use std::sync::Mutex;

use medchat_core::domain::consultation::{Message, SessionId};
use serde::Serialize;
use tokio::sync::broadcast;

pub const DEFAULT_STREAM_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Chunk { message_id: String, index: usize, content: String },
    #[serde(rename_all = "camelCase")]
    Done { message_id: String },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
        }
    }
}

/// Paragraphs of an assistant reply, in order, blank ones dropped.
pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n").map(str::trim).filter(|paragraph| !paragraph.is_empty()).collect()
}

/// Per-session broadcast of assistant replies. A channel exists only once a
/// client subscribes; replies for sessions nobody watches are dropped.
pub struct StreamHub {
    channels: Mutex<HashMap<SessionId, broadcast::Sender<StreamEvent>>>,
    capacity: usize,
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}

impl StreamHub {
    pub fn new(capacity: usize) -> Self {
        Self { channels: Mutex::new(HashMap::new()), capacity: capacity.max(1) }
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, broadcast::Sender<StreamEvent>>> {
        match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<StreamEvent> {
        let mut channels = self.channels();
        channels
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publishes one chunk per paragraph followed by `Done`. Returns the
    /// number of chunks delivered to at least one subscriber.
    pub fn publish(&self, session_id: &SessionId, message: &Message) -> usize {
        let sender = {
            let mut channels = self.channels();
            match channels.get(session_id) {
                Some(sender) if sender.receiver_count() > 0 => sender.clone(),
                Some(_) => {
                    channels.remove(session_id);
                    return 0;
                }
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (index, content) in paragraphs(&message.content).into_iter().enumerate() {
            let event = StreamEvent::Chunk {
                message_id: message.id.clone(),
                index,
                content: content.to_string(),
            };
            if sender.send(event).is_ok() {
                delivered += 1;
            }
        }
        let _ = sender.send(StreamEvent::Done { message_id: message.id.clone() });
        delivered
    }

    /// Drops channels whose subscribers have all gone away. Returns the
    /// number removed.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub fn close(&self, session_id: &SessionId) {
        self.channels().remove(session_id);
    }

    pub fn active_sessions(&self) -> usize {
        self.channels().len()
    }
}
