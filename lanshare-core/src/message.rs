use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A direct point-to-point message. Never persisted; kept only in the
/// sender's and recipient's in-memory lists for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_to: Option<String>,
}

/// Deterministic, dependency-stable conversation fingerprint for an
/// unordered pair of usernames: the first 5 hex characters of
/// `sha256("{min}:{max}")`.
pub fn conversation_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(format!("{lo}:{hi}").as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..5].to_string()
}

fn random_message_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// In-memory store of messages this host has sent or received.
pub struct MessageChannel {
    username: String,
    messages: Mutex<Vec<Message>>,
}

impl MessageChannel {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Build an outbound message addressed to `recipient` and record it
    /// locally. The caller is responsible for putting it on the wire.
    pub fn compose(
        &self,
        recipient: &str,
        title: &str,
        content: &str,
        reply_to: Option<String>,
        now: DateTime<Utc>,
    ) -> Message {
        let message = Message {
            id: random_message_id(),
            sender: self.username.clone(),
            recipient: recipient.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            timestamp: now,
            conversation_id: conversation_id(&self.username, recipient),
            reply_to,
        };
        self.messages.lock().push(message.clone());
        message
    }

    /// Handle an inbound message datagram. Only stored if addressed to us;
    /// the timestamp is rewritten to arrival time, not the sender's clock.
    pub fn receive(&self, mut incoming: Message, arrived_at: DateTime<Utc>) {
        if incoming.recipient != self.username {
            return;
        }
        incoming.timestamp = arrived_at;
        self.messages.lock().push(incoming);
    }

    pub fn list_all(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn list_conversation(&self, other: &str) -> Vec<Message> {
        let cid = conversation_id(&self.username, other);
        self.messages
            .lock()
            .iter()
            .filter(|m| m.conversation_id == cid)
            .cloned()
            .collect()
    }
}
