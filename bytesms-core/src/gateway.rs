//! Collaborator seams: the text transport and the message store.
//!
//! The codec never talks to a modem or a content provider. It hands one
//! string to a [`TransportGateway`] and reads strings back from a
//! [`MessageStore`]. Both traits are object-safe so the composer, poller
//! and CLI can work against `Arc<dyn ...>`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::budget::TransportProfile;
use crate::error::TransportError;

// ── Records ──────────────────────────────────────────────────────

/// Which way a stored message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Numeric type used by Android's SMS provider (1 = inbox, 2 = sent).
    pub const fn provider_type(self) -> u8 {
        match self {
            Direction::Inbound => 1,
            Direction::Outbound => 2,
        }
    }

    pub const fn from_provider_type(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(Direction::Inbound),
            2 => Some(Direction::Outbound),
            _ => None,
        }
    }
}

/// One message as the store persists it. `body` is opaque: plain text or
/// an envelope, exactly as transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub address: String,
    pub body: String,
    pub timestamp_ms: i64,
    pub direction: Direction,
}

/// Row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub thread_id: u64,
    pub address: String,
    pub last_message: String,
    pub timestamp_ms: i64,
    pub message_count: usize,
}

// ── Traits ───────────────────────────────────────────────────────

/// Sends opaque bodies over the text channel.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    /// Segmentation model the envelope budget is derived from.
    fn profile(&self) -> TransportProfile;

    /// Transmit `body` to `address` as one logical message.
    ///
    /// # Errors
    /// `Rejected` for bodies the channel cannot carry, `Unavailable` when
    /// the channel is down.
    async fn send(&self, address: &str, body: &str) -> Result<StoredMessage, TransportError>;
}

/// Read side of the message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// One summary per address, most recent conversation first.
    async fn conversations(&self) -> Result<Vec<ConversationSummary>, TransportError>;

    /// Every message exchanged with `address`, newest first.
    async fn messages(&self, address: &str) -> Result<Vec<StoredMessage>, TransportError>;
}

/// Group `messages` into conversation rows, newest conversation first.
///
/// Thread ids are assigned in order of each address's first appearance,
/// so they are stable for an append-only history.
pub fn summarize_conversations(messages: &[StoredMessage]) -> Vec<ConversationSummary> {
    let mut by_address: HashMap<&str, ConversationSummary> = HashMap::new();
    let mut next_thread = 1u64;

    for msg in messages {
        let entry = by_address.entry(msg.address.as_str()).or_insert_with(|| {
            let thread_id = next_thread;
            next_thread += 1;
            ConversationSummary {
                thread_id,
                address: msg.address.clone(),
                last_message: String::new(),
                timestamp_ms: i64::MIN,
                message_count: 0,
            }
        });
        entry.message_count += 1;
        if msg.timestamp_ms >= entry.timestamp_ms {
            entry.timestamp_ms = msg.timestamp_ms;
            entry.last_message.clone_from(&msg.body);
        }
    }

    let mut rows: Vec<_> = by_address.into_values().collect();
    rows.sort_by(|a, b| {
        b.timestamp_ms
            .cmp(&a.timestamp_ms)
            .then(a.thread_id.cmp(&b.thread_id))
    });
    rows
}

/// Messages exchanged with `address`, newest first.
pub fn thread_of(messages: &[StoredMessage], address: &str) -> Vec<StoredMessage> {
    let mut thread: Vec<_> = messages
        .iter()
        .filter(|m| m.address == address)
        .cloned()
        .collect();
    thread.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms).then(b.id.cmp(&a.id)));
    thread
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ── MemoryGateway ────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    messages: Vec<StoredMessage>,
    next_id: u64,
    last_ts: i64,
    offline: bool,
}

impl MemoryInner {
    fn push(&mut self, address: &str, body: &str, direction: Direction) -> StoredMessage {
        self.next_id += 1;
        // Strictly increasing so ordering is total even within one millisecond.
        self.last_ts = now_ms().max(self.last_ts + 1);
        let msg = StoredMessage {
            id: self.next_id,
            address: address.to_string(),
            body: body.to_string(),
            timestamp_ms: self.last_ts,
            direction,
        };
        self.messages.push(msg.clone());
        msg
    }
}

/// In-memory transport and store. Sent messages are appended to the
/// history immediately; [`deliver`](Self::deliver) simulates an inbound SMS.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    profile: TransportProfile,
    inner: Mutex<MemoryInner>,
}

impl MemoryGateway {
    pub fn new(profile: TransportProfile) -> Self {
        Self {
            profile,
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    /// Record an inbound message from `address`.
    pub fn deliver(&self, address: &str, body: &str) -> Result<StoredMessage, TransportError> {
        let mut inner = self.inner.lock().map_err(|_| TransportError::Unavailable)?;
        Ok(inner.push(address, body, Direction::Inbound))
    }

    /// Make subsequent sends fail with [`TransportError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = offline;
        }
    }

    /// Snapshot of the whole history in insertion order.
    pub fn all(&self) -> Vec<StoredMessage> {
        self.inner
            .lock()
            .map(|inner| inner.messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransportGateway for MemoryGateway {
    fn profile(&self) -> TransportProfile {
        self.profile
    }

    async fn send(&self, address: &str, body: &str) -> Result<StoredMessage, TransportError> {
        let mut inner = self.inner.lock().map_err(|_| TransportError::Unavailable)?;
        if inner.offline {
            return Err(TransportError::Unavailable);
        }
        if address.is_empty() {
            return Err(TransportError::Rejected("empty address".into()));
        }
        let segments = self.profile.segments_needed(body);
        if segments > self.profile.max_segments {
            return Err(TransportError::Rejected(format!(
                "{segments} segments exceeds limit of {}",
                self.profile.max_segments
            )));
        }
        Ok(inner.push(address, body, Direction::Outbound))
    }
}

#[async_trait]
impl MessageStore for MemoryGateway {
    async fn conversations(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        let inner = self.inner.lock().map_err(|_| TransportError::Unavailable)?;
        Ok(summarize_conversations(&inner.messages))
    }

    async fn messages(&self, address: &str) -> Result<Vec<StoredMessage>, TransportError> {
        let inner = self.inner.lock().map_err(|_| TransportError::Unavailable)?;
        Ok(thread_of(&inner.messages, address))
    }
}
