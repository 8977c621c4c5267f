//! File-backed message store.
//!
//! One [`StoredMessage`] per line, JSON-encoded, append-only. The file
//! plays the role of the phone's SMS provider: `send` appends an outbound
//! record, `deliver` appends an inbound one, and both collaborator traits
//! read the whole file back. Unparseable lines are skipped with a warning
//! so one corrupt record never hides the rest of the history.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use bytesms_core::budget::TransportProfile;
use bytesms_core::error::TransportError;
use bytesms_core::gateway::{
    ConversationSummary, Direction, MessageStore, StoredMessage, TransportGateway, now_ms,
    summarize_conversations, thread_of,
};

pub struct Mailbox {
    path: PathBuf,
    profile: TransportProfile,
    /// Serializes appends so ids stay unique within this process.
    write_lock: Mutex<()>,
}

impl Mailbox {
    pub fn new(path: impl Into<PathBuf>, profile: TransportProfile) -> Self {
        Self {
            path: path.into(),
            profile,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in file order. A missing file is an empty mailbox.
    pub async fn load(&self) -> Result<Vec<StoredMessage>, TransportError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredMessage>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping unreadable mailbox record"
                ),
            }
        }
        Ok(messages)
    }

    /// Append an inbound message, as if the network delivered it.
    pub async fn deliver(&self, address: &str, body: &str) -> Result<StoredMessage, TransportError> {
        self.append(address, body, Direction::Inbound).await
    }

    async fn append(
        &self,
        address: &str,
        body: &str,
        direction: Direction,
    ) -> Result<StoredMessage, TransportError> {
        let _guard = self.write_lock.lock().await;
        let existing = self.load().await?;

        let id = existing.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let last_ts = existing.iter().map(|m| m.timestamp_ms).max().unwrap_or(0);
        let msg = StoredMessage {
            id,
            address: address.to_string(),
            body: body.to_string(),
            timestamp_ms: now_ms().max(last_ts + 1),
            direction,
        };

        let mut line = serde_json::to_string(&msg)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(id, address, ?direction, chars = body.len(), "mailbox record appended");
        Ok(msg)
    }
}

#[async_trait]
impl TransportGateway for Mailbox {
    fn profile(&self) -> TransportProfile {
        self.profile
    }

    async fn send(&self, address: &str, body: &str) -> Result<StoredMessage, TransportError> {
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
        self.append(address, body, Direction::Outbound).await
    }
}

#[async_trait]
impl MessageStore for Mailbox {
    async fn conversations(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        Ok(summarize_conversations(&self.load().await?))
    }

    async fn messages(&self, address: &str) -> Result<Vec<StoredMessage>, TransportError> {
        Ok(thread_of(&self.load().await?, address))
    }
}
