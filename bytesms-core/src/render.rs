//! Render path: body → text, image, or broken-image placeholder.
//!
//! Rendering never fails. Every classification or decode problem becomes
//! [`Rendered::Broken`], so one bad message cannot take the rest of a
//! thread down with it.
//!
//! [`RenderCache`] memoizes per message id. A list refresh that hands back
//! the same bodies costs one `blake3` hash per message and no base64 work.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{DecodedImage, MessageBody, RasterCodec, classify, decode, is_failure_placeholder};
use crate::gateway::StoredMessage;

/// Label shown in place of an image in previews.
pub const PHOTO_LABEL: &str = "[photo]";
/// Label for bodies that carry the marker but cannot be shown.
pub const BROKEN_LABEL: &str = "[broken image]";
/// Label for an attachment that was never encoded.
pub const UNSENT_LABEL: &str = "[image not sent]";

// ── Rendered ─────────────────────────────────────────────────────

/// What the UI should draw for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Image(DecodedImage),
    Broken { reason: String },
}

impl Rendered {
    pub fn is_image(&self) -> bool {
        matches!(self, Rendered::Image(_))
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, Rendered::Broken { .. })
    }
}

/// Classify and, for envelopes, decode one body.
pub fn render_body(body: &str) -> Rendered {
    match classify(body) {
        MessageBody::PlainText(text) => Rendered::Text(text.to_string()),
        MessageBody::Malformed(m) => Rendered::Broken {
            reason: m.reason.to_string(),
        },
        MessageBody::Envelope(view) => match decode(view) {
            Ok(image) if image.codec == RasterCodec::Unknown => Rendered::Broken {
                reason: "payload is not a recognised image".into(),
            },
            Ok(image) => Rendered::Image(image),
            Err(e) => Rendered::Broken {
                reason: e.to_string(),
            },
        },
    }
}

/// One-line conversation-list preview of a body, at most `max_chars`
/// characters of text.
pub fn summarize(body: &str, max_chars: usize) -> String {
    if is_failure_placeholder(body) {
        return UNSENT_LABEL.to_string();
    }
    match classify(body) {
        MessageBody::Envelope(_) => PHOTO_LABEL.to_string(),
        MessageBody::Malformed(_) => BROKEN_LABEL.to_string(),
        MessageBody::PlainText(text) => {
            let flat: String = text
                .chars()
                .map(|c| if c.is_whitespace() { ' ' } else { c })
                .collect();
            let flat = flat.trim();
            if flat.chars().count() <= max_chars {
                flat.to_string()
            } else {
                let mut out: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
                out.push('…');
                out
            }
        }
    }
}

// ── RenderCache ──────────────────────────────────────────────────

struct CacheEntry {
    fingerprint: blake3::Hash,
    rendered: Arc<Rendered>,
}

/// Bounded memo of rendered messages keyed by message id.
///
/// An entry is reused only while the body hashes the same; a changed body
/// (e.g. the store rewrote it) is re-rendered. When full, the oldest
/// inserted entry is evicted.
pub struct RenderCache {
    entries: HashMap<u64, CacheEntry>,
    order: VecDeque<u64>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Render `body` for message `id`, reusing a previous result when the
    /// body is unchanged.
    pub fn render(&mut self, id: u64, body: &str) -> Arc<Rendered> {
        let fingerprint = blake3::hash(body.as_bytes());
        if let Some(entry) = self.entries.get(&id) {
            if entry.fingerprint == fingerprint {
                self.hits += 1;
                trace!(id, "render cache hit");
                return entry.rendered.clone();
            }
        }

        self.misses += 1;
        let rendered = Arc::new(render_body(body));
        if let Rendered::Broken { reason } = rendered.as_ref() {
            debug!(id, %reason, "message rendered as broken image");
        }
        self.insert(id, fingerprint, rendered.clone());
        rendered
    }

    /// Render every message of a thread in order. Broken messages render
    /// as placeholders; the rest are unaffected.
    pub fn render_thread(&mut self, messages: &[StoredMessage]) -> Vec<Arc<Rendered>> {
        messages
            .iter()
            .map(|m| self.render(m.id, &m.body))
            .collect()
    }

    pub fn invalidate(&mut self, id: u64) {
        if self.entries.remove(&id).is_some() {
            self.order.retain(|&k| k != id);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn insert(&mut self, id: u64, fingerprint: blake3::Hash, rendered: Arc<Rendered>) {
        let entry = CacheEntry {
            fingerprint,
            rendered,
        };
        if self.entries.insert(id, entry).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(512)
    }
}
