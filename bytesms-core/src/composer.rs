//! Outgoing message composer.
//!
//! Owns the draft of one conversation and drives the send pipeline:
//!
//! ```text
//! pick(raw) ──► cancel previous token, generation += 1, draft = Compressing
//!                 │
//!                 ▼  spawn_blocking + timeout
//!           compress ─► encode ─(too large)─► tighten budget, retry
//!                 │
//!                 ▼
//!           publish only if generation is still current
//! ```
//!
//! Every draft mutation (`pick`, `set_text`, `clear`, a send) bumps the
//! generation, so a compression that finishes late can never overwrite
//! something newer. The draft is published on a `watch` channel; UIs
//! subscribe and re-render on change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::{
    CompressionBudget, DEFAULT_MAX_DIMENSION, DEFAULT_MIN_QUALITY, TransportProfile,
};
use crate::codec::{
    Compressor, Envelope, Interrupt, MessageBody, RawImage, classify, encode,
    is_failure_placeholder,
};
use crate::error::{CodecError, ComposeError, SendBlocked};
use crate::gateway::{StoredMessage, TransportGateway};

// ── ComposerConfig ───────────────────────────────────────────────

/// Send-path policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerConfig {
    pub profile: TransportProfile,
    pub max_dimension: u32,
    pub min_quality: u8,
    /// Wall-clock budget for one pick, tightening rounds included.
    pub timeout: Duration,
    /// How many times to retry with a 10% smaller byte budget when the
    /// envelope comes out too long.
    pub tightening_rounds: u32,
    /// Starting byte ceiling. `None` derives it from the profile.
    pub max_bytes: Option<usize>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            profile: TransportProfile::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            min_quality: DEFAULT_MIN_QUALITY,
            timeout: Duration::from_secs(15),
            tightening_rounds: 3,
            max_bytes: None,
        }
    }
}

impl ComposerConfig {
    pub fn char_budget(&self) -> usize {
        self.profile.char_budget()
    }

    /// Byte budget for the first compression attempt.
    pub fn compression_budget(&self) -> CompressionBudget {
        let mut budget = CompressionBudget::for_transport(
            self.char_budget(),
            self.max_dimension,
            self.min_quality,
        );
        if let Some(max_bytes) = self.max_bytes {
            budget.max_bytes = max_bytes;
        }
        budget
    }
}

// ── Draft ────────────────────────────────────────────────────────

/// Contents of the outgoing message field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Draft {
    #[default]
    Empty,
    Text(String),
    /// An image pick is being compressed.
    Compressing,
    /// A ready-to-send envelope.
    Image(Envelope),
    /// The last pick failed; the user may retry or clear.
    Failed(CodecError),
}

/// A draft tagged with the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DraftState {
    pub generation: u64,
    pub draft: Draft,
}

// ── Pick handles ─────────────────────────────────────────────────

/// Result of one pick, whether or not it reached the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOutcome {
    pub generation: u64,
    /// `false` when a newer draft mutation superseded this pick.
    pub applied: bool,
    pub result: Result<Envelope, CodecError>,
}

/// Handle to an in-flight pick.
#[derive(Debug)]
pub struct PickHandle {
    generation: u64,
    handle: JoinHandle<PickOutcome>,
}

impl PickHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the pick to settle.
    pub async fn wait(self) -> PickOutcome {
        let generation = self.generation;
        self.handle.await.unwrap_or_else(|e| PickOutcome {
            generation,
            applied: false,
            result: Err(e.into()),
        })
    }
}

// ── Composer ─────────────────────────────────────────────────────

pub struct Composer {
    compressor: Arc<Compressor>,
    config: ComposerConfig,
    state: Arc<watch::Sender<DraftState>>,
    inflight: Mutex<Option<CancellationToken>>,
}

impl Composer {
    pub fn new(config: ComposerConfig) -> Self {
        Self::with_compressor(Arc::new(Compressor::new()), config)
    }

    pub fn with_compressor(compressor: Arc<Compressor>, config: ComposerConfig) -> Self {
        let (state, _) = watch::channel(DraftState::default());
        Self {
            compressor,
            config,
            state: Arc::new(state),
            inflight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Receiver that observes every published draft.
    pub fn subscribe(&self) -> watch::Receiver<DraftState> {
        self.state.subscribe()
    }

    /// Snapshot of the current draft.
    pub fn current(&self) -> DraftState {
        self.state.borrow().clone()
    }

    /// Start compressing `raw` into the draft. Any earlier pick still
    /// running is cancelled and its result discarded.
    pub fn pick(&self, raw: RawImage) -> PickHandle {
        let token = CancellationToken::new();
        let generation = self.replace_draft(Draft::Compressing, Some(token.clone()));
        info!(generation, bytes = raw.byte_len(), mime = %raw.mime_type, "image picked");

        let compressor = self.compressor.clone();
        let config = self.config.clone();
        let state = self.state.clone();
        let timeout = config.timeout;

        let handle = tokio::spawn(async move {
            let interrupt = Interrupt::new(token.clone(), Some(timeout));
            let work = tokio::task::spawn_blocking(move || {
                prepare_envelope(&compressor, &raw, &config, &interrupt)
            });

            let result = tokio::select! {
                _ = token.cancelled() => Err(CodecError::Cancelled),
                joined = tokio::time::timeout(timeout, work) => match joined {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => {
                        // Let the blocking worker notice at its next step.
                        token.cancel();
                        Err(CodecError::Timeout(timeout))
                    }
                },
            };

            let applied = publish(&state, generation, &result);
            match (&result, applied) {
                (Ok(env), true) => info!(generation, chars = env.len(), "image ready"),
                (Err(e), true) => warn!(generation, error = %e, "image preparation failed"),
                (_, false) => debug!(generation, "discarding superseded pick"),
            }
            PickOutcome {
                generation,
                applied,
                result,
            }
        });

        PickHandle { generation, handle }
    }

    /// Replace the draft with typed text, superseding any pending pick.
    pub fn set_text(&self, text: impl Into<String>) -> u64 {
        let text = text.into();
        let draft = if text.is_empty() {
            Draft::Empty
        } else {
            Draft::Text(text)
        };
        self.replace_draft(draft, None)
    }

    /// Empty the draft, superseding any pending pick.
    pub fn clear(&self) -> u64 {
        self.replace_draft(Draft::Empty, None)
    }

    /// Guard the draft and take its body, leaving the draft empty.
    pub fn take_outgoing(&self) -> Result<String, SendBlocked> {
        self.take().map(|(_, _, body)| body)
    }

    /// Guard, transmit, and clear the draft. When the gateway fails the
    /// draft is put back unless the user changed it in the meantime.
    pub async fn send(
        &self,
        gateway: &dyn TransportGateway,
        address: &str,
    ) -> Result<StoredMessage, ComposeError> {
        let (taken_at, draft, body) = self.take()?;
        match gateway.send(address, &body).await {
            Ok(msg) => {
                info!(id = msg.id, address, chars = body.len(), "message sent");
                Ok(msg)
            }
            Err(e) => {
                warn!(address, error = %e, "send failed, restoring draft");
                self.state.send_if_modified(|s| {
                    if s.generation != taken_at {
                        return false;
                    }
                    s.generation += 1;
                    s.draft = draft;
                    true
                });
                Err(e.into())
            }
        }
    }

    fn take(&self) -> Result<(u64, Draft, String), SendBlocked> {
        let current = self.current();
        let body = match &current.draft {
            Draft::Empty => return Err(SendBlocked::Empty),
            Draft::Compressing => return Err(SendBlocked::Pending),
            Draft::Failed(e) => return Err(SendBlocked::Failed(e.clone())),
            Draft::Text(text) => {
                guard_outgoing(text)?;
                let segments = self.config.profile.segments_needed(text);
                if segments > self.config.profile.max_segments {
                    return Err(SendBlocked::TooLong {
                        segments,
                        max: self.config.profile.max_segments,
                    });
                }
                text.clone()
            }
            Draft::Image(env) => {
                guard_outgoing(env.as_str())?;
                env.as_str().to_owned()
            }
        };

        let mut taken_at = None;
        self.state.send_if_modified(|s| {
            if s.generation != current.generation {
                return false;
            }
            s.generation += 1;
            s.draft = Draft::Empty;
            taken_at = Some(s.generation);
            true
        });
        // A pick completing between the snapshot and here changed the draft.
        let taken_at = taken_at.ok_or(SendBlocked::Pending)?;
        Ok((taken_at, current.draft, body))
    }

    /// Install `draft` under a fresh generation and swap the in-flight
    /// token. Both happen under one lock so generations and tokens pair up.
    fn replace_draft(&self, draft: Draft, token: Option<CancellationToken>) -> u64 {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = std::mem::replace(&mut *inflight, token) {
            previous.cancel();
        }
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.generation += 1;
            s.draft = draft;
            generation = s.generation;
        });
        generation
    }
}

impl Drop for Composer {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            if let Some(token) = inflight.take() {
                token.cancel();
            }
        }
    }
}

fn publish(
    state: &watch::Sender<DraftState>,
    generation: u64,
    result: &Result<Envelope, CodecError>,
) -> bool {
    if matches!(result, Err(CodecError::Cancelled)) {
        return false;
    }
    state.send_if_modified(|s| {
        if s.generation != generation {
            return false;
        }
        s.draft = match result {
            Ok(env) => Draft::Image(env.clone()),
            Err(e) => Draft::Failed(e.clone()),
        };
        true
    })
}

/// Refuse bodies that must never reach the transport: empty text, failure
/// placeholders, and anything carrying the marker that is not a valid
/// envelope.
pub fn guard_outgoing(body: &str) -> Result<(), SendBlocked> {
    if body.trim().is_empty() {
        return Err(SendBlocked::Empty);
    }
    if is_failure_placeholder(body) {
        return Err(SendBlocked::FailurePlaceholder);
    }
    match classify(body) {
        MessageBody::Malformed(m) => Err(SendBlocked::Malformed(m.reason)),
        MessageBody::PlainText(_) | MessageBody::Envelope(_) => Ok(()),
    }
}

/// Compress and encode `raw`, tightening the byte budget whenever the
/// envelope overshoots the transport's character budget.
pub fn prepare_envelope(
    compressor: &Compressor,
    raw: &RawImage,
    config: &ComposerConfig,
    interrupt: &Interrupt,
) -> Result<Envelope, CodecError> {
    let char_budget = config.char_budget();
    let mut budget = config.compression_budget();
    let mut round = 0;

    loop {
        let image = compressor.compress_with(raw, &budget, interrupt)?;
        match encode(&image, char_budget) {
            Err(CodecError::EncodingTooLarge { chars, .. })
                if round < config.tightening_rounds && budget.max_bytes > 1 =>
            {
                round += 1;
                budget = budget.tightened();
                debug!(
                    round,
                    chars,
                    char_budget,
                    max_bytes = budget.max_bytes,
                    "envelope too large, tightening"
                );
            }
            other => return other,
        }
    }
}
