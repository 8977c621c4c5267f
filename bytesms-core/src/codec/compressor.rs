//! Budgeted image compressor.
//!
//! Re-encodes a [`RawImage`] as a baseline JPEG no larger than
//! [`CompressionBudget::max_bytes`] using a bounded search:
//!
//! 1. Cap the longer edge at `max_dimension` (aspect ratio preserved) and
//!    encode at the initial quality.
//! 2. While over budget, step quality down until it reaches the floor, then
//!    halve the longer edge.
//! 3. Give up with [`CodecError::BudgetExceeded`] after `max_iterations`
//!    attempts or once the image cannot shrink further.
//!
//! An [`Interrupt`] is checked before every attempt so a superseded or
//! overdue compression stops at the next step boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::budget::CompressionBudget;
use crate::codec::backend::{JpegBackend, RasterBackend};
use crate::codec::types::{CompressedImage, RawImage};
use crate::error::CodecError;

// ── CompressorSettings ───────────────────────────────────────────

/// Search policy for [`Compressor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorSettings {
    /// Quality of the first attempt (clamped up to the budget's floor).
    pub initial_quality: u8,
    /// Quality decrement per over-budget attempt.
    pub quality_step: u8,
    /// Longer edge below which the image is never halved.
    pub min_dimension: u32,
    /// Hard cap on encode attempts.
    pub max_iterations: u32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            initial_quality: 60,
            quality_step: 20,
            min_dimension: 16,
            max_iterations: 6,
        }
    }
}

// ── Interrupt ────────────────────────────────────────────────────

/// Cooperative cancellation and deadline for one compression.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: Option<CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl Interrupt {
    /// Never interrupts.
    pub fn none() -> Self {
        Self::default()
    }

    /// Stop when `token` is cancelled or `timeout` (from now) elapses.
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token: Some(token),
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    /// `Err(Cancelled)` or `Err(Timeout)` once the compression should stop.
    pub fn check(&self) -> Result<(), CodecError> {
        if self.token.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(CodecError::Cancelled);
        }
        match self.deadline {
            Some((at, budget)) if Instant::now() >= at => Err(CodecError::Timeout(budget)),
            _ => Ok(()),
        }
    }
}

// ── Compressor ───────────────────────────────────────────────────

/// Stateless, thread-safe compressor. Share it behind an `Arc`.
pub struct Compressor {
    backend: Arc<dyn RasterBackend>,
    settings: CompressorSettings,
}

impl Compressor {
    /// JPEG backend with default settings.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(JpegBackend::new()), CompressorSettings::default())
    }

    pub fn with_backend(backend: Arc<dyn RasterBackend>, settings: CompressorSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    /// Compress without cancellation or deadline.
    pub fn compress(
        &self,
        raw: &RawImage,
        budget: &CompressionBudget,
    ) -> Result<CompressedImage, CodecError> {
        self.compress_with(raw, budget, &Interrupt::none())
    }

    /// Compress, checking `interrupt` before every attempt.
    pub fn compress_with(
        &self,
        raw: &RawImage,
        budget: &CompressionBudget,
        interrupt: &Interrupt,
    ) -> Result<CompressedImage, CodecError> {
        interrupt.check()?;
        let source = self.backend.load(raw)?;
        let (src_w, src_h) = (source.width(), source.height());

        let floor = budget.min_quality.clamp(1, 100);
        let mut quality = self.settings.initial_quality.clamp(floor, 100);
        let mut edge = budget.max_dimension.max(1).min(src_w.max(src_h));
        let mut best = usize::MAX;

        for attempt in 1..=self.settings.max_iterations {
            interrupt.check()?;

            let (width, height) = fit_within(src_w, src_h, edge);
            let bytes = self.backend.encode(&source, width, height, quality)?;
            debug!(
                attempt,
                width,
                height,
                quality,
                size = bytes.len(),
                budget = budget.max_bytes,
                "compression attempt"
            );

            if bytes.len() <= budget.max_bytes {
                return Ok(CompressedImage {
                    bytes,
                    width,
                    height,
                    quality,
                });
            }
            best = best.min(bytes.len());

            if quality > floor {
                quality = quality.saturating_sub(self.settings.quality_step).max(floor);
            } else if edge > self.settings.min_dimension {
                edge = (edge / 2).max(self.settings.min_dimension);
            } else {
                break;
            }
        }

        warn!(
            best,
            budget = budget.max_bytes,
            source_w = src_w,
            source_h = src_h,
            "image does not fit the byte budget"
        );
        Err(CodecError::BudgetExceeded {
            best,
            budget: budget.max_bytes,
        })
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scale `(width, height)` so the longer edge is at most `max_edge`,
/// preserving aspect ratio. Never upscales; never returns a zero side.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max_edge || long == 0 {
        return (width.max(1), height.max(1));
    }
    let scale = |side: u32| -> u32 {
        let scaled = (side as u64 * max_edge as u64 + long as u64 / 2) / long as u64;
        (scaled as u32).max(1)
    };
    (scale(width), scale(height))
}

// ── Tests ────────────────────────────────────────────────────────
