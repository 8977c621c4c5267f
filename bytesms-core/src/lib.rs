//! # bytesms-core
//!
//! Photos over plain SMS. An image is squeezed into a JPEG that fits the
//! transport's character budget, wrapped as `::img1:<base64>`, and sent as
//! an ordinary text message. The receiving side tells envelopes apart from
//! human text and turns them back into bytes.
//!
//! This crate contains:
//! - **Codec**: `Compressor`, `encode`, `classify`, `decode` and the
//!   envelope wire format
//! - **Budget**: GSM-7 / UCS-2 segmentation and the byte budget derived from it
//! - **Composer**: single-flight, last-pick-wins draft with a send guard
//! - **Render**: memoized, never-failing body rendering and list previews
//! - **Gateway**: `TransportGateway` / `MessageStore` seams plus an in-memory implementation
//! - **Poller**: cancellable periodic refresh with jitter and backoff
//! - **Error**: `CodecError`, `DecodeError`, `TransportError`, `ComposeError`

pub mod address;
pub mod budget;
pub mod codec;
pub mod composer;
pub mod error;
pub mod gateway;
pub mod poller;
pub mod render;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use address::normalize_number;
pub use budget::{Charset, CompressionBudget, TransportProfile};
pub use codec::{
    CompressedImage, Compressor, CompressorSettings, DecodedImage, Envelope, EnvelopeView,
    FormatVersion, JpegBackend, MARKER, MalformedReason, MessageBody, RasterBackend, RasterCodec,
    RawImage, classify, decode, decode_body, encode, is_failure_placeholder,
};
pub use composer::{
    Composer, ComposerConfig, Draft, DraftState, PickHandle, PickOutcome, guard_outgoing,
    prepare_envelope,
};
pub use error::{CodecError, ComposeError, DecodeError, SendBlocked, TransportError};
pub use gateway::{
    ConversationSummary, Direction, MemoryGateway, MessageStore, StoredMessage, TransportGateway,
};
pub use poller::{Poller, PollerConfig};
pub use render::{RenderCache, Rendered, render_body, summarize};
