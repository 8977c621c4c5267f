//! # Image-over-text codec
//!
//! Turns a photo into a single SMS body and back again.
//!
//! ## Pipeline
//!
//! ```text
//! SEND                                        RENDER
//! ┌──────────────────────────┐                ┌───────────────────────────┐
//! │ RawImage                 │                │ message body (String)     │
//! │   ↓                      │                │   ↓                       │
//! │ Compressor  (JPEG, bytes)│                │ classify → MessageBody    │
//! │   ↓                      │   SMS body     │   ↓ (Envelope only)       │
//! │ encode      (marker+b64) │ ──────────►    │ decode → DecodedImage     │
//! └──────────────────────────┘                └───────────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                                  |
//! |------------- |----------------------------------------------------------|
//! | `types`      | `RawImage`, `CompressedImage`, `RasterCodec`             |
//! | `envelope`   | Marker format, versions, `Envelope`, `MessageBody`       |
//! | `backend`    | `RasterBackend` trait and the `image`-based JPEG backend |
//! | `compressor` | Bounded quality / dimension search under a byte budget   |
//! | `encoder`    | `CompressedImage` → envelope text within a char budget   |
//! | `detector`   | Body classification and failure-placeholder recognition  |
//! | `decoder`    | Envelope text → original JPEG bytes                      |

pub mod backend;
pub mod compressor;
pub mod decoder;
pub mod detector;
pub mod encoder;
pub mod envelope;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use backend::{JpegBackend, RasterBackend, SourceImage};
pub use compressor::{Compressor, CompressorSettings, Interrupt};
pub use decoder::{DecodedImage, decode, decode_body};
pub use detector::{classify, is_failure_placeholder, validate_payload};
pub use encoder::{encode, encoded_len, envelope_len, max_payload_bytes};
pub use envelope::{
    Envelope, EnvelopeView, FormatVersion, MARKER, MARKER_LEN, Malformed, MalformedReason,
    MessageBody, failure_placeholder,
};
pub use types::{CompressedImage, RasterCodec, RawImage};
