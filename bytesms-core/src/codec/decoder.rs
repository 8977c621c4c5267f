//! Envelope decoder.
//!
//! Exact inverse of the encoder's text transform. It re-validates length
//! and alphabet on its own so a body that slipped past the detector still
//! yields a [`DecodeError`] and never a panic in the render path.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::codec::envelope::{EnvelopeView, FormatVersion, strip_marker};
use crate::codec::types::RasterCodec;
use crate::error::DecodeError;

/// Bytes recovered from an envelope plus the codec inferred from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Bytes,
    pub codec: RasterCodec,
    pub version: FormatVersion,
}

impl DecodedImage {
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Pixel dimensions read from the image header, if the bytes are a
    /// readable image. Does not decode pixel data.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        image::ImageReader::new(Cursor::new(&self.bytes[..]))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

/// Decode a detector-approved envelope.
pub fn decode(envelope: EnvelopeView<'_>) -> Result<DecodedImage, DecodeError> {
    decode_payload(envelope.version(), envelope.payload())
}

/// Decode a raw body, checking the marker first. Useful where no
/// [`classify`](crate::codec::classify) step ran, e.g. bodies read
/// straight from disk.
pub fn decode_body(body: &str) -> Result<DecodedImage, DecodeError> {
    let (version, payload) = strip_marker(body).ok_or(DecodeError::NotAnEnvelope)?;
    decode_payload(version, payload)
}

fn decode_payload(version: FormatVersion, payload: &str) -> Result<DecodedImage, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    if payload.len() % 4 != 0 {
        return Err(DecodeError::InvalidLength(payload.len()));
    }

    let bytes = STANDARD.decode(payload)?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedImage {
        codec: RasterCodec::sniff(&bytes),
        bytes: Bytes::from(bytes),
        version,
    })
}
