//! Envelope encoder.
//!
//! Wraps compressed bytes as `MARKER ++ base64(bytes)`. The size check runs
//! before anything is allocated, so a too-large image costs nothing but a
//! multiplication. Shrinking and retrying is the composer's job.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::codec::envelope::{Envelope, FormatVersion, MARKER_LEN};
use crate::codec::types::CompressedImage;
use crate::error::CodecError;

/// Characters of padded base64 for `byte_len` input bytes.
pub const fn encoded_len(byte_len: usize) -> usize {
    byte_len.div_ceil(3) * 4
}

/// Total envelope length, marker included, for `byte_len` payload bytes.
pub const fn envelope_len(byte_len: usize) -> usize {
    MARKER_LEN + encoded_len(byte_len)
}

/// Largest payload (in bytes) whose envelope fits in `char_budget`.
pub const fn max_payload_bytes(char_budget: usize) -> usize {
    char_budget.saturating_sub(MARKER_LEN) / 4 * 3
}

/// Encode a compressor output into an envelope of at most `char_budget`
/// characters.
pub fn encode(image: &CompressedImage, char_budget: usize) -> Result<Envelope, CodecError> {
    encode_bytes(&image.bytes, char_budget)
}

/// Encode raw payload bytes. Empty payloads are refused: they would
/// produce a body the detector classifies as malformed.
pub fn encode_bytes(bytes: &[u8], char_budget: usize) -> Result<Envelope, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Other("refusing to encode an empty image".into()));
    }

    let chars = envelope_len(bytes.len());
    if chars > char_budget {
        return Err(CodecError::EncodingTooLarge {
            chars,
            budget: char_budget,
        });
    }

    let version = FormatVersion::CURRENT;
    let mut text = String::with_capacity(chars);
    text.push_str(version.marker());
    STANDARD.encode_string(bytes, &mut text);
    debug_assert_eq!(text.len(), chars);

    Ok(Envelope::from_parts(version, text))
}
