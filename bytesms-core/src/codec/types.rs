//! Shared image types for the send and render pipelines.
//!
//! These are **transient** representations used between pipeline stages.
//! The only thing that outlives a call is the envelope string produced by
//! [`encode`](crate::codec::encoder::encode).

use bytes::Bytes;

// ── RasterCodec ──────────────────────────────────────────────────

/// Raster container inferred from leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterCodec {
    /// Baseline JPEG (`FF D8 FF`). The only codec the compressor emits.
    Jpeg,
    /// PNG (`89 50 4E 47`).
    Png,
    /// GIF87a / GIF89a.
    Gif,
    /// RIFF container with a `WEBP` form type.
    Webp,
    /// Anything else.
    Unknown,
}

impl RasterCodec {
    /// Infer the codec from the first bytes of a buffer.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            RasterCodec::Jpeg
        } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            RasterCodec::Png
        } else if data.starts_with(b"GIF8") {
            RasterCodec::Gif
        } else if data.starts_with(b"RIFF") && data.len() >= 12 && &data[8..12] == b"WEBP" {
            RasterCodec::Webp
        } else {
            RasterCodec::Unknown
        }
    }

    /// MIME type suitable for wrapping the bytes into a displayable resource.
    pub const fn mime_type(self) -> &'static str {
        match self {
            RasterCodec::Jpeg => "image/jpeg",
            RasterCodec::Png => "image/png",
            RasterCodec::Gif => "image/gif",
            RasterCodec::Webp => "image/webp",
            RasterCodec::Unknown => "application/octet-stream",
        }
    }

    /// Conventional file extension (without the dot).
    pub const fn extension(self) -> &'static str {
        match self {
            RasterCodec::Jpeg => "jpg",
            RasterCodec::Png => "png",
            RasterCodec::Gif => "gif",
            RasterCodec::Webp => "webp",
            RasterCodec::Unknown => "bin",
        }
    }
}

// ── RawImage ─────────────────────────────────────────────────────

/// An image exactly as the picker or camera handed it over.
///
/// `width` / `height` are what the acquisition layer reported and may be
/// zero when unknown; the compressor always trusts the decoded pixels.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Encoded source bytes (JPEG, PNG, HEIF-converted JPEG, ...).
    pub bytes: Bytes,
    /// Reported width in pixels (0 = unknown).
    pub width: u32,
    /// Reported height in pixels (0 = unknown).
    pub height: u32,
    /// MIME type reported by the source, e.g. `image/jpeg`.
    pub mime_type: String,
}

impl RawImage {
    /// Wrap source bytes with a MIME hint; dimensions unknown.
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            width: 0,
            height: 0,
            mime_type: mime_type.into(),
        }
    }

    /// Attach the dimensions reported by the picker.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Size of the encoded source.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ── CompressedImage ──────────────────────────────────────────────

/// Output of the compressor: a JPEG that fits the byte budget it was
/// produced under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    /// Baseline JPEG bytes.
    pub bytes: Vec<u8>,
    /// Encoded width in pixels.
    pub width: u32,
    /// Encoded height in pixels.
    pub height: u32,
    /// JPEG quality the bytes were produced at.
    pub quality: u8,
}

impl CompressedImage {
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}
