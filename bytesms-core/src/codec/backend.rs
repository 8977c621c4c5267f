//! Raster backends used by the [`Compressor`](super::Compressor).
//!
//! The compressor only decides *which* size and quality to try; a
//! [`RasterBackend`] does the pixel work. [`JpegBackend`] is the production
//! implementation: the `image` crate decodes and resamples, `jpeg-encoder`
//! writes the baseline JPEG. Tests swap in a mock that reports deterministic
//! sizes.
//!
//! A whole envelope is under a kilobyte, so fixed JPEG overhead matters.
//! Stock Huffman tables alone cost ~420 bytes; tables optimized for the
//! image's own symbols are a fraction of that, and 4:2:0 chroma halves the
//! colour blocks.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

use crate::codec::types::RawImage;
use crate::error::CodecError;

/// Resampling filter used when downscaling.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

// ── SourceImage ──────────────────────────────────────────────────

/// A decoded source image, loaded once per compression.
#[derive(Debug, Clone)]
pub struct SourceImage {
    width: u32,
    height: u32,
    pixels: DynamicImage,
}

impl SourceImage {
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
        }
    }

    /// A source that reports `width`×`height` without holding that many
    /// pixels. Only meaningful for backends that never read the pixels.
    #[cfg(test)]
    pub(crate) fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: DynamicImage::new_rgb8(1, 1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }
}

// ── RasterBackend ────────────────────────────────────────────────

/// Decode and re-encode primitives the compressor drives.
pub trait RasterBackend: Send + Sync {
    /// Decode the picker's bytes. Empty or undecodable input is an
    /// [`CodecError::Acquisition`].
    fn load(&self, raw: &RawImage) -> Result<SourceImage, CodecError>;

    /// Encode `source` scaled to exactly `width`×`height` at `quality`.
    fn encode(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, CodecError>;
}

// ── JpegBackend ──────────────────────────────────────────────────

/// Baseline JPEG backend: optimized Huffman tables, 4:2:0 chroma.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegBackend;

impl JpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RasterBackend for JpegBackend {
    fn load(&self, raw: &RawImage) -> Result<SourceImage, CodecError> {
        if raw.is_empty() {
            return Err(CodecError::Acquisition("image source is empty".into()));
        }

        // Trust the magic bytes first; fall back to the picker's MIME hint.
        let format = match image::guess_format(&raw.bytes) {
            Ok(format) => format,
            Err(_) => ImageFormat::from_mime_type(&raw.mime_type).ok_or_else(|| {
                CodecError::Acquisition(format!("unrecognised image type {:?}", raw.mime_type))
            })?,
        };

        let pixels = image::load_from_memory_with_format(&raw.bytes, format)?;
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(CodecError::Acquisition("image has no pixels".into()));
        }
        Ok(SourceImage::new(pixels))
    }

    fn encode(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, CodecError> {
        let scaled = if (width, height) == (source.width(), source.height()) {
            source.pixels().to_rgb8()
        } else {
            source
                .pixels()
                .resize_exact(width, height, RESIZE_FILTER)
                .to_rgb8()
        };

        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, quality.clamp(1, 100));
        encoder.set_sampling_factor(SamplingFactor::R_4_2_0);
        encoder.set_optimized_huffman_tables(true);
        encoder
            .encode(scaled.as_raw(), jpeg_side(width)?, jpeg_side(height)?, ColorType::Rgb)
            .map_err(|e| CodecError::Other(format!("jpeg encode failed: {e}")))?;
        Ok(out)
    }
}

/// JPEG frame headers store each side in 16 bits.
fn jpeg_side(side: u32) -> Result<u16, CodecError> {
    u16::try_from(side)
        .map_err(|_| CodecError::Other(format!("{side} px exceeds the JPEG frame limit")))
}

// ── Mock ─────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::types::RasterCodec;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn load_rejects_empty_and_garbage() {
        let backend = JpegBackend::new();
        let empty = RawImage::new(Vec::new(), "image/jpeg");
        assert!(matches!(backend.load(&empty), Err(CodecError::Acquisition(_))));

        let garbage = RawImage::new(vec![0x13u8; 64], "application/octet-stream");
        assert!(matches!(backend.load(&garbage), Err(CodecError::Acquisition(_))));
    }

    #[test]
    fn reencodes_png_as_jpeg() {
        let backend = JpegBackend::new();
        let raw = RawImage::new(png_bytes(40, 30), "image/png");
        let source = backend.load(&raw).unwrap();
        assert_eq!((source.width(), source.height()), (40, 30));

        let jpeg = backend.encode(&source, 20, 15, 50).unwrap();
        assert_eq!(RasterCodec::sniff(&jpeg), RasterCodec::Jpeg);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 15));
    }

    #[test]
    fn fixed_overhead_leaves_room_for_pixels() {
        // Headers, tables and a single MCU must stay well under the smallest
        // byte budget a multi-segment message gets (~900 bytes).
        let backend = JpegBackend::new();
        let source = backend.load(&RawImage::new(png_bytes(8, 8), "image/png")).unwrap();
        let jpeg = backend.encode(&source, 1, 1, 20).unwrap();
        assert!(jpeg.len() < 450, "1x1 jpeg is {} bytes", jpeg.len());
    }

    #[test]
    fn oversized_frame_is_an_error() {
        assert!(jpeg_side(65_535).is_ok());
        assert!(matches!(jpeg_side(70_000), Err(CodecError::Other(_))));
    }

    #[test]
    fn lower_quality_is_not_larger() {
        let backend = JpegBackend::new();
        let raw = RawImage::new(png_bytes(64, 64), "image/png");
        let source = backend.load(&raw).unwrap();
        let high = backend.encode(&source, 64, 64, 95).unwrap();
        let low = backend.encode(&source, 64, 64, 10).unwrap();
        assert!(low.len() <= high.len());
    }
}
