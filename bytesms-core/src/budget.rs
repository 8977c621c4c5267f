//! Transport character budget and the byte budget derived from it.
//!
//! ```text
//!  TransportProfile ──char_budget()──▶ 1224 chars (GSM-7, 8 × 153)
//!                                          │
//!                    max_payload_bytes()   ▼  minus marker, ×3/4
//!  CompressionBudget { max_bytes: 912, max_dimension, min_quality }
//! ```
//!
//! | Charset | 1 segment | per concatenated segment |
//! |---------|-----------|--------------------------|
//! | GSM-7   | 160       | 153                      |
//! | UCS-2   | 70        | 67                       |
//!
//! Envelopes are pure ASCII from the GSM basic table, so they always get the
//! GSM-7 allowance unless the gateway is pinned to UCS-2.

use serde::{Deserialize, Serialize};

use crate::codec::max_payload_bytes;

/// Longer-edge cap applied before the first compression attempt.
pub const DEFAULT_MAX_DIMENSION: u32 = 320;

/// JPEG quality below which output is not worth sending.
pub const DEFAULT_MIN_QUALITY: u8 = 20;

/// Concatenated segments most carriers reassemble reliably.
pub const DEFAULT_MAX_SEGMENTS: usize = 8;

/// GSM 03.38 basic character set (one septet each). `\x1B` is the escape
/// and is deliberately absent.
const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// GSM 03.38 extension table (escape + septet, two septets each).
const GSM7_EXTENSION: &str = "\x0C^{}\\[~]|€";

// ── Charset ──────────────────────────────────────────────────────

/// Character set a message body travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    #[default]
    Gsm7,
    Ucs2,
}

impl Charset {
    /// Smallest charset that can carry `text`.
    pub fn detect(text: &str) -> Self {
        if text.chars().all(|c| gsm7_septets(c).is_some()) {
            Charset::Gsm7
        } else {
            Charset::Ucs2
        }
    }

    /// Characters in a single, unconcatenated segment.
    pub const fn single_segment(self) -> usize {
        match self {
            Charset::Gsm7 => 160,
            Charset::Ucs2 => 70,
        }
    }

    /// Characters per segment once a UDH header is needed.
    pub const fn multi_segment(self) -> usize {
        match self {
            Charset::Gsm7 => 153,
            Charset::Ucs2 => 67,
        }
    }

    /// Characters deliverable as one reassembled body over `segments`.
    pub const fn budget(self, segments: usize) -> usize {
        match segments {
            0 => 0,
            1 => self.single_segment(),
            n => n * self.multi_segment(),
        }
    }

    /// Length of `text` in this charset's units: septets for GSM-7 (escape
    /// characters count twice), UTF-16 code units for UCS-2. `None` when
    /// GSM-7 cannot represent the text.
    pub fn units(self, text: &str) -> Option<usize> {
        match self {
            Charset::Gsm7 => text.chars().map(gsm7_septets).sum(),
            Charset::Ucs2 => Some(text.encode_utf16().count()),
        }
    }
}

fn gsm7_septets(c: char) -> Option<usize> {
    if GSM7_BASIC.contains(c) {
        Some(1)
    } else if GSM7_EXTENSION.contains(c) {
        Some(2)
    } else {
        None
    }
}

// ── TransportProfile ─────────────────────────────────────────────

/// Segmentation model of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportProfile {
    /// Charset the gateway is pinned to. `Gsm7` means "GSM-7 when the text
    /// allows it"; `Ucs2` forces UCS-2 for everything.
    pub charset: Charset,
    /// Concatenated segments the gateway will send for one body.
    pub max_segments: usize,
}

impl Default for TransportProfile {
    fn default() -> Self {
        Self {
            charset: Charset::Gsm7,
            max_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}

impl TransportProfile {
    pub fn new(charset: Charset, max_segments: usize) -> Self {
        Self {
            charset,
            max_segments,
        }
    }

    /// Charset `text` would actually be sent in.
    pub fn charset_for(&self, text: &str) -> Charset {
        match self.charset {
            Charset::Ucs2 => Charset::Ucs2,
            Charset::Gsm7 => Charset::detect(text),
        }
    }

    /// Transport character budget for an envelope.
    pub fn char_budget(&self) -> usize {
        self.charset.budget(self.max_segments)
    }

    /// Segments needed to carry `text`. Zero for an empty body.
    pub fn segments_needed(&self, text: &str) -> usize {
        let charset = self.charset_for(text);
        let units = charset
            .units(text)
            .unwrap_or_else(|| text.encode_utf16().count());
        if units == 0 {
            0
        } else if units <= charset.single_segment() {
            1
        } else {
            units.div_ceil(charset.multi_segment())
        }
    }

    /// Whether `text` fits within `max_segments`.
    pub fn fits(&self, text: &str) -> bool {
        self.segments_needed(text) <= self.max_segments
    }
}

// ── CompressionBudget ────────────────────────────────────────────

/// Byte ceiling and quality policy handed to the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionBudget {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub min_quality: u8,
}

impl CompressionBudget {
    /// Largest byte budget whose envelope fits `char_budget`.
    pub fn for_transport(char_budget: usize, max_dimension: u32, min_quality: u8) -> Self {
        Self {
            max_bytes: max_payload_bytes(char_budget),
            max_dimension,
            min_quality,
        }
    }

    /// Same policy with a 10% smaller byte ceiling.
    pub fn tightened(&self) -> Self {
        Self {
            max_bytes: self.max_bytes - self.max_bytes.div_ceil(10),
            ..*self
        }
    }
}

impl Default for CompressionBudget {
    fn default() -> Self {
        Self::for_transport(
            TransportProfile::default().char_budget(),
            DEFAULT_MAX_DIMENSION,
            DEFAULT_MIN_QUALITY,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MARKER_LEN, envelope_len};

    #[test]
    fn segment_budgets() {
        assert_eq!(Charset::Gsm7.budget(1), 160);
        assert_eq!(Charset::Gsm7.budget(8), 1224);
        assert_eq!(Charset::Ucs2.budget(1), 70);
        assert_eq!(Charset::Ucs2.budget(4), 268);
        assert_eq!(Charset::Gsm7.budget(0), 0);
        assert_eq!(TransportProfile::default().char_budget(), 1224);
    }

    #[test]
    fn detect_charset() {
        assert_eq!(Charset::detect("Hello, are you free today?"), Charset::Gsm7);
        assert_eq!(Charset::detect("Prix: 5€ [promo]"), Charset::Gsm7);
        assert_eq!(Charset::detect("नमस्ते"), Charset::Ucs2);
        assert_eq!(Charset::detect("ok 👍"), Charset::Ucs2);
        assert_eq!(Charset::detect("::img1:AB+/=="), Charset::Gsm7);
    }

    #[test]
    fn extension_chars_cost_two_septets() {
        assert_eq!(Charset::Gsm7.units("a{b}"), Some(6));
        assert_eq!(Charset::Gsm7.units("🙂"), None);
        assert_eq!(Charset::Ucs2.units("🙂"), Some(2));
    }

    #[test]
    fn segments_needed_follows_concatenation_rules() {
        let profile = TransportProfile::default();
        assert_eq!(profile.segments_needed(""), 0);
        assert_eq!(profile.segments_needed(&"a".repeat(160)), 1);
        assert_eq!(profile.segments_needed(&"a".repeat(161)), 2);
        assert_eq!(profile.segments_needed(&"a".repeat(306)), 2);
        assert_eq!(profile.segments_needed(&"a".repeat(307)), 3);
        assert_eq!(profile.segments_needed(&"é".repeat(70)), 1);
        assert_eq!(profile.segments_needed(&"ж".repeat(71)), 2);
        assert!(!profile.fits(&"a".repeat(153 * 8 + 1)));

        let pinned = TransportProfile::new(Charset::Ucs2, 2);
        assert_eq!(pinned.segments_needed(&"a".repeat(71)), 2);
    }

    #[test]
    fn byte_budget_inverts_encoder_length() {
        let budget = CompressionBudget::for_transport(1200, 320, 20);
        assert_eq!(budget.max_bytes, (1200 - MARKER_LEN) / 4 * 3);
        assert!(envelope_len(budget.max_bytes) <= 1200);
        assert_eq!(CompressionBudget::default().max_bytes, 912);
    }

    #[test]
    fn tightening_shrinks_by_a_tenth() {
        let budget = CompressionBudget::for_transport(1200, 320, 20);
        let tighter = budget.tightened();
        assert_eq!(tighter.max_bytes, 894 - 90);
        assert_eq!(tighter.max_dimension, 320);
        assert_eq!(CompressionBudget { max_bytes: 0, ..budget }.tightened().max_bytes, 0);
    }
}
