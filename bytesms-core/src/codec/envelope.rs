//! Envelope wire format.
//!
//! ```text
//! ::img1:/9j/4AAQSkZJRgABAQAAAQABAAD...==
//! └─┬──┘└┬┘└────────────┬─────────────┘
//!   │    │              └ padded standard base64 of the JPEG bytes
//!   │    └ format version digit + ':'
//!   └ family prefix
//! ```
//!
//! Every marker character is in the GSM 03.38 basic table, so an envelope
//! never forces the gateway into UCS-2. The envelope *is* the persisted
//! message body; the version digit lets later formats coexist with bodies
//! already sitting in a phone's message store.
//!
//! Only the exact marker of a version this build reads is recognised. A body
//! starting `::img2:` is ordinary text here, exactly like any other text.
//!
//! A failed compression leaves a **failure placeholder** instead of an
//! envelope: `::img1:file:<reference>`. It carries the marker, so it is
//! classified `Malformed`, and the send guard refuses it.

use std::fmt;

use thiserror::Error;

// ── Constants ────────────────────────────────────────────────────

/// Full marker for the current format.
pub const MARKER: &str = "::img1:";

/// Length of a marker in characters (and bytes; it is ASCII).
pub const MARKER_LEN: usize = MARKER.len();

/// Tag following the marker in a failure placeholder.
pub const PLACEHOLDER_TAG: &str = "file:";

/// Placeholder prefix written by older app builds before this format
/// existed. Recognised by the send guard only.
pub const LEGACY_PLACEHOLDER_PREFIX: &str = "IMG:file:";

/// Splits `body` into `(version, payload)` when it starts, byte for byte,
/// with the marker of a version this build reads. Never allocates.
pub fn strip_marker(body: &str) -> Option<(FormatVersion, &str)> {
    FormatVersion::ALL
        .iter()
        .find_map(|&version| body.strip_prefix(version.marker()).map(|rest| (version, rest)))
}

/// Build the placeholder a composer parks in the draft when compression
/// of `reference` (typically a `file://` URI) failed.
pub fn failure_placeholder(reference: &str) -> String {
    let mut out = String::with_capacity(MARKER_LEN + PLACEHOLDER_TAG.len() + reference.len());
    out.push_str(MARKER);
    out.push_str(PLACEHOLDER_TAG);
    out.push_str(reference);
    out
}

// ── FormatVersion ────────────────────────────────────────────────

/// Envelope format revisions this build understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Single-message JPEG, padded standard base64.
    V1,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion::V1;

    /// Every version the detector and decoder accept.
    pub const ALL: [FormatVersion; 1] = [FormatVersion::V1];

    pub const fn digit(self) -> u8 {
        match self {
            FormatVersion::V1 => 1,
        }
    }

    pub const fn marker(self) -> &'static str {
        match self {
            FormatVersion::V1 => MARKER,
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────

/// An owned, validated envelope string.
///
/// Only [`encode`](crate::codec::encoder::encode) and
/// [`EnvelopeView::to_envelope`] construct one, so holding an `Envelope`
/// means the payload is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Envelope {
    version: FormatVersion,
    text: String,
}

impl Envelope {
    pub(crate) fn from_parts(version: FormatVersion, text: String) -> Self {
        Self { version, text }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// The full body, marker included.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Base64 payload after the marker.
    pub fn payload(&self) -> &str {
        &self.text[self.version.marker().len()..]
    }

    /// Length in characters. The envelope is pure ASCII, so this is also
    /// the GSM-7 septet count.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn view(&self) -> EnvelopeView<'_> {
        EnvelopeView {
            version: self.version,
            text: &self.text,
        }
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Envelope {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Borrowed envelope produced by the detector without copying the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeView<'a> {
    version: FormatVersion,
    text: &'a str,
}

impl<'a> EnvelopeView<'a> {
    pub(crate) fn new(version: FormatVersion, text: &'a str) -> Self {
        Self { version, text }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    pub fn payload(&self) -> &'a str {
        &self.text[self.version.marker().len()..]
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::from_parts(self.version, self.text.to_owned())
    }
}

// ── MessageBody ──────────────────────────────────────────────────

/// Classification of a message body. Exactly three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody<'a> {
    /// Ordinary human text.
    PlainText(&'a str),
    /// A structurally valid envelope.
    Envelope(EnvelopeView<'a>),
    /// Carries the marker but is neither text nor a decodable image.
    Malformed(Malformed<'a>),
}

impl<'a> MessageBody<'a> {
    pub fn is_plain_text(&self) -> bool {
        matches!(self, MessageBody::PlainText(_))
    }

    pub fn is_envelope(&self) -> bool {
        matches!(self, MessageBody::Envelope(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, MessageBody::Malformed(_))
    }

    /// The original body string.
    pub fn as_str(&self) -> &'a str {
        match *self {
            MessageBody::PlainText(text) => text,
            MessageBody::Envelope(view) => view.as_str(),
            MessageBody::Malformed(m) => m.body,
        }
    }

    /// Short lowercase label, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::PlainText(_) => "plain_text",
            MessageBody::Envelope(_) => "envelope",
            MessageBody::Malformed(_) => "malformed",
        }
    }
}

/// A marker-carrying body that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Malformed<'a> {
    pub body: &'a str,
    pub reason: MalformedReason,
}

/// Why a marker-carrying body is not a valid envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("unencoded attachment left by a failed compression")]
    FailurePlaceholder,

    #[error("empty payload")]
    EmptyPayload,

    #[error("payload length {0} is not a multiple of 4")]
    InvalidLength(usize),

    #[error("non-base64 byte at payload offset {offset}")]
    InvalidSymbol { offset: usize },

    #[error("misplaced padding or non-canonical trailing bits")]
    InvalidPadding,
}
