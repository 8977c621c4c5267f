//! Domain-specific error types for the ByteSMS codec.
//!
//! Send-path operations return `Result<T, CodecError>`; render-path
//! decoding returns [`DecodeError`] wrapped in `CodecError::Decode`.
//! No panics on invalid input: every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

// ── CodecError ───────────────────────────────────────────────────

/// The canonical error type for the image-over-text codec.
///
/// `Clone` so a failed compose attempt can be parked in the outgoing
/// draft and shown to the user later.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    // ── Send path ────────────────────────────────────────────────
    /// The source bytes were empty or could not be decoded as an image.
    #[error("image acquisition failed: {0}")]
    Acquisition(String),

    /// No quality / dimension trade-off fit the byte budget within the
    /// iteration cap.
    #[error("compression budget exceeded: best attempt {best} bytes (budget {budget})")]
    BudgetExceeded { best: usize, budget: usize },

    /// The envelope would not fit the transport character budget.
    #[error("encoded envelope too large: {chars} chars (budget {budget})")]
    EncodingTooLarge { chars: usize, budget: usize },

    /// Compression exceeded its wall-clock budget.
    #[error("compression timed out after {0:?}")]
    Timeout(Duration),

    /// A newer pick superseded this compression.
    #[error("compression was cancelled")]
    Cancelled,

    // ── Render path ──────────────────────────────────────────────
    /// The envelope payload could not be turned back into bytes.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    // ── Runtime ──────────────────────────────────────────────────
    /// The blocking worker running a compression panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CodecError {
    /// Whether retrying the same operation (possibly with a smaller image)
    /// can succeed. Acquisition failures are the caller's to resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CodecError::BudgetExceeded { .. }
                | CodecError::EncodingTooLarge { .. }
                | CodecError::Timeout(_)
                | CodecError::Worker(_)
        )
    }
}

// ── DecodeError ──────────────────────────────────────────────────

/// Typed failure for turning an envelope back into bytes.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The body does not start with the marker of a version this build reads.
    #[error("body is not an image envelope")]
    NotAnEnvelope,

    /// Marker present but no payload follows it.
    #[error("empty payload")]
    Empty,

    /// Payload length is not a multiple of four.
    #[error("invalid payload length {0}")]
    InvalidLength(usize),

    /// A byte outside the base64 alphabet.
    #[error("invalid symbol {symbol:#04x} at offset {offset}")]
    InvalidSymbol { offset: usize, symbol: u8 },

    /// Padding in the wrong place or non-canonical trailing bits.
    #[error("invalid padding")]
    InvalidPadding,
}

impl From<base64::DecodeError> for DecodeError {
    fn from(e: base64::DecodeError) -> Self {
        match e {
            base64::DecodeError::InvalidByte(offset, symbol) => {
                DecodeError::InvalidSymbol { offset, symbol }
            }
            base64::DecodeError::InvalidLength(len) => DecodeError::InvalidLength(len),
            base64::DecodeError::InvalidLastSymbol(_, _) | base64::DecodeError::InvalidPadding => {
                DecodeError::InvalidPadding
            }
        }
    }
}

// ── TransportError ───────────────────────────────────────────────

/// Failure reported by a [`TransportGateway`](crate::gateway::TransportGateway)
/// or [`MessageStore`](crate::gateway::MessageStore).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying store or channel reported an I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be (de)serialised.
    #[error("store record error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The gateway refused the message (bad address, too many segments).
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The gateway is not reachable right now.
    #[error("transport unavailable")]
    Unavailable,
}

// ── ComposeError ─────────────────────────────────────────────────

/// Failure of the composer's send path.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The outgoing body failed the send guard; nothing was transmitted.
    #[error("send blocked: {0}")]
    Blocked(#[from] SendBlocked),

    /// The gateway failed; the draft has been restored.
    #[error("send failed: {0}")]
    Transport(#[from] TransportError),
}

/// Why the send guard refused an outgoing body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendBlocked {
    /// Nothing to send.
    #[error("message is empty")]
    Empty,

    /// An image is still being compressed.
    #[error("image is still being prepared")]
    Pending,

    /// The body is an unencoded file reference left by a failed compression.
    #[error("image compression failed; the attachment was not encoded")]
    FailurePlaceholder,

    /// The body carries the envelope marker but is not a valid envelope.
    #[error("message looks like a broken image: {0}")]
    Malformed(crate::codec::MalformedReason),

    /// The last compression attempt failed.
    #[error("{0}")]
    Failed(CodecError),

    /// A text body needs more segments than the transport allows.
    #[error("message needs {segments} segments (limit {max})")]
    TooLong { segments: usize, max: usize },
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

impl From<image::ImageError> for CodecError {
    fn from(e: image::ImageError) -> Self {
        CodecError::Acquisition(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CodecError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            CodecError::Cancelled
        } else {
            CodecError::Worker(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = CodecError::BudgetExceeded {
            best: 1000,
            budget: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = CodecError::Timeout(Duration::from_secs(3));
        assert!(e.to_string().contains("timed out"));
    }

    #[test]
    fn from_string() {
        let e: CodecError = "something broke".into();
        assert!(matches!(e, CodecError::Other(_)));
    }

    #[test]
    fn retryable_classification() {
        assert!(CodecError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CodecError::BudgetExceeded { best: 2, budget: 1 }.is_retryable());
        assert!(!CodecError::Acquisition("empty".into()).is_retryable());
        assert!(!CodecError::Cancelled.is_retryable());
    }

    #[test]
    fn base64_errors_map_to_decode_errors() {
        let e: DecodeError = base64::DecodeError::InvalidByte(3, b' ').into();
        assert_eq!(
            e,
            DecodeError::InvalidSymbol {
                offset: 3,
                symbol: b' '
            }
        );
        let e: DecodeError = base64::DecodeError::InvalidPadding.into();
        assert_eq!(e, DecodeError::InvalidPadding);
    }

    #[test]
    fn from_io_into_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: TransportError = io_err.into();
        assert!(matches!(e, TransportError::Io(_)));
    }
}
