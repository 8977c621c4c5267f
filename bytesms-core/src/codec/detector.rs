//! Message body classifier.
//!
//! A body that does not start with the exact marker of a known version is
//! plain text and is never inspected further, so no human-typed message can
//! be mistaken for an image. A body *with* the marker is validated strictly;
//! anything short of a canonical base64 payload is [`MessageBody::Malformed`].
//!
//! Validation is a single pass over the payload bytes and never allocates.

use crate::codec::envelope::{
    EnvelopeView, LEGACY_PLACEHOLDER_PREFIX, Malformed, MalformedReason, MessageBody,
    PLACEHOLDER_TAG, strip_marker,
};

/// Classify a message body.
pub fn classify(body: &str) -> MessageBody<'_> {
    let Some((version, payload)) = strip_marker(body) else {
        return MessageBody::PlainText(body);
    };

    let malformed = |reason| MessageBody::Malformed(Malformed { body, reason });

    if payload.starts_with(PLACEHOLDER_TAG) {
        return malformed(MalformedReason::FailurePlaceholder);
    }

    match validate_payload(payload) {
        Ok(()) => MessageBody::Envelope(EnvelopeView::new(version, body)),
        Err(reason) => malformed(reason),
    }
}

/// Whether `body` is a placeholder left behind by a failed compression,
/// either in the current form or the legacy `IMG:file:` form.
///
/// Legacy placeholders still classify as plain text (they lack the marker),
/// but they must never be transmitted.
pub fn is_failure_placeholder(body: &str) -> bool {
    if body.starts_with(LEGACY_PLACEHOLDER_PREFIX) {
        return true;
    }
    matches!(
        classify(body),
        MessageBody::Malformed(Malformed {
            reason: MalformedReason::FailurePlaceholder,
            ..
        })
    )
}

/// Strictly validate a padded standard-base64 payload.
///
/// Rules: non-empty; only `A-Z a-z 0-9 + /` before an optional tail of at
/// most two `=`; total length a multiple of four; unused trailing bits zero.
pub fn validate_payload(payload: &str) -> Result<(), MalformedReason> {
    let bytes = payload.as_bytes();
    if bytes.is_empty() {
        return Err(MalformedReason::EmptyPayload);
    }

    let pad = bytes.iter().rev().take_while(|&&b| b == b'=').count();
    let data = &bytes[..bytes.len() - pad];

    for (offset, &b) in data.iter().enumerate() {
        if sextet(b).is_none() {
            return Err(MalformedReason::InvalidSymbol { offset });
        }
    }

    if bytes.len() % 4 != 0 {
        return Err(MalformedReason::InvalidLength(bytes.len()));
    }
    if pad > 2 {
        return Err(MalformedReason::InvalidPadding);
    }

    // With one '=' the last data symbol carries 2 unused bits, with two '='
    // it carries 4; both must be zero for the encoding to be canonical.
    if pad > 0 {
        let unused_mask = if pad == 2 { 0b1111 } else { 0b11 };
        match data.last().and_then(|&b| sextet(b)) {
            Some(last) if last & unused_mask == 0 => {}
            _ => return Err(MalformedReason::InvalidPadding),
        }
    }

    Ok(())
}

/// Value of a standard-alphabet base64 symbol.
const fn sextet(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────
