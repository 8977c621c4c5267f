//! Integration tests: real JPEG compression through the whole send and
//! render path, the send guard, and a store-backed poller.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytesms_core::{
    Charset, CodecError, ComposeError, Composer, ComposerConfig, CompressionBudget, Compressor,
    Draft, MessageBody, MemoryGateway, MessageStore, Poller, PollerConfig, RasterCodec, RawImage,
    RenderCache, Rendered, SendBlocked, TransportGateway, TransportProfile, classify, decode,
    encode,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio_test::{assert_err, assert_ok};

// ── Helpers ──────────────────────────────────────────────────────

/// A smooth gradient photo stand-in, PNG-encoded like a picker would
/// hand it over.
fn gradient_png(width: u32, height: u32) -> RawImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width) as u8,
            (y * 255 / height) as u8,
            ((x + y) * 127 / (width + height)) as u8,
        ])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    RawImage::new(out.into_inner(), "image/png").with_dimensions(width, height)
}

/// Gradient with a dark block and per-pixel noise of `±amplitude`, closer
/// to a camera photo than a clean gradient.
fn noisy_photo(width: u32, height: u32, amplitude: u32) -> RawImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let hash = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663))
            .wrapping_mul(2_654_435_761);
        let noise = (hash >> 16) % (2 * amplitude + 1);
        let dark = (width / 3..2 * width / 3).contains(&x) && (height / 4..height / 2).contains(&y);
        let shade = |base: u32| -> u8 {
            let base = if dark { base / 4 } else { base };
            (base + noise).saturating_sub(amplitude).min(255) as u8
        };
        Rgb([
            shade(x * 200 / width + 40),
            shade(y * 200 / height + 40),
            shade((x + y) * 120 / (width + height) + 60),
        ])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    RawImage::new(out.into_inner(), "image/png").with_dimensions(width, height)
}

/// Roomy profile so real JPEG output sizes never make a test flaky.
fn roomy_profile() -> TransportProfile {
    TransportProfile::new(Charset::Gsm7, 60)
}

// ── Send → receive round trip ────────────────────────────────────

#[test]
fn compress_encode_classify_decode_is_exact() {
    let profile = roomy_profile();
    let char_budget = profile.char_budget();
    let budget = CompressionBudget::for_transport(char_budget, 320, 20);

    let compressed = assert_ok!(Compressor::new().compress(&gradient_png(750, 1000), &budget));
    assert!(compressed.bytes.len() <= budget.max_bytes);
    assert!(compressed.width.max(compressed.height) <= 320);
    assert_eq!(RasterCodec::sniff(&compressed.bytes), RasterCodec::Jpeg);

    let envelope = assert_ok!(encode(&compressed, char_budget));
    assert!(envelope.len() <= char_budget);
    assert!(envelope.as_str().is_ascii());

    let view = match classify(envelope.as_str()) {
        MessageBody::Envelope(view) => view,
        other => panic!("expected envelope, got {other:?}"),
    };
    let decoded = assert_ok!(decode(view));
    assert_eq!(&decoded.bytes[..], &compressed.bytes[..]);
    assert_eq!(decoded.codec, RasterCodec::Jpeg);
    assert_eq!(
        decoded.dimensions(),
        Some((compressed.width, compressed.height))
    );
}

#[test]
fn photo_fits_a_1200_char_message_with_default_settings() {
    let budget = CompressionBudget::for_transport(1200, 320, 20);
    let compressor = Compressor::new();

    for amplitude in [0, 8, 32] {
        let photo = noisy_photo(1200, 1600, amplitude);
        let compressed = assert_ok!(compressor.compress(&photo, &budget));
        assert!(compressed.bytes.len() <= budget.max_bytes, "noise {amplitude}");
        assert_eq!(compressed.width * 4, compressed.height * 3, "noise {amplitude}");

        let envelope = assert_ok!(encode(&compressed, 1200));
        assert!(envelope.len() <= 1200, "noise {amplitude}");

        let MessageBody::Envelope(view) = classify(envelope.as_str()) else {
            panic!("noise {amplitude}: envelope did not classify as one");
        };
        let decoded = assert_ok!(decode(view));
        assert_eq!(&decoded.bytes[..], &compressed.bytes[..]);
        assert_eq!(
            decoded.dimensions(),
            Some((compressed.width, compressed.height))
        );
    }
}

#[tokio::test]
async fn default_profile_sends_a_photo() {
    let gateway = MemoryGateway::default();
    let composer = Composer::new(ComposerConfig::default());
    let profile = TransportProfile::default();

    let outcome = composer.pick(noisy_photo(1024, 768, 16)).wait().await;
    let envelope = assert_ok!(outcome.result);
    assert!(envelope.len() <= profile.char_budget());

    let sent = assert_ok!(composer.send(&gateway, "+15550001").await);
    assert!(profile.segments_needed(&sent.body) <= profile.max_segments);
    assert!(classify(&sent.body).is_envelope());
}

#[test]
fn portrait_aspect_is_preserved() {
    let budget = CompressionBudget::for_transport(roomy_profile().char_budget(), 320, 20);
    let out = assert_ok!(Compressor::new().compress(&gradient_png(300, 400), &budget));
    // 3:4 source, so width is three quarters of height.
    assert_eq!(out.width * 4, out.height * 3);
}

#[test]
fn tiny_image_is_still_reencoded_as_jpeg() {
    let budget = CompressionBudget::for_transport(roomy_profile().char_budget(), 320, 20);
    let out = assert_ok!(Compressor::new().compress(&gradient_png(8, 8), &budget));
    assert_eq!((out.width, out.height), (8, 8));
    assert_eq!(RasterCodec::sniff(&out.bytes), RasterCodec::Jpeg);
}

#[test]
fn unreachable_budget_fails_without_envelope() {
    // No JPEG fits in 64 bytes: the headers alone are larger.
    let budget = CompressionBudget {
        max_bytes: 64,
        max_dimension: 320,
        min_quality: 20,
    };
    let err = assert_err!(Compressor::new().compress(&gradient_png(200, 200), &budget));
    assert!(matches!(err, CodecError::BudgetExceeded { budget: 64, .. }));
}

#[test]
fn garbage_input_is_acquisition_error() {
    let raw = RawImage::new(vec![0x42u8; 256], "image/jpeg");
    let budget = CompressionBudget::default();
    let err = assert_err!(Compressor::new().compress(&raw, &budget));
    assert!(matches!(err, CodecError::Acquisition(_)));
}

// ── Classification scenarios ─────────────────────────────────────

#[test]
fn human_text_is_plain_text() {
    assert!(classify("Hello, are you free today?").is_plain_text());
    assert!(classify("::image incoming").is_plain_text());
}

#[test]
fn marker_with_spaces_is_malformed_and_renders_placeholder() {
    let body = "::img1:     ";
    assert!(classify(body).is_malformed());
    let mut cache = RenderCache::default();
    assert!(cache.render(7, body).is_broken());
}

// ── Composer + gateway ───────────────────────────────────────────

#[tokio::test]
async fn photo_travels_through_gateway_and_renders() {
    let config = ComposerConfig {
        profile: roomy_profile(),
        ..ComposerConfig::default()
    };
    let gateway = Arc::new(MemoryGateway::new(roomy_profile()));
    let composer = Composer::new(config);

    let outcome = composer.pick(gradient_png(640, 480)).wait().await;
    assert!(outcome.applied);
    let envelope = assert_ok!(outcome.result);
    assert_eq!(composer.current().draft, Draft::Image(envelope.clone()));

    let sent = assert_ok!(composer.send(gateway.as_ref(), "+919876543210").await);
    assert_eq!(sent.body, envelope.as_str());
    assert!(sent.body.len() <= gateway.profile().char_budget());

    gateway.deliver("+919876543210", "nice!").unwrap();
    let thread = assert_ok!(gateway.messages("+919876543210").await);
    let mut cache = RenderCache::default();
    let rendered = cache.render_thread(&thread);

    assert_eq!(*rendered[0], Rendered::Text("nice!".into()));
    match rendered[1].as_ref() {
        Rendered::Image(img) => {
            assert_eq!(img.codec, RasterCodec::Jpeg);
            let (w, h) = img.dimensions().unwrap();
            assert_eq!((w, h), (320, 240));
        }
        other => panic!("expected image, got {other:?}"),
    }
}

#[tokio::test]
async fn over_budget_pick_blocks_the_send() {
    let config = ComposerConfig {
        max_bytes: Some(64),
        ..ComposerConfig::default()
    };
    let gateway = MemoryGateway::default();
    let composer = Composer::new(config);

    let outcome = composer.pick(gradient_png(400, 300)).wait().await;
    assert!(matches!(outcome.result, Err(CodecError::BudgetExceeded { .. })));

    let err = assert_err!(composer.send(&gateway, "+15550001").await);
    assert!(matches!(
        err,
        ComposeError::Blocked(SendBlocked::Failed(CodecError::BudgetExceeded { .. }))
    ));
    assert!(gateway.all().is_empty());
}

#[tokio::test]
async fn newer_pick_replaces_older_one() {
    let composer = Composer::new(ComposerConfig {
        profile: roomy_profile(),
        ..ComposerConfig::default()
    });
    let first = composer.pick(gradient_png(1200, 900));
    let second = composer.pick(gradient_png(90, 120));

    let first = first.wait().await;
    let second = second.wait().await;
    assert!(!first.applied);
    assert!(second.applied);

    let envelope = assert_ok!(second.result);
    assert_eq!(composer.current().draft, Draft::Image(envelope));
}

// ── Poller ───────────────────────────────────────────────────────

#[tokio::test]
async fn poller_previews_follow_the_store() {
    let gateway = Arc::new(MemoryGateway::default());
    let poller = Poller::conversations(
        gateway.clone(),
        PollerConfig {
            interval: Duration::from_millis(20),
            jitter: 0.0,
            max_backoff: Duration::from_millis(100),
        },
    );
    let mut rx = poller.subscribe();
    poller.start();

    gateway.deliver("+15550001", "::img1:QUJD").unwrap();

    let rows = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            rx.changed().await.unwrap();
            let snapshot = rx.borrow_and_update().clone();
            if let Some(rows) = snapshot.filter(|rows| !rows.is_empty()) {
                return rows;
            }
        }
    })
    .await
    .expect("poller never saw the message");

    assert_eq!(rows.len(), 1);
    // Structurally valid, so the list shows a photo even though the
    // payload is not a decodable picture.
    assert_eq!(bytesms_core::summarize(&rows[0].last_message, 30), "[photo]");
    poller.stop();
}
