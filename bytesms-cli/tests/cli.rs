//! Subcommands against a temporary mailbox.

use std::path::{Path, PathBuf};

use bytesms_cli::commands::{self, Context};
use bytesms_cli::config::ByteSmsConfig;
use bytesms_cli::mailbox::Mailbox;
use bytesms_core::codec::encoder::encode_bytes;
use bytesms_core::gateway::{Direction, MessageStore};
use bytesms_core::{ComposeError, MessageBody, SendBlocked, TransportProfile, classify};
use image::{Rgb, RgbImage};
use tokio_test::{assert_err, assert_ok};

const JPEG_STUB: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

fn context(dir: &Path) -> Context {
    let mut config = ByteSmsConfig::default();
    config.mailbox.path = dir.join("mailbox.jsonl");
    Context::new(config)
}

fn mailbox(dir: &Path) -> Mailbox {
    Mailbox::new(dir.join("mailbox.jsonl"), TransportProfile::default())
}

/// A 1024x768 noisy gradient saved as PNG, standing in for a camera shot.
fn write_photo(dir: &Path) -> PathBuf {
    let img = RgbImage::from_fn(1024, 768, |x, y| {
        let noise = ((x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)) >> 20) % 25;
        Rgb([
            (x / 5 + noise) as u8,
            (y / 4 + noise) as u8,
            ((x + y) / 10 + noise) as u8,
        ])
    });
    let path = dir.join("photo.png");
    img.save(&path).unwrap();
    path
}

#[tokio::test]
async fn encode_writes_an_envelope_within_default_budget() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let photo = write_photo(dir.path());
    let out = dir.path().join("photo.txt");

    assert_ok!(commands::encode(&ctx, &photo, Some(&out)).await);

    let body = std::fs::read_to_string(&out).unwrap();
    assert!(body.len() <= TransportProfile::default().char_budget());
    assert!(matches!(classify(&body), MessageBody::Envelope(_)));
}

#[tokio::test]
async fn send_image_lands_as_one_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let photo = write_photo(dir.path());

    assert_ok!(commands::send(&ctx, "+15550001", None, Some(&photo)).await);

    let thread = mailbox(dir.path()).messages("+15550001").await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].direction, Direction::Outbound);
    let profile = TransportProfile::default();
    assert!(profile.segments_needed(&thread[0].body) <= profile.max_segments);
    assert!(matches!(classify(&thread[0].body), MessageBody::Envelope(_)));
}

#[tokio::test]
async fn send_text_lands_in_mailbox() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());

    assert_ok!(commands::send(&ctx, "98765 43210", Some("hello there"), None).await);

    let thread = mailbox(dir.path()).messages("+919876543210").await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].body, "hello there");
    assert_eq!(thread[0].direction, Direction::Outbound);
}

#[tokio::test]
async fn send_refuses_bodies_that_look_like_broken_images() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());

    let err = assert_err!(commands::send(&ctx, "+15550001", Some("::img1:    "), None).await);
    let err = err.downcast::<ComposeError>().unwrap();
    assert!(matches!(*err, ComposeError::Blocked(SendBlocked::Malformed(_))));

    let err = assert_err!(commands::send(&ctx, "+15550001", None, None).await);
    assert!(err.to_string().contains("exactly one"));
    assert!(mailbox(dir.path()).load().await.unwrap().is_empty());
}

#[tokio::test]
async fn thread_saves_received_images() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let envelope = encode_bytes(JPEG_STUB, 1000).unwrap();

    assert_ok!(commands::receive(&ctx, "+15550001", Some("look at this")).await);
    assert_ok!(commands::receive(&ctx, "+15550001", Some(envelope.as_str())).await);
    assert_ok!(commands::receive(&ctx, "+15550001", Some("::img1:%%%%")).await);

    let images = dir.path().join("images");
    assert_ok!(commands::thread(&ctx, "+15550001", Some(&images)).await);

    let saved = std::fs::read(images.join("2.jpg")).unwrap();
    assert_eq!(saved, JPEG_STUB);
    assert!(!images.join("3.jpg").exists());
    assert_ok!(commands::conversations(&ctx).await);
}

#[test]
fn decode_writes_the_original_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let envelope = encode_bytes(JPEG_STUB, 1000).unwrap();
    let out = dir.path().join("out.jpg");

    assert_ok!(commands::decode_to_file(Some(envelope.as_str()), Some(&out)));
    assert_eq!(std::fs::read(&out).unwrap(), JPEG_STUB);

    assert_err!(commands::decode_to_file(Some("just text"), Some(&out)));
}

#[test]
fn classify_and_budget_accept_any_body() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    for body in ["Hello, are you free today?", "::img1:QUJD", "::img1:  ", "::img9:QUJD"] {
        assert_ok!(commands::classify_body(&ctx, Some(body), false));
        assert_ok!(commands::classify_body(&ctx, Some(body), true));
    }
    assert_ok!(commands::budget(&ctx, Some("€uro [brackets]")));
}
