//! Subcommand implementations.
//!
//! Results go to stdout so they can be piped (`bytesms encode a.jpg |
//! bytesms classify -`); diagnostics go through `tracing` to stderr or the
//! configured log file.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use bytesms_core::address::normalize_number;
use bytesms_core::codec::{
    MessageBody, RasterCodec, RawImage, classify, decode, decode_body, max_payload_bytes,
};
use bytesms_core::composer::Composer;
use bytesms_core::gateway::{ConversationSummary, Direction, MessageStore, StoredMessage};
use bytesms_core::poller::Poller;
use bytesms_core::render::{RenderCache, Rendered, summarize};

use crate::config::ByteSmsConfig;
use crate::mailbox::Mailbox;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Preview width in the conversation list.
const PREVIEW_CHARS: usize = 40;

// ── Context ──────────────────────────────────────────────────────

/// Everything a subcommand needs, built once from the config.
pub struct Context {
    pub config: ByteSmsConfig,
}

impl Context {
    pub fn new(config: ByteSmsConfig) -> Self {
        Self { config }
    }

    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::new(Mailbox::new(
            self.config.mailbox.path.clone(),
            self.config.to_profile(),
        ))
    }

    pub fn composer(&self) -> Composer {
        Composer::with_compressor(self.config.to_compressor(), self.config.to_composer_config())
    }

    /// Normalized address, or an error when it holds no digits.
    pub fn address(&self, raw: &str) -> CliResult<String> {
        let normalized = normalize_number(raw, &self.config.mailbox.default_country_code);
        if normalized.is_empty() {
            return Err(format!("{raw:?} is not a phone number").into());
        }
        Ok(normalized)
    }
}

// ── Codec commands ───────────────────────────────────────────────

/// Compress an image file into an envelope.
pub async fn encode(ctx: &Context, image: &Path, out: Option<&Path>) -> CliResult {
    let raw = read_image(image)?;
    let composer = ctx.composer();
    let outcome = composer.pick(raw).wait().await;
    let envelope = outcome.result?;

    info!(
        chars = envelope.len(),
        budget = composer.config().char_budget(),
        segments = composer.config().profile.segments_needed(envelope.as_str()),
        "encoded"
    );
    match out {
        Some(path) => std::fs::write(path, envelope.as_str())?,
        None => println!("{envelope}"),
    }
    Ok(())
}

/// Decode an envelope body back into an image file.
pub fn decode_to_file(body: Option<&str>, out: Option<&Path>) -> CliResult {
    let body = read_body(body)?;
    let image = decode_body(&body)?;
    let path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("image.{}", image.codec.extension())));
    std::fs::write(&path, &image.bytes)?;

    match image.dimensions() {
        Some((w, h)) => println!("{} ({w}x{h}, {} bytes)", path.display(), image.byte_len()),
        None => println!("{} ({} bytes)", path.display(), image.byte_len()),
    }
    Ok(())
}

/// Report how a body classifies.
pub fn classify_body(ctx: &Context, body: Option<&str>, as_json: bool) -> CliResult {
    let body = read_body(body)?;
    let profile = ctx.config.to_profile();
    let classified = classify(&body);

    let report = match classified {
        MessageBody::PlainText(text) => json!({
            "kind": classified.kind(),
            "chars": text.chars().count(),
            "charset": profile.charset_for(text),
            "segments": profile.segments_needed(text),
        }),
        MessageBody::Envelope(view) => {
            let decoded = decode(view);
            json!({
                "kind": classified.kind(),
                "version": view.version().digit(),
                "chars": view.len(),
                "bytes": decoded.as_ref().map(|d| d.byte_len()).ok(),
                "codec": decoded.as_ref().map(|d| d.codec.mime_type()).ok(),
            })
        }
        MessageBody::Malformed(m) => json!({
            "kind": classified.kind(),
            "reason": m.reason.to_string(),
        }),
    };

    if as_json {
        println!("{report}");
        return Ok(());
    }
    match classified {
        MessageBody::PlainText(_) => println!(
            "plain text, {} chars, {} segment(s)",
            report["chars"], report["segments"]
        ),
        MessageBody::Envelope(view) => println!(
            "image envelope v{}, {} chars, {} bytes",
            view.version().digit(),
            view.len(),
            report["bytes"]
        ),
        MessageBody::Malformed(m) => println!("malformed: {}", m.reason),
    }
    Ok(())
}

/// Print the transport budget, and the cost of `text` if given.
pub fn budget(ctx: &Context, text: Option<&str>) -> CliResult {
    let profile = ctx.config.to_profile();
    let composer = ctx.config.to_composer_config();
    let chars = profile.char_budget();

    println!("charset        {:?}", profile.charset);
    println!("max segments   {}", profile.max_segments);
    println!("char budget    {chars}");
    println!("payload bytes  {}", max_payload_bytes(chars));
    println!("start bytes    {}", composer.compression_budget().max_bytes);

    if let Some(text) = text {
        let segments = profile.segments_needed(text);
        println!(
            "text           {} segment(s) as {:?}{}",
            segments,
            profile.charset_for(text),
            if profile.fits(text) { "" } else { " (too long)" }
        );
    }
    Ok(())
}

// ── Mailbox commands ─────────────────────────────────────────────

/// Compose and send a text or an image through the mailbox.
pub async fn send(
    ctx: &Context,
    to: &str,
    text: Option<&str>,
    image: Option<&Path>,
) -> CliResult {
    let address = ctx.address(to)?;
    let mailbox = ctx.mailbox();
    let composer = ctx.composer();

    match (text, image) {
        (Some(text), None) => {
            composer.set_text(text);
        }
        (None, Some(path)) => {
            let outcome = composer.pick(read_image(path)?).wait().await;
            if let Err(e) = &outcome.result {
                warn!(error = %e, path = %path.display(), "image could not be prepared");
            }
        }
        _ => return Err("pass exactly one of --text or --image".into()),
    }

    let sent = composer.send(mailbox.as_ref(), &address).await?;
    println!(
        "sent #{} to {} ({} chars, {} segment(s))",
        sent.id,
        sent.address,
        sent.body.len(),
        ctx.config.to_profile().segments_needed(&sent.body)
    );
    Ok(())
}

/// Append an inbound message, as if it had arrived over the network.
pub async fn receive(ctx: &Context, from: &str, body: Option<&str>) -> CliResult {
    let address = ctx.address(from)?;
    let body = read_body(body)?;
    let msg = ctx.mailbox().deliver(&address, &body).await?;
    println!("received #{} from {}", msg.id, msg.address);
    Ok(())
}

/// Print one conversation, oldest first, optionally saving its images.
pub async fn thread(ctx: &Context, with: &str, save_images: Option<&Path>) -> CliResult {
    let address = ctx.address(with)?;
    let mut messages = ctx.mailbox().messages(&address).await?;
    messages.reverse();

    if let Some(dir) = save_images {
        std::fs::create_dir_all(dir)?;
    }

    let mut cache = RenderCache::default();
    for msg in &messages {
        let rendered = cache.render(msg.id, &msg.body);
        println!("{}", format_message(msg, &rendered));

        if let (Some(dir), Rendered::Image(img)) = (save_images, rendered.as_ref()) {
            let path = dir.join(format!("{}.{}", msg.id, img.codec.extension()));
            std::fs::write(&path, &img.bytes)?;
            info!(path = %path.display(), "image saved");
        }
    }
    if messages.is_empty() {
        println!("no messages with {address}");
    }
    Ok(())
}

/// Print the conversation list.
pub async fn conversations(ctx: &Context) -> CliResult {
    let rows = ctx.mailbox().conversations().await?;
    if rows.is_empty() {
        println!("no conversations");
    }
    for row in &rows {
        println!("{}", format_summary(row));
    }
    Ok(())
}

/// Follow a thread (or the conversation list) until Ctrl-C.
pub async fn watch(ctx: &Context, with: Option<&str>) -> CliResult {
    let mailbox = ctx.mailbox();
    let poll = ctx.config.to_poller_config();
    info!(interval = ?poll.interval, "watching {}", mailbox.path().display());

    match with {
        Some(with) => {
            let address = ctx.address(with)?;
            let poller = Poller::thread(mailbox, address, poll);
            let mut rx = poller.subscribe();
            poller.start();

            let mut cache = RenderCache::default();
            let mut last_seen = 0u64;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = rx.changed() => if changed.is_err() { break },
                }
                let Some(snapshot) = rx.borrow_and_update().clone() else {
                    continue;
                };
                for msg in snapshot.iter().rev() {
                    if msg.id <= last_seen {
                        continue;
                    }
                    let rendered = cache.render(msg.id, &msg.body);
                    println!("{}", format_message(msg, &rendered));
                    last_seen = last_seen.max(msg.id);
                }
            }
            poller.stop();
        }
        None => {
            let poller = Poller::conversations(mailbox, poll);
            let mut rx = poller.subscribe();
            poller.start();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = rx.changed() => if changed.is_err() { break },
                }
                let Some(rows) = rx.borrow_and_update().clone() else {
                    continue;
                };
                println!("── {} conversation(s) ──", rows.len());
                for row in rows.iter() {
                    println!("{}", format_summary(row));
                }
            }
            poller.stop();
        }
    }

    info!("watch stopped");
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────

/// Load an image file, inferring the MIME type from its magic bytes and
/// then its extension.
pub fn read_image(path: &Path) -> CliResult<RawImage> {
    let bytes = std::fs::read(path)?;
    let sniffed = RasterCodec::sniff(&bytes);
    let mime = if sniffed != RasterCodec::Unknown {
        sniffed.mime_type()
    } else {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        }
    };
    Ok(RawImage::new(bytes, mime))
}

/// `arg` verbatim, or stdin when `arg` is absent or `-`. A single trailing
/// newline from stdin is dropped.
fn read_body(arg: Option<&str>) -> CliResult<String> {
    match arg {
        Some(body) if body != "-" => Ok(body.to_string()),
        _ => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            let trimmed = body.strip_suffix('\n').unwrap_or(&body);
            let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
            Ok(trimmed.to_string())
        }
    }
}

/// `HH:MM:SS` (UTC) of an epoch-millisecond timestamp.
pub fn clock(timestamp_ms: i64) -> String {
    let secs = timestamp_ms.div_euclid(1000).rem_euclid(86_400);
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

pub fn format_message(msg: &StoredMessage, rendered: &Rendered) -> String {
    let arrow = match msg.direction {
        Direction::Outbound => ">",
        Direction::Inbound => "<",
    };
    let content = match rendered {
        Rendered::Text(text) => text.clone(),
        Rendered::Image(img) => match img.dimensions() {
            Some((w, h)) => format!("[photo {w}x{h}, {} bytes]", img.byte_len()),
            None => format!("[photo, {} bytes]", img.byte_len()),
        },
        Rendered::Broken { reason } => format!("[broken image: {reason}]"),
    };
    format!("{} #{:<4} {arrow} {content}", clock(msg.timestamp_ms), msg.id)
}

pub fn format_summary(row: &ConversationSummary) -> String {
    format!(
        "{:>3}  {:<16} {:>4} msg  {}  {}",
        row.thread_id,
        row.address,
        row.message_count,
        clock(row.timestamp_ms),
        summarize(&row.last_message, PREVIEW_CHARS)
    )
}
