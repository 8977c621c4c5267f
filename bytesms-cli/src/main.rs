//! ByteSMS command-line tool — entry point.
//!
//! ```text
//! bytesms encode photo.jpg               Print the SMS body for a photo
//! bytesms decode - -o out.jpg            Envelope on stdin → image file
//! bytesms classify "<body>" [--json]     plain text / envelope / malformed
//! bytesms budget ["some text"]           Transport and byte budgets
//! bytesms send <to> --image photo.jpg    Compose into the mailbox
//! bytesms receive <from> "<body>"        Simulate an inbound message
//! bytesms thread <with> [--save-images D]
//! bytesms conversations
//! bytesms watch [<with>]                 Poll until Ctrl-C
//! bytesms --gen-config                   Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use bytesms_cli::commands::{self, CliResult, Context};
use bytesms_cli::config::ByteSmsConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bytesms", version, about = "Send photos as plain SMS text")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, global = true, default_value = "bytesms.toml")]
    config: PathBuf,

    /// Override the mailbox file from the config.
    #[arg(long, global = true)]
    mailbox: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress an image into an SMS body.
    Encode {
        image: PathBuf,
        /// Write the envelope here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Turn an envelope body back into an image file.
    Decode {
        /// The body, or `-` / nothing for stdin.
        body: Option<String>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Report whether a body is plain text, an image, or malformed.
    Classify {
        body: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the transport budget and, optionally, what a text costs.
    Budget { text: Option<String> },
    /// Send a text or an image to a number through the mailbox.
    Send {
        to: String,
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Record an inbound message in the mailbox.
    Receive { from: String, body: Option<String> },
    /// Print a conversation.
    Thread {
        with: String,
        /// Save decoded images into this directory.
        #[arg(long)]
        save_images: Option<PathBuf>,
    },
    /// List conversations.
    Conversations,
    /// Poll the mailbox and print changes until Ctrl-C.
    Watch { with: Option<String> },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ByteSmsConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        return Err("no subcommand given; see --help".into());
    };

    // Load config.
    let mut config = ByteSmsConfig::load(&cli.config);
    if let Some(path) = cli.mailbox {
        config.mailbox.path = path;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    debug!("bytesms v{}", env!("CARGO_PKG_VERSION"));
    info!(
        charset = ?config.transport.charset,
        segments = config.transport.max_segments,
        mailbox = %config.mailbox.path.display(),
        "configuration loaded"
    );

    let ctx = Context::new(config);
    match command {
        Command::Encode { image, out } => commands::encode(&ctx, &image, out.as_deref()).await,
        Command::Decode { body, out } => commands::decode_to_file(body.as_deref(), out.as_deref()),
        Command::Classify { body, json } => commands::classify_body(&ctx, body.as_deref(), json),
        Command::Budget { text } => commands::budget(&ctx, text.as_deref()),
        Command::Send { to, text, image } => {
            commands::send(&ctx, &to, text.as_deref(), image.as_deref()).await
        }
        Command::Receive { from, body } => commands::receive(&ctx, &from, body.as_deref()).await,
        Command::Thread { with, save_images } => {
            commands::thread(&ctx, &with, save_images.as_deref()).await
        }
        Command::Conversations => commands::conversations(&ctx).await,
        Command::Watch { with } => commands::watch(&ctx, with.as_deref()).await,
    }
}
