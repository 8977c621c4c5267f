//! Configuration for the `bytesms` tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bytesms_core::budget::{Charset, TransportProfile};
use bytesms_core::codec::{Compressor, CompressorSettings, JpegBackend};
use bytesms_core::composer::ComposerConfig;
use bytesms_core::poller::PollerConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteSmsConfig {
    /// SMS segmentation model.
    pub transport: TransportConfig,
    /// Image compression policy.
    pub compression: CompressionConfig,
    /// Refresh polling for `watch`.
    pub poll: PollConfig,
    /// File-backed message store.
    pub mailbox: MailboxConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// "gsm7" (auto-detect, GSM-7 when possible) or "ucs2" (forced).
    pub charset: Charset,
    /// Concatenated segments allowed per message.
    pub max_segments: usize,
}

/// Compression configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Longer-edge cap in pixels.
    pub max_dimension: u32,
    /// JPEG quality of the first attempt.
    pub initial_quality: u8,
    /// Quality decrement per attempt.
    pub quality_step: u8,
    /// Quality floor.
    pub min_quality: u8,
    /// Smallest longer edge the compressor will halve down to.
    pub min_dimension: u32,
    /// Encode attempts per compression.
    pub max_iterations: u32,
    /// Wall-clock budget per image in milliseconds.
    pub timeout_ms: u64,
    /// Retries with a 10% smaller byte budget when the envelope overshoots.
    pub tightening_rounds: u32,
    /// Starting byte ceiling. 0 derives it from the transport budget.
    pub max_bytes: usize,
}

/// Poll configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Refresh interval in milliseconds.
    pub interval_ms: u64,
    /// Relative jitter, 0.0 to 1.0.
    pub jitter: f64,
    /// Upper bound of the error backoff in milliseconds.
    pub max_backoff_ms: u64,
}

/// Mailbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// JSON-lines file holding every message.
    pub path: PathBuf,
    /// Country code prefixed to bare 10-digit numbers.
    pub default_country_code: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for TransportConfig {
    fn default() -> Self {
        let profile = TransportProfile::default();
        Self {
            charset: profile.charset,
            max_segments: profile.max_segments,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        let settings = CompressorSettings::default();
        let composer = ComposerConfig::default();
        Self {
            max_dimension: composer.max_dimension,
            initial_quality: settings.initial_quality,
            quality_step: settings.quality_step,
            min_quality: composer.min_quality,
            min_dimension: settings.min_dimension,
            max_iterations: settings.max_iterations,
            timeout_ms: composer.timeout.as_millis() as u64,
            tightening_rounds: composer.tightening_rounds,
            max_bytes: 0,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        let poll = PollerConfig::default();
        Self {
            interval_ms: poll.interval.as_millis() as u64,
            jitter: poll.jitter,
            max_backoff_ms: poll.max_backoff.as_millis() as u64,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bytesms-mailbox.jsonl"),
            default_country_code: "91".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ByteSmsConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_profile(&self) -> TransportProfile {
        TransportProfile::new(self.transport.charset, self.transport.max_segments.clamp(1, 255))
    }

    pub fn to_compressor_settings(&self) -> CompressorSettings {
        let c = &self.compression;
        CompressorSettings {
            initial_quality: c.initial_quality.clamp(1, 100),
            quality_step: c.quality_step.max(1),
            min_dimension: c.min_dimension.max(1),
            max_iterations: c.max_iterations.clamp(1, 32),
        }
    }

    /// Compressor on the JPEG backend with the configured search policy.
    pub fn to_compressor(&self) -> Arc<Compressor> {
        Arc::new(Compressor::with_backend(
            Arc::new(JpegBackend::new()),
            self.to_compressor_settings(),
        ))
    }

    pub fn to_composer_config(&self) -> ComposerConfig {
        let c = &self.compression;
        ComposerConfig {
            profile: self.to_profile(),
            max_dimension: c.max_dimension.max(1),
            min_quality: c.min_quality.clamp(1, 100),
            timeout: Duration::from_millis(c.timeout_ms.max(1)),
            tightening_rounds: c.tightening_rounds,
            max_bytes: (c.max_bytes > 0).then_some(c.max_bytes),
        }
    }

    pub fn to_poller_config(&self) -> PollerConfig {
        let p = &self.poll;
        let interval = Duration::from_millis(p.interval_ms.max(100));
        PollerConfig {
            interval,
            jitter: if p.jitter.is_finite() {
                p.jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
            max_backoff: Duration::from_millis(p.max_backoff_ms).max(interval),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ByteSmsConfig::default()).unwrap();
        assert!(text.contains("max_segments"));
        assert!(text.contains("charset = \"gsm7\""));
        assert!(text.contains("interval_ms = 5000"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ByteSmsConfig::default()).unwrap();
        let parsed: ByteSmsConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.transport.max_segments, 8);
        assert_eq!(parsed.compression.max_dimension, 320);
        assert_eq!(parsed.mailbox.default_country_code, "91");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ByteSmsConfig = toml::from_str(
            r#"
            [transport]
            charset = "ucs2"

            [compression]
            max_bytes = 500
            "#,
        )
        .unwrap();
        assert_eq!(parsed.transport.charset, Charset::Ucs2);
        assert_eq!(parsed.transport.max_segments, 8);

        let composer = parsed.to_composer_config();
        assert_eq!(composer.profile.char_budget(), 8 * 67);
        assert_eq!(composer.max_bytes, Some(500));
        assert_eq!(composer.compression_budget().max_bytes, 500);
    }

    #[test]
    fn converters_clamp() {
        let mut cfg = ByteSmsConfig::default();
        cfg.compression.initial_quality = 0;
        cfg.compression.max_iterations = 1000;
        cfg.poll.interval_ms = 1;
        cfg.poll.jitter = 3.0;

        let settings = cfg.to_compressor_settings();
        assert_eq!(settings.initial_quality, 1);
        assert_eq!(settings.max_iterations, 32);

        let poll = cfg.to_poller_config();
        assert_eq!(poll.interval, Duration::from_millis(100));
        assert_eq!(poll.jitter, 1.0);
        assert_eq!(cfg.to_composer_config().max_bytes, None);
    }

    #[test]
    fn nan_jitter_from_toml_disables_jitter() {
        let parsed: ByteSmsConfig = toml::from_str("[poll]\njitter = nan\n").unwrap();
        assert!(parsed.poll.jitter.is_nan());
        let poll = parsed.to_poller_config();
        assert_eq!(poll.jitter, 0.0);
        assert_eq!(poll.next_delay(0), poll.interval);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ByteSmsConfig::load(Path::new("/nonexistent/bytesms.toml"));
        assert_eq!(cfg.poll.interval_ms, 5000);
    }

    #[test]
    fn written_default_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytesms.toml");
        ByteSmsConfig::write_default(&path).unwrap();

        let cfg = ByteSmsConfig::load(&path);
        assert_eq!(cfg.to_profile(), TransportProfile::default());
        assert_eq!(cfg.mailbox.path, PathBuf::from("bytesms-mailbox.jsonl"));
    }
}
