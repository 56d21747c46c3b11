// src/config.rs
//
// Pipeline configuration: admission limits, encode timeout, naming and the
// host yield strategy. Defaults can be overridden from the environment.

use std::time::Duration;
use tracing::warn;

/// Files larger than this are rejected at admission (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
/// Wall-clock bound on a single encode.
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Pause before the scheduler picks up the next entry in idle mode.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(1);

pub const DEFAULT_SUPPORTED_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "image/gif"];

pub const ENV_MAX_FILE_SIZE: &str = "TINYPRESS_MAX_FILE_SIZE";
pub const ENV_ENCODE_TIMEOUT_MS: &str = "TINYPRESS_ENCODE_TIMEOUT_MS";
pub const ENV_YIELD: &str = "TINYPRESS_YIELD";

/// How the scheduler hands control back to the host between entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldStrategy {
    /// Sleep for `idle_delay` so other work gets the runtime first.
    #[default]
    Idle,
    /// Re-queue the driver task without waiting.
    Deferred,
}

impl YieldStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(YieldStrategy::Idle),
            "deferred" | "immediate" => Some(YieldStrategy::Deferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_file_size: u64,
    pub supported_types: Vec<String>,
    pub encode_timeout: Duration,
    /// Appended to the source stem for single downloads.
    pub download_suffix: String,
    /// Archive names are `<prefix>-YYYYMMDDHHMMSS.zip`.
    pub archive_prefix: String,
    pub yield_strategy: YieldStrategy,
    pub idle_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            supported_types: DEFAULT_SUPPORTED_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            encode_timeout: DEFAULT_ENCODE_TIMEOUT,
            download_suffix: "_compressed".to_string(),
            archive_prefix: "tinypress".to_string(),
            yield_strategy: YieldStrategy::Idle,
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }
}

impl PipelineConfig {
    /// Defaults with `TINYPRESS_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_FILE_SIZE) {
            match raw.trim().parse::<u64>() {
                Ok(size) if size > 0 => self.max_file_size = size,
                _ => warn!(key = ENV_MAX_FILE_SIZE, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_ENCODE_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.encode_timeout = Duration::from_millis(ms),
                _ => warn!(key = ENV_ENCODE_TIMEOUT_MS, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_YIELD) {
            match YieldStrategy::parse(&raw) {
                Some(strategy) => self.yield_strategy = strategy,
                None => warn!(key = ENV_YIELD, value = %raw, "ignoring invalid override"),
            }
        }
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_encode_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = timeout;
        self
    }

    pub fn with_yield_strategy(mut self, strategy: YieldStrategy) -> Self {
        self.yield_strategy = strategy;
        self
    }

    pub fn is_supported_type(&self, mime_type: &str) -> bool {
        self.supported_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(mime_type))
    }
}
