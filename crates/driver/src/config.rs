//! Configuration management
//!
//! All sections are optional in the TOML file; anything left out takes its
//! default value.
//!
//! ```toml
//! log_level = "debug"
//!
//! [driver]
//! batch_divisor = 3
//!
//! [discovery]
//! response_window_ms = 5
//!
//! [framing]
//! align_16bit = true
//! ```

use crate::handoff::DEFAULT_BUFFER_CAPACITY;
use crate::link::OpenOptions;
use anyhow::{Context, Result, anyhow};
use protocol::{DecoderConfig, EncoderConfig, FramingConfig, MAX_LINK_FRAME};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub driver: DriverConfig,
    pub discovery: DiscoveryConfig,
    pub framing: FramingConfig,
    pub decoder: DecoderConfig,
    pub encoder: EncoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            driver: DriverConfig::default(),
            discovery: DiscoveryConfig::default(),
            framing: FramingConfig::default(),
            decoder: DecoderConfig::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

/// Transport driver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// How long the read role waits in one poll
    pub poll_timeout_ms: u64,
    /// How long the write role waits for a queued write
    pub write_wait_ms: u64,
    /// How long the transmit role waits for a handed-off buffer
    pub transmit_wait_ms: u64,
    /// Capacity of each of the two hand-off buffers
    pub buffer_capacity: usize,
    /// Largest link frame, header included
    pub max_frame_size: usize,
    /// Writes batched per wake-up are limited to
    /// `(remaining / max_frame_size) / batch_divisor`
    pub batch_divisor: usize,
    pub write_queue_capacity: usize,
    pub receive_queue_capacity: usize,
    /// Bytes captured per frame
    pub snapshot_len: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            write_wait_ms: 100,
            transmit_wait_ms: 100,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_frame_size: MAX_LINK_FRAME,
            batch_divisor: 3,
            write_queue_capacity: 16_384,
            receive_queue_capacity: 4_096,
            snapshot_len: MAX_LINK_FRAME,
        }
    }
}

impl DriverConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn transmit_wait(&self) -> Duration {
        Duration::from_millis(self.transmit_wait_ms)
    }

    /// Longest time any role can take to notice cancellation
    pub fn shutdown_bound(&self) -> Duration {
        self.poll_timeout()
            .max(self.write_wait())
            .max(self.transmit_wait())
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            snapshot_len: self.snapshot_len,
            read_timeout: self.poll_timeout(),
        }
    }

    /// Reject values the transport roles cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 || self.write_wait_ms == 0 || self.transmit_wait_ms == 0 {
            return Err(anyhow!("Driver timeouts must be non-zero"));
        }
        if self.max_frame_size == 0 {
            return Err(anyhow!("max_frame_size must be non-zero"));
        }
        if self.buffer_capacity < self.max_frame_size * 3 {
            return Err(anyhow!(
                "buffer_capacity {} must hold at least three frames of {} bytes",
                self.buffer_capacity,
                self.max_frame_size
            ));
        }
        if self.batch_divisor == 0 {
            return Err(anyhow!("batch_divisor must be non-zero"));
        }
        if self.write_queue_capacity == 0 || self.receive_queue_capacity == 0 {
            return Err(anyhow!("Queue capacities must be non-zero"));
        }
        Ok(())
    }
}

/// Discovery tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How long to collect responses on each interface
    pub response_window_ms: u64,
    /// Enumeration attempts before giving up
    pub enumeration_attempts: u32,
    pub snapshot_len: usize,
    /// Read timeout passed to the capture layer
    pub read_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            response_window_ms: 5,
            enumeration_attempts: 10,
            snapshot_len: MAX_LINK_FRAME,
            read_timeout_ms: 1,
        }
    }
}

impl DiscoveryConfig {
    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.response_window_ms)
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            snapshot_len: self.snapshot_len,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.response_window_ms == 0 {
            return Err(anyhow!("response_window_ms must be non-zero"));
        }
        if self.enumeration_attempts == 0 {
            return Err(anyhow!("enumeration_attempts must be non-zero"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load from `path`, or from the default location when it exists
    ///
    /// Falls back to defaults when no file is found or loading fails.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = path.map(Path::to_path_buf).or_else(|| {
            let default = Self::default_path();
            default.exists().then_some(default)
        });

        let Some(candidate) = candidate else {
            return Self::default();
        };

        match Self::load(&candidate) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Install the global tracing subscriber at `log_level`
    ///
    /// `RUST_LOG` still wins when set. Fails if a subscriber is already
    /// installed in this process.
    pub fn install_logging(&self) -> common::Result<()> {
        common::setup_logging(&self.log_level)
    }

    /// `<config dir>/vnet-link/config.toml`
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("vnet-link").join("config.toml")
        } else {
            PathBuf::from("/etc/vnet-link/config.toml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        self.driver.validate().context("Invalid [driver] section")?;
        self.discovery
            .validate()
            .context("Invalid [discovery] section")?;

        if self.decoder.timestamp_resolution_ns == 0 || self.encoder.timestamp_resolution_ns == 0 {
            return Err(anyhow!("timestamp_resolution_ns must be non-zero"));
        }
        Ok(())
    }
}
